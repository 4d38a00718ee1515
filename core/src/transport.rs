//! The I/O boundary.
//!
//! # Design
//! `Transport` is the only place a request touches the network. It reports
//! every exchange as a `TransportOutcome`, keeping "the server answered with
//! an error status" apart from "no answer at all" without using a fault
//! hierarchy. 4xx and 5xx responses are ordinary `Response` values.

use std::time::Duration;

use ureq::tls::TlsConfig;
use ureq::Agent;

use crate::config::TlsMode;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, TransportOutcome};

/// Performs one HTTP exchange.
pub trait Transport {
    fn send(&self, request: &HttpRequest) -> TransportOutcome;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &HttpRequest) -> TransportOutcome {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, request: &HttpRequest) -> TransportOutcome {
        (**self).send(request)
    }
}

/// Blocking transport backed by a ureq `Agent`.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(tls: TlsMode) -> Self {
        Self::with_timeout(tls, Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(tls: TlsMode, timeout: Duration) -> Self {
        let tls_config = TlsConfig::builder()
            .disable_verification(tls == TlsMode::VerifyNone)
            .build();
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .tls_config(tls_config)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> TransportOutcome {
        let url = request.url.as_str();
        let headers = request.headers.as_slice();
        let body = request.body.as_deref().map(str::as_bytes);

        let result = match (request.method, body) {
            (HttpMethod::Get, _) => with_headers(self.agent.get(url), headers).call(),
            (HttpMethod::Delete, _) => with_headers(self.agent.delete(url), headers).call(),
            (HttpMethod::Post, Some(body)) => with_headers(self.agent.post(url), headers).send(body),
            (HttpMethod::Post, None) => with_headers(self.agent.post(url), headers).send_empty(),
            (HttpMethod::Put, Some(body)) => with_headers(self.agent.put(url), headers).send(body),
            (HttpMethod::Put, None) => with_headers(self.agent.put(url), headers).send_empty(),
            (HttpMethod::Patch, Some(body)) => with_headers(self.agent.patch(url), headers).send(body),
            (HttpMethod::Patch, None) => with_headers(self.agent.patch(url), headers).send_empty(),
        };

        let mut response = match result {
            Ok(response) => response,
            Err(err) => return classify(&err),
        };

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();

        match response.body_mut().read_to_string() {
            Ok(body) => TransportOutcome::Response(HttpResponse {
                status,
                headers,
                body,
            }),
            Err(err) => TransportOutcome::Failed {
                message: format!("failed to read response body: {err}"),
                status: Some(status),
            },
        }
    }
}

fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, headers: &[(String, String)]) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

/// Split ureq failures into "never reached the server" and everything else.
fn classify(err: &ureq::Error) -> TransportOutcome {
    match err {
        ureq::Error::HostNotFound
        | ureq::Error::ConnectionFailed
        | ureq::Error::Io(_)
        | ureq::Error::Timeout(_)
        | ureq::Error::Tls(_) => TransportOutcome::Unreachable(err.to_string()),
        _ => TransportOutcome::Failed {
            message: err.to_string(),
            status: None,
        },
    }
}
