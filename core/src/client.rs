//! Request execution and outcome normalization.
//!
//! # Design
//! `RequestExecutor` owns an immutable `ClientConfig` and a `Transport`.
//! Each call goes through three steps:
//!
//! 1. `build_request` turns a path, optional token, optional JSON body and
//!    method into an `HttpRequest` (no I/O);
//! 2. the transport performs the exchange and reports a `TransportOutcome`;
//! 3. `finish` folds that outcome into a `ResponseEnvelope` (no I/O).
//!
//! `execute` chains the three and never fails: whatever goes wrong ends up
//! on the envelope, and failed envelopes have their errors printed before
//! they are returned.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::envelope::ResponseEnvelope;
use crate::error::ClientError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, TransportOutcome};
use crate::transport::{Transport, UreqTransport};
use crate::types::AccessToken;

/// Synchronous client for the ALM REST API.
#[derive(Debug, Clone)]
pub struct RequestExecutor<T> {
    config: ClientConfig,
    transport: T,
}

impl RequestExecutor<UreqTransport> {
    /// Executor over a ureq transport using the configured TLS mode.
    pub fn from_config(config: ClientConfig) -> Self {
        let transport = UreqTransport::new(config.tls);
        Self::new(config, transport)
    }
}

impl<T: Transport> RequestExecutor<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Value of the `authorization` header: basic credentials from the
    /// config without a token, the bearer token otherwise.
    pub fn authorization_header(&self, token: Option<&AccessToken>) -> String {
        match token {
            None => {
                let credentials = format!("{}:{}", self.config.username, self.config.password);
                format!("basic {}", STANDARD.encode(credentials))
            }
            Some(token) => format!("Bearer {}", token.access_token),
        }
    }

    /// Join the configured base URL and `path` with a single `/`.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn build_request<B: Serialize + ?Sized>(
        &self,
        path: &str,
        token: Option<&AccessToken>,
        body: Option<&B>,
        method: Option<HttpMethod>,
    ) -> Result<HttpRequest, ClientError> {
        let mut headers = vec![("authorization".to_string(), self.authorization_header(token))];
        let body = match body {
            Some(body) => {
                let encoded = serde_json::to_string(body)?;
                headers.push(("content-type".to_string(), "application/json".to_string()));
                Some(encoded)
            }
            None => None,
        };
        Ok(HttpRequest {
            method: method.unwrap_or_default(),
            url: self.url(path),
            headers,
            body,
        })
    }

    /// Normalize one transport outcome into an envelope.
    ///
    /// The status is taken from the response, with one exception: a 2xx
    /// whose body is not valid JSON is recorded as a local error with status
    /// 500 instead.
    pub fn finish(&self, outcome: TransportOutcome) -> ResponseEnvelope {
        let mut envelope = ResponseEnvelope::default();
        match outcome {
            TransportOutcome::Response(response) if response.status >= 400 => {
                apply_error_response(&mut envelope, response);
            }
            TransportOutcome::Response(response) => {
                envelope.set_status(response.status);
                match parse_body(&response.body) {
                    Ok(Some(payload)) => envelope.set_payload(payload),
                    Ok(None) => {}
                    Err(e) => envelope.set_local_error(format!("malformed response body: {e}"), Some(500)),
                }
            }
            TransportOutcome::Unreachable(reason) => {
                envelope.set_local_error(reason, None);
                tracing::warn!("{}", self.connection_advice());
            }
            TransportOutcome::Failed { message, status } => {
                envelope.set_local_error(message, status);
            }
        }
        conclude(envelope)
    }

    /// Build, send and normalize one request. Never fails; see the envelope.
    pub fn execute<B: Serialize + ?Sized>(
        &self,
        path: &str,
        token: Option<&AccessToken>,
        body: Option<&B>,
        method: Option<HttpMethod>,
    ) -> ResponseEnvelope {
        let request = match self.build_request(path, token, body, method) {
            Ok(request) => request,
            Err(err) => {
                let mut envelope = ResponseEnvelope::default();
                envelope.set_local_error(err.to_string(), None);
                return conclude(envelope);
            }
        };
        tracing::debug!(method = %request.method, url = %request.url, "sending request");
        self.finish(self.transport.send(&request))
    }

    pub fn get(&self, path: &str, token: Option<&AccessToken>) -> ResponseEnvelope {
        self.execute::<Value>(path, token, None, None)
    }

    pub fn post<B: Serialize + ?Sized>(&self, path: &str, token: Option<&AccessToken>, body: &B) -> ResponseEnvelope {
        self.execute(path, token, Some(body), Some(HttpMethod::Post))
    }

    pub fn put<B: Serialize + ?Sized>(&self, path: &str, token: Option<&AccessToken>, body: &B) -> ResponseEnvelope {
        self.execute(path, token, Some(body), Some(HttpMethod::Put))
    }

    /// Operator-facing hint logged when the backend cannot be reached.
    pub fn connection_advice(&self) -> String {
        format!(
            "An error occurred when attempting to connect to {base}. \
             Troubleshooting advice: Is your REST API server running at that address? \
             If you open {versions} in a browser, do you see a JSON response?",
            base = self.config.base_url,
            versions = self.url("versions"),
        )
    }
}

fn apply_error_response(envelope: &mut ResponseEnvelope, response: HttpResponse) {
    let status = response.status;
    match parse_body(&response.body) {
        Ok(Some(body)) => envelope.set_from_http_error(body, Some(status)),
        Ok(None) => envelope.set_local_error(format!("HTTP {status} with an empty body"), Some(status)),
        Err(e) => envelope.set_local_error(format!("malformed error body: {e}"), Some(status)),
    }
}

/// `None` for an empty (or whitespace-only) body.
fn parse_body(body: &str) -> Result<Option<Value>, serde_json::Error> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(body).map(Some)
}

fn conclude(envelope: ResponseEnvelope) -> ResponseEnvelope {
    if !envelope.is_success() {
        tracing::warn!(status = envelope.status_code(), "request failed");
        envelope.print_errors();
    }
    envelope
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    /// Replays a fixed outcome and remembers what was sent.
    struct Canned {
        outcome: TransportOutcome,
        sent: RefCell<Vec<HttpRequest>>,
    }

    impl Canned {
        fn new(outcome: TransportOutcome) -> Self {
            Self {
                outcome,
                sent: RefCell::new(Vec::new()),
            }
        }

        fn status(status: u16, body: &str) -> Self {
            Self::new(TransportOutcome::Response(HttpResponse {
                status,
                headers: Vec::new(),
                body: body.to_string(),
            }))
        }
    }

    impl Transport for Canned {
        fn send(&self, request: &HttpRequest) -> TransportOutcome {
            self.sent.borrow_mut().push(request.clone());
            self.outcome.clone()
        }
    }

    fn config() -> ClientConfig {
        ClientConfig {
            base_url: "http://localhost:8080/helix-alm/api/v0/".to_string(),
            username: "administrator".to_string(),
            password: String::new(),
            ..ClientConfig::default()
        }
    }

    fn executor(transport: Canned) -> RequestExecutor<Canned> {
        RequestExecutor::new(config(), transport)
    }

    #[test]
    fn basic_header_without_token() {
        let exec = executor(Canned::status(200, ""));
        // base64("administrator:")
        assert_eq!(exec.authorization_header(None), "basic YWRtaW5pc3RyYXRvcjo=");
    }

    #[test]
    fn bearer_header_with_token() {
        let exec = executor(Canned::status(200, ""));
        let token = AccessToken::new("abc123");
        assert_eq!(exec.authorization_header(Some(&token)), "Bearer abc123");
    }

    #[test]
    fn url_joins_with_single_slash() {
        let exec = executor(Canned::status(200, ""));
        assert_eq!(exec.url("projects"), "http://localhost:8080/helix-alm/api/v0/projects");
        assert_eq!(exec.url("/projects"), "http://localhost:8080/helix-alm/api/v0/projects");
    }

    #[test]
    fn build_get_request() {
        let exec = executor(Canned::status(200, ""));
        let req = exec.build_request::<Value>("projects", None, None, None).unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert!(req.body.is_none());
        assert!(req.header("content-type").is_none());
        assert_eq!(req.header("authorization"), Some("basic YWRtaW5pc3RyYXRvcjo="));
    }

    #[test]
    fn build_request_with_body() {
        let exec = executor(Canned::status(200, ""));
        let body = json!({"eventsData": [{"name": "Comment"}]});
        let token = AccessToken::new("t");
        let req = exec
            .build_request("P/issues/1/events", Some(&token), Some(&body), Some(HttpMethod::Post))
            .unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("authorization"), Some("Bearer t"));
        let sent: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent, body);
    }

    #[test]
    fn unserializable_body_becomes_local_error() {
        let transport = Canned::status(200, "{}");
        let exec = executor(transport);
        let mut body = HashMap::new();
        body.insert((1, 2), "tuple keys are not JSON");
        let envelope = exec.execute("x", None, Some(&body), Some(HttpMethod::Post));
        assert!(!envelope.is_success());
        assert_eq!(envelope.status_code(), 0);
        assert!(exec.transport.sent.borrow().is_empty());
        let message = envelope.payload().unwrap()["error"]["message"].as_str().unwrap();
        assert!(message.starts_with("serialization failed"));
    }

    #[test]
    fn success_body_becomes_payload() {
        let exec = executor(Canned::status(200, r#"{"projects":[{"id":1,"name":"Sample"}]}"#));
        let envelope = exec.get("projects", None);
        assert!(envelope.is_success());
        assert_eq!(envelope.payload().unwrap()["projects"][0]["name"], "Sample");
    }

    #[test]
    fn empty_success_body_has_no_payload() {
        let exec = executor(Canned::status(204, ""));
        let envelope = exec.execute::<Value>("P/issues/1", None, None, Some(HttpMethod::Delete));
        assert!(envelope.is_success());
        assert!(!envelope.has_payload());
        assert_eq!(exec.transport.sent.borrow()[0].method, HttpMethod::Delete);
    }

    #[test]
    fn malformed_success_body_is_failure() {
        let exec = executor(Canned::status(200, "<html>"));
        let envelope = exec.get("projects", None);
        assert!(!envelope.is_success());
        assert_eq!(envelope.status_code(), 500);
        assert_eq!(envelope.error_lines().len(), 1);
    }

    #[test]
    fn http_error_body_is_normalized() {
        let exec = executor(Canned::status(
            400,
            r#"{"code":"Bad Request","statusCode":400,"message":"Invalid field","errorElementPath":"/fields/0"}"#,
        ));
        let envelope = exec.put("P/issues/1", None, &json!({}));
        assert_eq!(envelope.status_code(), 400);
        assert!(!envelope.is_success());
        assert_eq!(envelope.error_lines(), vec!["400 - Bad Request - Invalid field"]);
    }

    #[test]
    fn transport_status_wins_over_body_status() {
        let exec = executor(Canned::status(404, r#"{"code":"x","statusCode":400,"message":"m"}"#));
        assert_eq!(exec.get("P/issues/9", None).status_code(), 404);
    }

    #[test]
    fn error_status_with_empty_body() {
        let exec = executor(Canned::status(503, ""));
        let envelope = exec.get("projects", None);
        assert_eq!(envelope.status_code(), 503);
        assert_eq!(envelope.error_lines(), vec!["503 -  - HTTP 503 with an empty body"]);
    }

    #[test]
    fn unreachable_keeps_default_status() {
        let exec = executor(Canned::new(TransportOutcome::Unreachable("Connection refused".to_string())));
        let envelope = exec.get("projects", None);
        assert!(!envelope.is_success());
        assert_eq!(envelope.status_code(), 0);
        assert_eq!(envelope.payload().unwrap()["error"]["message"], "Connection refused");
    }

    #[test]
    fn failed_read_keeps_transport_status() {
        let exec = executor(Canned::new(TransportOutcome::Failed {
            message: "failed to read response body: stalled".to_string(),
            status: Some(200),
        }));
        let envelope = exec.get("projects", None);
        assert_eq!(envelope.status_code(), 200);
        assert!(envelope.payload().unwrap().get("error").is_some());
    }

    #[test]
    fn connection_advice_names_versions_endpoint() {
        let exec = executor(Canned::status(200, ""));
        assert!(exec
            .connection_advice()
            .contains("http://localhost:8080/helix-alm/api/v0/versions"));
    }
}
