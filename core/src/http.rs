//! HTTP exchange types shared by the executor and its transports.
//!
//! # Design
//! Requests and responses are plain data. `RequestExecutor::build_request`
//! produces an `HttpRequest`, a `Transport` turns it into a
//! `TransportOutcome`, and `RequestExecutor::finish` folds that outcome into
//! a `ResponseEnvelope`. Neither half touches the network, so both are
//! deterministic under test.

use std::fmt;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// First header value whose name matches `name` case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// An HTTP response described as plain data.
///
/// Any status code is a response, including 4xx and 5xx. Only exchanges that
/// never produced a status line are reported differently (see
/// `TransportOutcome`).
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Result of handing one `HttpRequest` to a transport.
#[derive(Debug, Clone)]
pub enum TransportOutcome {
    /// The server answered, with any status.
    Response(HttpResponse),

    /// No response was obtained: DNS failure, refused connection, timeout,
    /// TLS handshake failure.
    Unreachable(String),

    /// Some other local failure while performing the exchange. `status` is
    /// set when a status line was received before the failure, e.g. when the
    /// body could not be read.
    Failed { message: String, status: Option<u16> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_defaults_to_get() {
        assert_eq!(HttpMethod::default(), HttpMethod::Get);
        assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = HttpRequest {
            method: HttpMethod::Get,
            url: "http://localhost/x".to_string(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: None,
        };
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("authorization"), None);
    }
}
