//! Uniform result type for every request outcome.
//!
//! # Design
//! A `ResponseEnvelope` carries a status code and an optional JSON payload.
//! Backend error bodies, transport failures and local failures all end up in
//! the same shape, so call sites only ever branch on `is_success()` and
//! `has_payload()`. A status of 0 means no HTTP status was ever recorded.
//!
//! Errors live inside the payload, either as a single `error` object, as an
//! `errors` array, or as the payload itself when the backend returned a bare
//! error body:
//!
//! ```json
//! { "code": "Bad Request", "statusCode": 400, "message": "...", "errorElementPath": "/fields/0" }
//! ```

use std::fmt;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Line emitted for a failed envelope whose payload holds no structured error.
pub const NO_ERRORS_MESSAGE: &str = "Response indicates failure, but there are no errors to print.";

/// One backend error, as found under `error`, `errors` or at the top level of
/// a failure payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    #[serde(default)]
    pub status_code: i64,
    /// Short category such as `"Bad Request"`. Empty for locally raised errors.
    #[serde(default)]
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_element_path: Option<String>,
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} - {}", self.status_code, self.code, self.message)
    }
}

/// Normalized outcome of one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseEnvelope {
    status_code: u16,
    payload: Option<Value>,
}

impl ResponseEnvelope {
    pub fn new(status_code: u16, payload: Option<Value>) -> Self {
        Self {
            status_code,
            payload,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Option<Value> {
        self.payload
    }

    /// True iff the status is 2xx. Payload presence plays no part.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// True when a non-null payload is present.
    pub fn has_payload(&self) -> bool {
        matches!(self.payload, Some(ref v) if !v.is_null())
    }

    pub(crate) fn set_status(&mut self, status_code: u16) {
        self.status_code = status_code;
    }

    pub(crate) fn set_payload(&mut self, payload: Value) {
        self.payload = Some(payload);
    }

    /// Record an error body returned by the backend.
    ///
    /// The status becomes `status_override`, else the body's `statusCode`
    /// when it is a valid HTTP status, else 500.
    pub fn set_from_http_error(&mut self, error_body: Value, status_override: Option<u16>) {
        self.status_code = status_override
            .or_else(|| status_from_body(&error_body))
            .unwrap_or(500);
        self.payload = Some(error_body);
    }

    /// Record an error raised on the client side.
    ///
    /// The first recorded `error` wins: an existing `error` key is never
    /// replaced. Any existing payload is kept; a non-object payload moves
    /// under `data`. Without an override the status is left as it is.
    pub fn set_local_error(&mut self, message: impl Into<String>, status_override: Option<u16>) {
        if let Some(status) = status_override {
            self.status_code = status;
        }
        let error = json!({
            "message": message.into(),
            "statusCode": self.status_code,
            "code": "",
        });

        let map = match self.payload.take() {
            Some(Value::Object(mut map)) => {
                map.entry("error").or_insert(error);
                map
            }
            None | Some(Value::Null) => {
                let mut map = Map::new();
                map.insert("error".to_string(), error);
                map
            }
            Some(other) => {
                let mut map = Map::new();
                map.insert("error".to_string(), error);
                map.insert("data".to_string(), other);
                map
            }
        };
        self.payload = Some(Value::Object(map));
    }

    /// Every structured error embedded in the payload, whatever the status.
    ///
    /// Looks at `error` first, then `errors`, then the payload itself.
    /// Entries that are not error-shaped are skipped. Used directly for
    /// multi-status (206) results, where `is_success()` holds but some
    /// sub-operations failed.
    pub fn errors(&self) -> Vec<ErrorDetail> {
        let Some(payload) = self.payload.as_ref() else {
            return Vec::new();
        };
        if let Some(error) = payload.get("error") {
            return parse_detail(error).into_iter().collect();
        }
        if let Some(Value::Array(items)) = payload.get("errors") {
            return items.iter().filter_map(parse_detail).collect();
        }
        parse_detail(payload).into_iter().collect()
    }

    /// The lines `print_errors` emits: empty on success or without payload.
    pub fn error_lines(&self) -> Vec<String> {
        if self.is_success() || !self.has_payload() {
            return Vec::new();
        }
        let errors = self.errors();
        if errors.is_empty() {
            return vec![NO_ERRORS_MESSAGE.to_string()];
        }
        errors.iter().map(ToString::to_string).collect()
    }

    /// Write one line per error to `out`, formatted
    /// `<statusCode> - <code> - <message>`.
    pub fn write_errors<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for line in self.error_lines() {
            tracing::error!(status = self.status_code, "{line}");
            writeln!(out, "{line}")?;
        }
        Ok(())
    }

    /// `write_errors` to stderr.
    pub fn print_errors(&self) {
        if let Err(e) = self.write_errors(&mut io::stderr().lock()) {
            tracing::warn!("failed to print errors: {e}");
        }
    }
}

fn status_from_body(body: &Value) -> Option<u16> {
    body.get("statusCode")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
        .filter(|code| (100..=599).contains(code))
}

fn parse_detail(value: &Value) -> Option<ErrorDetail> {
    ErrorDetail::deserialize(value).ok()
}
