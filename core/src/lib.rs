//! Synchronous client core for the Helix ALM REST API.
//!
//! # Overview
//! Two mechanisms carry the weight; everything else is a thin call site:
//!
//! - `ResponseEnvelope` normalizes every request outcome (backend error body,
//!   unreachable server, local failure, empty or JSON success body) into one
//!   inspectable value.
//! - `fields::get_value` / `fields::set_value` read and write the
//!   self-describing, type-tagged field lists that backend records carry.
//!
//! `RequestExecutor` ties them to the network through a `Transport`.
//!
//! # Design
//! - Configuration is an explicit `ClientConfig` fixed at construction.
//! - The transport is a trait; `UreqTransport` is the production one and
//!   tests substitute canned outcomes.
//! - Request building and outcome normalization are pure functions of their
//!   inputs, so the I/O boundary is a single `Transport::send` call.

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod fields;
pub mod http;
pub mod transport;
pub mod types;

pub use client::RequestExecutor;
pub use config::{ClientConfig, TlsMode};
pub use envelope::{ErrorDetail, ResponseEnvelope};
pub use error::{ClientError, FieldError};
pub use fields::{get_value, set_value, Field, FieldValue, FormattedString, MenuItem, UserRef};
pub use http::{HttpMethod, HttpRequest, HttpResponse, TransportOutcome};
pub use transport::{Transport, UreqTransport};
pub use types::{AccessToken, Project, ProjectList};
