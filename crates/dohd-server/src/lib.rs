//! # dohd HTTP surface
//!
//! The DoH endpoint per RFC 8484: GET and POST adapters that unwrap the
//! DNS payload from the HTTP request, the query pipeline that glues the
//! codec, cache and upstream pool together, and the listeners that serve
//! the route table over plain HTTP and TLS.
//!
//! All shared state lives in an explicitly constructed [`Gateway`] value
//! built at startup; handlers close over it through the router state.

use thiserror::Error;

pub mod gateway;
pub mod listener;
pub mod routes;

pub use gateway::{CacheDirectives, DnsPayload, Gateway, PipelineError};
pub use listener::{bind_listener, load_tls_config, serve_http, serve_tls};
pub use routes::router;

/// Server error types.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// MIME type for DNS messages per RFC 8484.
pub const DNS_MESSAGE_CONTENT_TYPE: &str = "application/dns-message";
