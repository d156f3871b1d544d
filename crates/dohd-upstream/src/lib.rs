//! # dohd upstream dispatch
//!
//! Holds the pool of configured DNS resolvers and transports queries to
//! them. A resolver speaks either plain UDP on port 53 or DoH over
//! HTTPS (POST or GET per RFC 8484); the pool picks uniformly at random
//! among the resolvers currently believed reachable and delegates to the
//! matching transport.
//!
//! There is no retry at this layer: a failed dispatch surfaces to the
//! query pipeline, which reports it to the client.

use thiserror::Error;

mod doh;
pub mod pool;
pub mod resolver;
mod udp;

pub use pool::ResolverPool;
pub use resolver::{DohMethod, Resolver, Scheme};

/// Upstream dispatch error.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("no active DNS resolvers available (all targets are offline)")]
    NoResolvers,

    #[error("timeout waiting for upstream response")]
    Timeout,

    #[error("network error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DoH request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("DoH upstream responded with HTTP status code={0}")]
    HttpStatus(u16),

    #[error("invalid resolver URI '{uri}': {message}")]
    InvalidResolver { uri: String, message: String },
}

/// Result type for upstream operations.
pub type Result<T> = std::result::Result<T, UpstreamError>;
