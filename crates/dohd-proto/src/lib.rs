//! # dohd DNS wire-format inspection
//!
//! The gateway treats DNS messages as opaque byte sequences and only ever
//! needs two read-only projections of them:
//!
//! - [`fingerprint`]: the cache key derived from the first question,
//! - [`min_ttl`]: the smallest answer TTL, which bounds cache lifetime
//!   and the `Cache-Control: max-age` reflected to clients (RFC 8484 §5.1).
//!
//! Both operations are pure functions over the wire bytes (RFC 1035 §4) and
//! are safe for concurrent use. Nothing here builds or mutates messages;
//! the gateway is a forwarder, not a resolver.

use thiserror::Error;

pub mod header;
pub mod message;
pub mod name;
pub mod question;
pub mod rtype;
pub mod wire;

pub use header::{Header, HEADER_SIZE};
pub use message::{fingerprint, min_ttl, Fingerprint};
pub use question::Question;
pub use rtype::{RecordClass, RecordType};

/// Maximum length of a domain name in wire format (RFC 1035 §3.1).
pub const MAX_NAME_LENGTH: usize = 255;

/// Maximum length of a single label (RFC 1035 §3.1).
pub const MAX_LABEL_LENGTH: usize = 63;

/// Wire-format parse error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("unexpected end of message at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("invalid label type 0x{value:02X} at offset {offset}")]
    InvalidLabel { offset: usize, value: u8 },

    #[error("compression pointer at offset {offset} targets forward offset {target}")]
    InvalidPointer { offset: usize, target: usize },

    #[error("too many compression pointer jumps")]
    TooManyPointerJumps,

    #[error("name exceeds {MAX_NAME_LENGTH} octets")]
    NameTooLong,

    #[error("message carries no question")]
    NoQuestion,
}

/// Result type for wire-format operations.
pub type Result<T> = std::result::Result<T, Error>;
