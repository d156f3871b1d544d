//! DNS message header.
//!
//! The header is a fixed 12-byte structure at the start of every message
//! (RFC 1035 §4.1.1). The gateway only consumes the section counts; flags
//! pass through untouched inside the opaque payload.

use crate::wire::WireReader;
use crate::{Error, Result};

/// Size of the DNS header in bytes.
pub const HEADER_SIZE: usize = 12;

/// Parsed DNS message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Message identifier.
    pub id: u16,

    /// Raw flags word (QR, opcode, AA, TC, RD, RA, Z, RCODE).
    pub flags: u16,

    /// Number of questions.
    pub qd_count: u16,

    /// Number of answer records.
    pub an_count: u16,

    /// Number of authority records.
    pub ns_count: u16,

    /// Number of additional records.
    pub ar_count: u16,
}

impl Header {
    /// Parses the header from the start of a message.
    pub fn parse(msg: &[u8]) -> Result<Self> {
        if msg.len() < HEADER_SIZE {
            return Err(Error::UnexpectedEof { offset: HEADER_SIZE });
        }

        let mut rd = WireReader::new(msg);
        Ok(Self {
            id: rd.read_u16()?,
            flags: rd.read_u16()?,
            qd_count: rd.read_u16()?,
            an_count: rd.read_u16()?,
            ns_count: rd.read_u16()?,
            ar_count: rd.read_u16()?,
        })
    }
}
