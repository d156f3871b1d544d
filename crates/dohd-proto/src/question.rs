//! DNS question section (RFC 1035 §4.1.2).

use crate::name::parse_name;
use crate::rtype::{RecordClass, RecordType};
use crate::wire::WireReader;
use crate::Result;
use std::fmt;

/// A parsed DNS question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Queried name in canonical (lower-cased) presentation form.
    pub qname: String,

    /// Requested record type.
    pub qtype: RecordType,

    /// Query class, IN in practice.
    pub qclass: RecordClass,
}

impl Question {
    /// Parses the question starting at `offset` within `msg`.
    ///
    /// Returns the question and the number of bytes it occupies.
    pub fn parse(msg: &[u8], offset: usize) -> Result<(Self, usize)> {
        let (qname, name_len) = parse_name(msg, offset)?;

        let mut rd = WireReader::new(msg);
        rd.set_position(offset + name_len);
        let qtype = RecordType::from_u16(rd.read_u16()?);
        let qclass = RecordClass::from_u16(rd.read_u16()?);

        Ok((
            Self {
                qname,
                qtype,
                qclass,
            },
            name_len + 4,
        ))
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.qname, self.qclass, self.qtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn parses_a_question() {
        let mut wire = Vec::new();
        wire.extend_from_slice(b"\x07example\x03com\x00");
        wire.extend_from_slice(&1u16.to_be_bytes()); // QTYPE A
        wire.extend_from_slice(&1u16.to_be_bytes()); // QCLASS IN

        let (q, consumed) = Question::parse(&wire, 0).unwrap();
        assert_eq!(q.qname, "example.com.");
        assert_eq!(q.qtype, RecordType::A);
        assert_eq!(q.qclass, RecordClass::In);
        assert_eq!(consumed, wire.len());
    }

    #[test]
    fn truncated_question_is_rejected() {
        let wire = b"\x07example\x03com\x00\x00";
        assert!(matches!(
            Question::parse(wire, 0),
            Err(Error::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn display_form() {
        let q = Question {
            qname: "example.com.".into(),
            qtype: RecordType::Aaaa,
            qclass: RecordClass::In,
        };
        assert_eq!(q.to_string(), "example.com. IN AAAA");
    }
}
