//! Record type and class codes.

use std::fmt;

/// DNS record type (RFC 1035 §3.2.2, RFC 3596).
///
/// The gateway never interprets record data; types are carried only for
/// cache keying and telemetry classification. Codes outside the known set
/// are preserved verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Ns,
    Cname,
    Soa,
    Wks,
    Ptr,
    Hinfo,
    Minfo,
    Mx,
    Txt,
    Aaaa,
    Srv,
    /// QTYPE 255, a request for all records.
    Any,
    /// Any other type code (RFC 3597 presentation).
    Unknown(u16),
}

impl RecordType {
    /// Maps a wire-format type code.
    pub fn from_u16(code: u16) -> Self {
        match code {
            1 => Self::A,
            2 => Self::Ns,
            5 => Self::Cname,
            6 => Self::Soa,
            11 => Self::Wks,
            12 => Self::Ptr,
            13 => Self::Hinfo,
            14 => Self::Minfo,
            15 => Self::Mx,
            16 => Self::Txt,
            28 => Self::Aaaa,
            33 => Self::Srv,
            255 => Self::Any,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::Ns => write!(f, "NS"),
            Self::Cname => write!(f, "CNAME"),
            Self::Soa => write!(f, "SOA"),
            Self::Wks => write!(f, "WKS"),
            Self::Ptr => write!(f, "PTR"),
            Self::Hinfo => write!(f, "HINFO"),
            Self::Minfo => write!(f, "MINFO"),
            Self::Mx => write!(f, "MX"),
            Self::Txt => write!(f, "TXT"),
            Self::Aaaa => write!(f, "AAAA"),
            Self::Srv => write!(f, "SRV"),
            Self::Any => write!(f, "ANY"),
            Self::Unknown(code) => write!(f, "TYPE{}", code),
        }
    }
}

/// DNS record class (RFC 1035 §3.2.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordClass {
    In,
    Ch,
    Hs,
    Any,
    Unknown(u16),
}

impl RecordClass {
    /// Maps a wire-format class code.
    pub fn from_u16(code: u16) -> Self {
        match code {
            1 => Self::In,
            3 => Self::Ch,
            4 => Self::Hs,
            255 => Self::Any,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::In => write!(f, "IN"),
            Self::Ch => write!(f, "CH"),
            Self::Hs => write!(f, "HS"),
            Self::Any => write!(f, "ANY"),
            Self::Unknown(code) => write!(f, "CLASS{}", code),
        }
    }
}
