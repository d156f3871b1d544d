//! Message-level projections used by the query pipeline.

use crate::header::{Header, HEADER_SIZE};
use crate::name::skip_name;
use crate::question::Question;
use crate::rtype::RecordType;
use crate::wire::WireReader;
use crate::{Error, Result};
use data_encoding::BASE64;

/// Cache identity of a query, derived from its first question.
///
/// The key is `base64("{qname}:{qclass}:{qtype}")` over the canonical
/// lower-cased name, so semantically equal questions map to the same
/// cache entry irrespective of transaction ID or name case. The question
/// type rides along for telemetry classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// Base64 cache key.
    pub key: String,

    /// Type of the first question.
    pub qtype: RecordType,
}

/// Derives the [`Fingerprint`] of a wire-format query.
///
/// Per RFC 8484 §4.1 a DoH request carries a single question; messages
/// with several are fingerprinted on the first and the rest are ignored.
pub fn fingerprint(msg: &[u8]) -> Result<Fingerprint> {
    let header = Header::parse(msg)?;
    if header.qd_count == 0 {
        return Err(Error::NoQuestion);
    }

    let (question, _) = Question::parse(msg, HEADER_SIZE)?;

    let identity = format!("{}:{}:{}", question.qname, question.qclass, question.qtype);
    Ok(Fingerprint {
        key: BASE64.encode(identity.as_bytes()),
        qtype: question.qtype,
    })
}

/// Returns the smallest TTL across the answer section of a response.
///
/// RFC 8484 §5.1: the HTTP freshness lifetime must not exceed the
/// smallest answer TTL. A response with no answers yields `0`, which the
/// cache adapter treats as "do not cache".
pub fn min_ttl(msg: &[u8]) -> Result<u32> {
    let header = Header::parse(msg)?;

    let mut pos = HEADER_SIZE;

    // Questions carry no TTL; step over them.
    for _ in 0..header.qd_count {
        pos += skip_name(msg, pos)?;
        let mut rd = WireReader::new(msg);
        rd.set_position(pos);
        rd.advance(4)?; // QTYPE + QCLASS
        pos = rd.position();
    }

    let mut smallest: Option<u32> = None;

    for _ in 0..header.an_count {
        pos += skip_name(msg, pos)?;

        let mut rd = WireReader::new(msg);
        rd.set_position(pos);
        rd.advance(4)?; // TYPE + CLASS
        let ttl = rd.read_u32()?;
        let rd_length = rd.read_u16()? as usize;
        rd.advance(rd_length)?;
        pos = rd.position();

        smallest = Some(match smallest {
            Some(current) => current.min(ttl),
            None => ttl,
        });
    }

    Ok(smallest.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_name(name: &str) -> Vec<u8> {
        let mut out = Vec::new();
        for label in name.split('.').filter(|l| !l.is_empty()) {
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
        }
        out.push(0);
        out
    }

    fn query(name: &str, qtype: u16) -> Vec<u8> {
        let mut msg = Vec::new();
        msg.extend_from_slice(&0x4a3bu16.to_be_bytes()); // ID
        msg.extend_from_slice(&0x0100u16.to_be_bytes()); // RD
        msg.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
        msg.extend_from_slice(&[0; 6]); // AN/NS/AR
        msg.extend_from_slice(&encode_name(name));
        msg.extend_from_slice(&qtype.to_be_bytes());
        msg.extend_from_slice(&1u16.to_be_bytes()); // IN
        msg
    }

    fn response(name: &str, ttls: &[u32]) -> Vec<u8> {
        let mut msg = query(name, 1);
        msg[2] = 0x81; // QR
        let an = (ttls.len() as u16).to_be_bytes();
        msg[6] = an[0];
        msg[7] = an[1];

        for (i, &ttl) in ttls.iter().enumerate() {
            msg.extend_from_slice(&[0xC0, 0x0C]); // pointer to question name
            msg.extend_from_slice(&1u16.to_be_bytes()); // A
            msg.extend_from_slice(&1u16.to_be_bytes()); // IN
            msg.extend_from_slice(&ttl.to_be_bytes());
            msg.extend_from_slice(&4u16.to_be_bytes());
            msg.extend_from_slice(&[192, 0, 2, i as u8]);
        }
        msg
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let msg = query("example.com", 1);
        let a = fingerprint(&msg).unwrap();
        let b = fingerprint(&msg).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.qtype, RecordType::A);
        assert_eq!(a.key, BASE64.encode(b"example.com.:IN:A"));
    }

    #[test]
    fn fingerprint_ignores_transaction_id_and_case() {
        let lower = query("example.com", 1);
        let mut upper = query("EXAMPLE.COM", 1);
        upper[0] = 0xFF;
        upper[1] = 0xFF;
        assert_eq!(
            fingerprint(&lower).unwrap().key,
            fingerprint(&upper).unwrap().key
        );
    }

    #[test]
    fn fingerprint_differs_across_types() {
        let a = fingerprint(&query("example.com", 1)).unwrap();
        let aaaa = fingerprint(&query("example.com", 28)).unwrap();
        assert_ne!(a.key, aaaa.key);
        assert_eq!(aaaa.qtype, RecordType::Aaaa);
    }

    #[test]
    fn fingerprint_takes_first_question() {
        let mut msg = query("first.example", 1);
        msg[5] = 2; // QDCOUNT = 2
        msg.extend_from_slice(&encode_name("second.example"));
        msg.extend_from_slice(&28u16.to_be_bytes());
        msg.extend_from_slice(&1u16.to_be_bytes());

        let fp = fingerprint(&msg).unwrap();
        assert_eq!(fp.key, BASE64.encode(b"first.example.:IN:A"));
    }

    #[test]
    fn no_question_is_an_error() {
        let mut msg = query("example.com", 1);
        msg[5] = 0;
        assert_eq!(fingerprint(&msg), Err(Error::NoQuestion));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(fingerprint(&[0u8; 5]).is_err());
        let mut msg = query("example.com", 1);
        msg.truncate(16);
        assert!(fingerprint(&msg).is_err());
    }

    #[test]
    fn min_ttl_picks_smallest_answer() {
        let msg = response("example.com", &[300, 60, 600]);
        assert_eq!(min_ttl(&msg).unwrap(), 60);
    }

    #[test]
    fn min_ttl_single_answer() {
        let msg = response("example.com", &[86400]);
        assert_eq!(min_ttl(&msg).unwrap(), 86400);
    }

    #[test]
    fn min_ttl_without_answers_is_zero() {
        let msg = response("example.com", &[]);
        assert_eq!(min_ttl(&msg).unwrap(), 0);
    }

    #[test]
    fn min_ttl_honors_zero_ttl_answer() {
        let msg = response("example.com", &[120, 0]);
        assert_eq!(min_ttl(&msg).unwrap(), 0);
    }

    #[test]
    fn min_ttl_rejects_truncated_answer() {
        let mut msg = response("example.com", &[300]);
        msg.truncate(msg.len() - 3);
        assert!(min_ttl(&msg).is_err());
    }

    #[test]
    fn question_class_is_rendered() {
        let mut msg = query("example.com", 255);
        let fp = fingerprint(&msg).unwrap();
        assert_eq!(fp.qtype, RecordType::Any);
        assert_eq!(fp.key, BASE64.encode(b"example.com.:IN:ANY"));

        // CH class keys differently from IN.
        let len = msg.len();
        msg[len - 1] = 3; // CLASS CH
        let ch = fingerprint(&msg).unwrap();
        assert_ne!(ch.key, fp.key);
    }
}
