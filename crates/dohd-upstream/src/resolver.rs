//! Upstream resolver description and URI parsing.

use crate::{Result, UpstreamError};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use url::Url;

/// Transport scheme of an upstream resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Plain DNS over UDP.
    Udp,
    /// DNS over HTTPS (RFC 8484).
    Https,
}

impl Scheme {
    /// Returns the default port for this scheme.
    pub const fn default_port(&self) -> u16 {
        match self {
            Self::Udp => 53,
            Self::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Udp => write!(f, "udp"),
            Self::Https => write!(f, "https"),
        }
    }
}

/// HTTP method used towards a DoH resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DohMethod {
    Post,
    Get,
}

/// A configured upstream resolver.
///
/// Parsed from a `scheme://host[:port][#method]` URI. The `reachable`
/// flag is owned by a future reachability prober; until one exists every
/// resolver starts out reachable and stays that way.
#[derive(Debug)]
pub struct Resolver {
    /// Hostname or address of the resolver.
    pub hostname: String,

    /// Transport scheme.
    pub scheme: Scheme,

    /// Target port, defaulted per scheme.
    pub port: u16,

    /// DoH request method; meaningless for UDP resolvers.
    pub method: DohMethod,

    reachable: AtomicBool,
}

impl Resolver {
    /// Parses a resolver from its configuration URI.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let invalid = |message: &str| UpstreamError::InvalidResolver {
            uri: uri.to_string(),
            message: message.to_string(),
        };

        let parsed = Url::parse(uri).map_err(|e| invalid(&e.to_string()))?;

        let scheme = match parsed.scheme() {
            "udp" => Scheme::Udp,
            "https" => Scheme::Https,
            other => return Err(invalid(&format!("unsupported scheme '{}'", other))),
        };

        let hostname = parsed
            .host_str()
            .ok_or_else(|| invalid("missing host"))?
            .to_string();

        let port = parsed.port().unwrap_or_else(|| scheme.default_port());

        let method = match parsed.fragment() {
            None | Some("") => DohMethod::Post,
            Some(fragment) if scheme == Scheme::Udp => {
                return Err(invalid(&format!(
                    "method '{}' is only valid for https resolvers",
                    fragment
                )))
            }
            Some(fragment) if fragment.eq_ignore_ascii_case("post") => DohMethod::Post,
            Some(fragment) if fragment.eq_ignore_ascii_case("get") => DohMethod::Get,
            Some(fragment) => {
                return Err(invalid(&format!("unsupported method '{}'", fragment)))
            }
        };

        Ok(Self {
            hostname,
            scheme,
            port,
            method,
            reachable: AtomicBool::new(true),
        })
    }

    /// Returns true if the resolver is currently believed reachable.
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Relaxed)
    }

    /// Marks the resolver reachable.
    pub fn mark_reachable(&self) {
        self.reachable.store(true, Ordering::Relaxed);
    }

    /// Marks the resolver unreachable.
    pub fn mark_unreachable(&self) {
        self.reachable.store(false, Ordering::Relaxed);
    }
}

impl fmt::Display for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.hostname, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn udp_defaults_to_port_53() {
        let resolver = Resolver::from_uri("udp://9.9.9.9").unwrap();
        assert_eq!(resolver.scheme, Scheme::Udp);
        assert_eq!(resolver.hostname, "9.9.9.9");
        assert_eq!(resolver.port, 53);
        assert!(resolver.is_reachable());
    }

    #[test]
    fn https_defaults_to_port_443_and_post() {
        let resolver = Resolver::from_uri("https://dns.example.net").unwrap();
        assert_eq!(resolver.scheme, Scheme::Https);
        assert_eq!(resolver.port, 443);
        assert_eq!(resolver.method, DohMethod::Post);
    }

    #[test]
    fn explicit_port_and_get_method() {
        let resolver = Resolver::from_uri("https://dns.example.net:8443#GET").unwrap();
        assert_eq!(resolver.port, 8443);
        assert_eq!(resolver.method, DohMethod::Get);
    }

    #[test]
    fn method_fragment_is_case_insensitive() {
        let resolver = Resolver::from_uri("https://dns.example.net#post").unwrap();
        assert_eq!(resolver.method, DohMethod::Post);
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        assert!(matches!(
            Resolver::from_uri("tcp://9.9.9.9"),
            Err(UpstreamError::InvalidResolver { .. })
        ));
    }

    #[test]
    fn method_on_udp_is_rejected() {
        assert!(Resolver::from_uri("udp://9.9.9.9#GET").is_err());
    }

    #[test]
    fn unknown_method_is_rejected() {
        assert!(Resolver::from_uri("https://dns.example.net#PUT").is_err());
    }

    #[test]
    fn reachability_flag_toggles() {
        let resolver = Resolver::from_uri("udp://9.9.9.9").unwrap();
        resolver.mark_unreachable();
        assert!(!resolver.is_reachable());
        resolver.mark_reachable();
        assert!(resolver.is_reachable());
    }

    #[test]
    fn display_includes_resolved_port() {
        let resolver = Resolver::from_uri("udp://localhost").unwrap();
        assert_eq!(resolver.to_string(), "udp://localhost:53");
    }
}
