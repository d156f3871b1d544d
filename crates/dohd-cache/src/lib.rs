//! # dohd response cache
//!
//! Thin adapter over a Redis instance storing wire-format DNS responses
//! keyed by question fingerprint. The adapter never fails: any backend
//! error degrades to a cache miss on read and a dropped write on store,
//! logged at debug level, so the query pipeline behaves identically
//! whether the cache is healthy, broken, or disabled.
//!
//! Entries expire via Redis `EX`; a cached response can therefore never
//! outlive the minimum TTL of the answer that produced it. The remaining
//! expiry is read back alongside the value so cache hits can reflect an
//! accurate `Cache-Control: max-age` to the client.
//!
//! No cross-request coordination is attempted: two concurrent misses for
//! the same fingerprint both resolve upstream and both store,
//! last-writer-wins.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;
use tracing::debug;

/// Cache construction error. Only surfaces from [`ResponseCache::connect`];
/// all per-request operations swallow backend failures.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// A response fetched from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// Wire-format DNS response, byte-identical to what was stored.
    pub body: Vec<u8>,

    /// Seconds until the entry expires.
    pub remaining: u32,
}

/// Response cache backed by a Redis connection pool.
///
/// Construct with [`connect`](Self::connect) or, when caching is off,
/// [`disabled`](Self::disabled); the disabled form short-circuits both
/// operations so callers need no branching of their own.
#[derive(Clone)]
pub struct ResponseCache {
    manager: Option<ConnectionManager>,
}

impl ResponseCache {
    /// Connects to Redis and verifies the connection once.
    pub async fn connect(addr: &str, port: u16, password: &str) -> Result<Self, CacheError> {
        let url = if password.is_empty() {
            format!("redis://{}:{}/", addr, port)
        } else {
            format!("redis://:{}@{}:{}/", password, addr, port)
        };

        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;

        debug!(addr, port, "connected to redis");
        Ok(Self {
            manager: Some(manager),
        })
    }

    /// Creates a no-op cache.
    pub fn disabled() -> Self {
        Self { manager: None }
    }

    /// Returns true when a backend is configured.
    ///
    /// The pipeline uses this to suppress hit/miss telemetry when caching
    /// is off; the lookup itself needs no such check.
    pub fn is_enabled(&self) -> bool {
        self.manager.is_some()
    }

    /// Looks up a response by fingerprint.
    ///
    /// Returns `None` on miss, on any backend error, and always when
    /// disabled.
    pub async fn fetch(&self, key: &str) -> Option<CachedResponse> {
        let manager = self.manager.as_ref()?;
        let mut conn = manager.clone();

        let lookup: redis::RedisResult<(Option<Vec<u8>>, i64)> = redis::pipe()
            .get(key)
            .ttl(key)
            .query_async(&mut conn)
            .await;

        match lookup {
            Ok((Some(body), ttl)) => Some(CachedResponse {
                body,
                // TTL is -1 for keys without expiry and -2 between the
                // GET and the TTL if the entry just expired.
                remaining: ttl.max(0) as u32,
            }),
            Ok((None, _)) => None,
            Err(e) => {
                debug!(key, error = %e, "cache lookup failed, treating as miss");
                None
            }
        }
    }

    /// Stores a response under its fingerprint with a bounded lifetime.
    ///
    /// A zero TTL means the response must not be cached (no answers, per
    /// RFC 8484 §5.1) and the write is skipped. Errors are swallowed.
    pub async fn store(&self, key: &str, body: &[u8], ttl_secs: u32) {
        let Some(manager) = self.manager.as_ref() else {
            return;
        };
        if ttl_secs == 0 {
            return;
        }

        let mut conn = manager.clone();
        let result: redis::RedisResult<()> =
            conn.set_ex(key, body, u64::from(ttl_secs)).await;

        if let Err(e) = result {
            debug!(key, error = %e, "cache store failed, response not cached");
        }
    }
}
