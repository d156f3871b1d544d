//! Query pipeline: validate, fingerprint, cache, dispatch, reply.

use axum::http::StatusCode;
use dohd_cache::ResponseCache;
use dohd_telemetry::Event;
use dohd_upstream::{ResolverPool, UpstreamError};
use thiserror::Error;
use tracing::debug;

/// Smallest acceptable DNS request: a 12-byte header plus a minimal
/// question. Anything below is rejected before any upstream or cache
/// interaction.
pub const MIN_REQUEST_SIZE: usize = 28;

/// Client cache preferences from the `Cache-Control` request header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheDirectives {
    /// `no-cache`: answer from upstream, not from the server-side cache.
    pub no_cache: bool,

    /// `no-store`: do not add the response to the server-side cache.
    pub no_store: bool,
}

/// A completed DNS answer ready for the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsPayload {
    /// Wire-format response bytes.
    pub body: Vec<u8>,

    /// Freshness lifetime for the `Cache-Control: max-age` header.
    pub max_age: u32,
}

/// Pipeline failure, mapped onto an HTTP status for the client.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Malformed request: DNS payload is below threshold")]
    Undersized,

    #[error("Error in DNS question: {0}")]
    Question(#[source] dohd_proto::Error),

    #[error("Error during DNS resolution: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Error when parsing DNS response: {0}")]
    Response(#[source] dohd_proto::Error),
}

impl PipelineError {
    /// HTTP status reported to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Undersized | Self::Question(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Response(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Shared gateway state: resolver pool, response cache and telemetry
/// producer. Built once at startup and handed to the router.
pub struct Gateway {
    pool: ResolverPool,
    cache: ResponseCache,
    telemetry: dohd_telemetry::Sender,
}

impl Gateway {
    /// Assembles the gateway from its collaborators.
    pub fn new(
        pool: ResolverPool,
        cache: ResponseCache,
        telemetry: dohd_telemetry::Sender,
    ) -> Self {
        Self {
            pool,
            cache,
            telemetry,
        }
    }

    /// Telemetry producer handle, shared with the HTTP middleware.
    pub fn telemetry(&self) -> &dohd_telemetry::Sender {
        &self.telemetry
    }

    /// Answers one wire-format DNS request.
    ///
    /// Order is strict: size floor, question fingerprint, cache lookup,
    /// upstream dispatch on a miss, TTL extraction, conditional store.
    /// `no-cache` skips the lookup, `no-store` skips the store and pins
    /// the advertised freshness to zero.
    pub async fn handle_query(
        &self,
        request: &[u8],
        directives: CacheDirectives,
    ) -> Result<DnsPayload, PipelineError> {
        if request.len() < MIN_REQUEST_SIZE {
            return Err(PipelineError::Undersized);
        }

        let fp = dohd_proto::fingerprint(request).map_err(PipelineError::Question)?;
        debug!(qtype = %fp.qtype, key = %fp.key, "handling DNS question");
        self.telemetry.emit(Event::from(fp.qtype));

        let cached = if directives.no_cache {
            debug!("client requested Cache-Control: no-cache");
            None
        } else {
            let hit = self.cache.fetch(&fp.key).await;
            if self.cache.is_enabled() {
                self.telemetry.emit(if hit.is_some() {
                    Event::CacheHit
                } else {
                    Event::CacheMiss
                });
            }
            hit
        };

        if let Some(hit) = cached {
            debug!(remaining = hit.remaining, "answering from cache");
            return Ok(DnsPayload {
                max_age: if directives.no_store { 0 } else { hit.remaining },
                body: hit.body,
            });
        }

        let response = self.pool.send(request).await?;
        let ttl = dohd_proto::min_ttl(&response).map_err(PipelineError::Response)?;
        debug!(ttl, len = response.len(), "upstream answered");

        if directives.no_store {
            debug!("client requested Cache-Control: no-store");
        } else {
            self.cache.store(&fp.key, &response, ttl).await;
        }

        Ok(DnsPayload {
            max_age: if directives.no_store { 0 } else { ttl },
            body: response,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use dohd_upstream::Resolver;
    use std::sync::Arc;
    use tokio::net::UdpSocket;
    use tokio::sync::mpsc;

    fn encode_name(name: &str) -> Vec<u8> {
        let mut out = Vec::new();
        for label in name.split('.').filter(|l| !l.is_empty()) {
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
        }
        out.push(0);
        out
    }

    pub(crate) fn query(name: &str, qtype: u16) -> Vec<u8> {
        let mut msg = Vec::new();
        msg.extend_from_slice(&0x1234u16.to_be_bytes());
        msg.extend_from_slice(&0x0100u16.to_be_bytes());
        msg.extend_from_slice(&1u16.to_be_bytes());
        msg.extend_from_slice(&[0; 6]);
        msg.extend_from_slice(&encode_name(name));
        msg.extend_from_slice(&qtype.to_be_bytes());
        msg.extend_from_slice(&1u16.to_be_bytes());
        msg
    }

    pub(crate) fn response(name: &str, ttls: &[u32]) -> Vec<u8> {
        let mut msg = query(name, 1);
        msg[2] = 0x81;
        let an = (ttls.len() as u16).to_be_bytes();
        msg[6] = an[0];
        msg[7] = an[1];
        for (i, &ttl) in ttls.iter().enumerate() {
            msg.extend_from_slice(&[0xC0, 0x0C]);
            msg.extend_from_slice(&1u16.to_be_bytes());
            msg.extend_from_slice(&1u16.to_be_bytes());
            msg.extend_from_slice(&ttl.to_be_bytes());
            msg.extend_from_slice(&4u16.to_be_bytes());
            msg.extend_from_slice(&[192, 0, 2, i as u8]);
        }
        msg
    }

    /// Spawns a one-shot UDP resolver answering every query with `reply`.
    pub(crate) async fn mock_udp_resolver(reply: Vec<u8>) -> Resolver {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();

        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                let Ok((_, peer)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                let _ = socket.send_to(&reply, peer).await;
            }
        });

        Resolver::from_uri(&format!("udp://127.0.0.1:{}", port)).unwrap()
    }

    fn gateway_with(pool: ResolverPool) -> (Gateway, mpsc::Receiver<Event>) {
        let (tx, rx) = dohd_telemetry::channel();
        (
            Gateway::new(pool, ResponseCache::disabled(), tx),
            rx,
        )
    }

    fn drain(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn undersized_request_is_rejected_without_dispatch() {
        // An empty pool would fail with NoResolvers if dispatch happened.
        let (gateway, mut rx) = gateway_with(ResolverPool::with_seed(vec![], 1).unwrap());

        let result = gateway
            .handle_query(&[0u8; 10], CacheDirectives::default())
            .await;

        assert!(matches!(result, Err(PipelineError::Undersized)));
        assert_eq!(
            result.unwrap_err().status(),
            StatusCode::BAD_REQUEST
        );
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn unparsable_question_is_a_client_error() {
        let (gateway, _rx) = gateway_with(ResolverPool::with_seed(vec![], 1).unwrap());

        let result = gateway
            .handle_query(&[0u8; 28], CacheDirectives::default())
            .await;

        assert!(matches!(result, Err(PipelineError::Question(_))));
    }

    #[tokio::test]
    async fn empty_pool_reports_bad_gateway() {
        let (gateway, _rx) = gateway_with(ResolverPool::with_seed(vec![], 1).unwrap());

        let result = gateway
            .handle_query(&query("example.com", 1), CacheDirectives::default())
            .await;

        let err = result.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Upstream(UpstreamError::NoResolvers)
        ));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn miss_path_reflects_minimum_ttl() {
        let reply = response("example.com", &[300, 60]);
        let resolver = mock_udp_resolver(reply.clone()).await;
        let pool = ResolverPool::with_seed(vec![Arc::new(resolver)], 1).unwrap();
        let (gateway, mut rx) = gateway_with(pool);

        let payload = gateway
            .handle_query(&query("example.com", 1), CacheDirectives::default())
            .await
            .unwrap();

        assert_eq!(payload.body, reply);
        assert_eq!(payload.max_age, 60);

        // question type was counted; no cache events with caching off
        let events = drain(&mut rx);
        assert_eq!(events, vec![Event::DnsA]);
    }

    #[tokio::test]
    async fn no_store_pins_max_age_to_zero() {
        let reply = response("example.com", &[300]);
        let resolver = mock_udp_resolver(reply).await;
        let pool = ResolverPool::with_seed(vec![Arc::new(resolver)], 1).unwrap();
        let (gateway, _rx) = gateway_with(pool);

        let payload = gateway
            .handle_query(
                &query("example.com", 1),
                CacheDirectives {
                    no_cache: false,
                    no_store: true,
                },
            )
            .await
            .unwrap();

        assert_eq!(payload.max_age, 0);
    }

    #[tokio::test]
    async fn answerless_response_is_not_cacheable() {
        let reply = response("example.com", &[]);
        let resolver = mock_udp_resolver(reply).await;
        let pool = ResolverPool::with_seed(vec![Arc::new(resolver)], 1).unwrap();
        let (gateway, _rx) = gateway_with(pool);

        let payload = gateway
            .handle_query(&query("example.com", 1), CacheDirectives::default())
            .await
            .unwrap();

        assert_eq!(payload.max_age, 0);
    }

    #[tokio::test]
    async fn garbage_upstream_response_is_a_server_error() {
        let resolver = mock_udp_resolver(vec![0xFF; 5]).await;
        let pool = ResolverPool::with_seed(vec![Arc::new(resolver)], 1).unwrap();
        let (gateway, _rx) = gateway_with(pool);

        let err = gateway
            .handle_query(&query("example.com", 1), CacheDirectives::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Response(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
