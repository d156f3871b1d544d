//! Resolver pool with random selection.

use crate::resolver::{Resolver, Scheme};
use crate::{doh, udp, Result, UpstreamError};
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::debug;

/// The set of configured upstream resolvers.
///
/// Selection is uniform random over the reachable subset; the generator
/// is seeded once at construction and injected rather than taken from a
/// process-wide source, so tests can pin the pick order.
pub struct ResolverPool {
    resolvers: Vec<Arc<Resolver>>,
    client: reqwest::Client,
    rng: Mutex<SmallRng>,
}

impl ResolverPool {
    /// Creates a pool with an entropy-seeded generator.
    pub fn new(resolvers: Vec<Arc<Resolver>>) -> Result<Self> {
        Self::with_rng(resolvers, SmallRng::from_entropy())
    }

    /// Creates a pool with a deterministic generator.
    pub fn with_seed(resolvers: Vec<Arc<Resolver>>, seed: u64) -> Result<Self> {
        Self::with_rng(resolvers, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(resolvers: Vec<Arc<Resolver>>, rng: SmallRng) -> Result<Self> {
        Ok(Self {
            resolvers,
            client: doh::build_client()?,
            rng: Mutex::new(rng),
        })
    }

    /// Parses a pool from configuration URIs.
    pub fn from_uris<S: AsRef<str>>(uris: &[S]) -> Result<Self> {
        let resolvers = uris
            .iter()
            .map(|uri| Resolver::from_uri(uri.as_ref()).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        Self::new(resolvers)
    }

    /// Returns all configured resolvers.
    pub fn all(&self) -> &[Arc<Resolver>] {
        &self.resolvers
    }

    /// Returns the resolvers currently believed reachable.
    pub fn active(&self) -> Vec<Arc<Resolver>> {
        self.resolvers
            .iter()
            .filter(|r| r.is_reachable())
            .cloned()
            .collect()
    }

    /// Picks a resolver uniformly at random from the active set.
    fn pick(&self) -> Result<Arc<Resolver>> {
        let active = self.active();
        if active.is_empty() {
            return Err(UpstreamError::NoResolvers);
        }

        let index = self.rng.lock().gen_range(0..active.len());
        Ok(active[index].clone())
    }

    /// Transports a wire-format query to one resolver and returns its
    /// wire-format response.
    pub async fn send(&self, query: &[u8]) -> Result<Vec<u8>> {
        let resolver = self.pick()?;

        debug!(resolver = %resolver, "forwarding query upstream");

        match resolver.scheme {
            Scheme::Udp => udp::send_query(&resolver, query).await,
            Scheme::Https => doh::send_query(&self.client, &resolver, query).await,
        }
    }
}
