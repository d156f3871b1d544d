//! DoH transport over HTTPS (RFC 8484 client side).

use crate::resolver::{DohMethod, Resolver};
use crate::{Result, UpstreamError};
use data_encoding::BASE64URL_NOPAD;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::trace;

/// MIME type for DNS messages per RFC 8484.
pub(crate) const DNS_MESSAGE_CONTENT_TYPE: &str = "application/dns-message";

/// Connect phase deadline (TCP dial + TLS handshake).
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Deadline for the complete request once connected.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// How long idle upstream connections are kept for reuse.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Builds the shared HTTPS client for all DoH resolvers.
///
/// TLS verification stays enabled; a resolver with a bad certificate is
/// treated as a failed dispatch like any other transport error.
pub(crate) fn build_client() -> reqwest::Result<Client> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .build()
}

/// Sends a query to a DoH resolver using its configured method.
pub(crate) async fn send_query(
    client: &Client,
    resolver: &Resolver,
    query: &[u8],
) -> Result<Vec<u8>> {
    let url = format!("https://{}:{}/dns-query", resolver.hostname, resolver.port);

    trace!(resolver = %resolver, method = ?resolver.method, "dispatching DoH query");

    let response = match resolver.method {
        DohMethod::Post => {
            client
                .post(&url)
                .header(CONTENT_TYPE, DNS_MESSAGE_CONTENT_TYPE)
                .body(query.to_vec())
                .send()
                .await?
        }
        DohMethod::Get => {
            client
                .get(&url)
                .query(&[("dns", BASE64URL_NOPAD.encode(query))])
                .send()
                .await?
        }
    };

    if response.status() != StatusCode::OK {
        return Err(UpstreamError::HttpStatus(response.status().as_u16()));
    }

    Ok(response.bytes().await?.to_vec())
}
