//! Plain UDP transport.

use crate::resolver::Resolver;
use crate::{Result, UpstreamError};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::trace;

/// Hard deadline for a UDP exchange (RFC 1035 retransmission guidance).
const QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Receive buffer size; covers the common EDNS0 payload advertisement.
const MAX_UDP_PAYLOAD: usize = 4096;

/// Sends one query datagram and waits for a single response datagram.
///
/// The response slice is truncated to the bytes actually received so the
/// zero-padded remainder of the buffer never reaches the client. No
/// retry and no TCP fallback on truncation.
pub(crate) async fn send_query(resolver: &Resolver, query: &[u8]) -> Result<Vec<u8>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket
        .connect((resolver.hostname.as_str(), resolver.port))
        .await?;

    trace!(resolver = %resolver, len = query.len(), "dispatching UDP query");

    let exchange = async {
        socket.send(query).await?;

        let mut buf = vec![0u8; MAX_UDP_PAYLOAD];
        let n = socket.recv(&mut buf).await?;
        buf.truncate(n);
        Ok::<_, std::io::Error>(buf)
    };

    let response = timeout(QUERY_TIMEOUT, exchange)
        .await
        .map_err(|_| UpstreamError::Timeout)??;

    trace!(resolver = %resolver, len = response.len(), "received UDP response");
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn mock_resolver() -> (UdpSocket, Resolver) {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        let resolver = Resolver::from_uri(&format!("udp://127.0.0.1:{}", port)).unwrap();
        (server, resolver)
    }

    #[tokio::test]
    async fn exchanges_one_datagram() {
        let (server, resolver) = mock_resolver().await;

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (n, peer) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"query");
            server.send_to(b"response", peer).await.unwrap();
        });

        let response = send_query(&resolver, b"query").await.unwrap();
        assert_eq!(response, b"response");
    }

    #[tokio::test]
    async fn response_is_truncated_to_received_length() {
        let (server, resolver) = mock_resolver().await;

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (_, peer) = server.recv_from(&mut buf).await.unwrap();
            server.send_to(&[0xAB; 17], peer).await.unwrap();
        });

        let response = send_query(&resolver, b"query").await.unwrap();
        assert_eq!(response.len(), 17);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_resolver_times_out() {
        let (_server, resolver) = mock_resolver().await;

        let result = send_query(&resolver, b"query").await;
        assert!(matches!(result, Err(UpstreamError::Timeout)));
    }
}
