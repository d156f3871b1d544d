//! Plain-HTTP and TLS listeners.
//!
//! Both listeners serve the same router. TLS termination follows RFC
//! 8484: HTTP/2 via ALPN with an HTTP/1.1 fallback, certificates from
//! PEM files checked at startup.

use crate::{Result, ServerError};
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnectionBuilder;
use hyper_util::service::TowerToHyperService;
use rustls::pki_types::CertificateDer;
use rustls::ServerConfig;
use socket2::{Domain, Socket, Type};
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info};

/// ALPN protocol identifiers, HTTP/2 preferred.
const ALPN_H2: &[u8] = b"h2";
const ALPN_HTTP11: &[u8] = b"http/1.1";

/// Loads TLS configuration from PEM certificate and key files.
pub fn load_tls_config<P: AsRef<Path>>(cert_path: P, key_path: P) -> Result<Arc<ServerConfig>> {
    let cert_file = File::open(cert_path.as_ref())
        .map_err(|e| ServerError::Tls(format!("failed to open certificate file: {}", e)))?;
    let mut cert_reader = BufReader::new(cert_file);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Tls(format!("failed to parse certificates: {}", e)))?;

    if certs.is_empty() {
        return Err(ServerError::Tls("no certificates found in file".into()));
    }

    let key_file = File::open(key_path.as_ref())
        .map_err(|e| ServerError::Tls(format!("failed to open key file: {}", e)))?;
    let mut key_reader = BufReader::new(key_file);
    let key = rustls_pemfile::private_key(&mut key_reader)
        .map_err(|e| ServerError::Tls(format!("failed to parse private key: {}", e)))?
        .ok_or_else(|| ServerError::Tls("no private key found in file".into()))?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Tls(format!("failed to build TLS config: {}", e)))?;

    config.alpn_protocols = vec![ALPN_H2.to_vec(), ALPN_HTTP11.to_vec()];

    Ok(Arc::new(config))
}

/// Binds a TCP listener with address reuse enabled.
pub async fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    let std_listener: std::net::TcpListener = socket.into();
    Ok(TcpListener::from_std(std_listener)?)
}

/// Serves the router over plain HTTP until the process ends.
pub async fn serve_http(listener: TcpListener, router: Router) -> Result<()> {
    info!(addr = %listener.local_addr()?, "HTTP server listening");
    axum::serve(listener, router).await?;
    Ok(())
}

/// Serves the router over TLS until the process ends.
///
/// Each accepted connection gets its own task; handshake and protocol
/// errors are logged and never tear down the accept loop.
pub async fn serve_tls(
    listener: TcpListener,
    tls_config: Arc<ServerConfig>,
    router: Router,
) -> Result<()> {
    info!(addr = %listener.local_addr()?, "TLS HTTP server listening");

    let acceptor = TlsAcceptor::from(tls_config);

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let acceptor = acceptor.clone();
                let router = router.clone();

                tokio::spawn(async move {
                    if let Err(e) = serve_tls_connection(stream, acceptor, router).await {
                        debug!(error = %e, client = %peer, "TLS connection ended");
                    }
                });
            }
            Err(e) => {
                error!(error = %e, "error accepting TLS connection");
            }
        }
    }
}

async fn serve_tls_connection(
    stream: TcpStream,
    acceptor: TlsAcceptor,
    router: Router,
) -> Result<()> {
    let tls_stream = acceptor
        .accept(stream)
        .await
        .map_err(|e| ServerError::Tls(format!("TLS handshake failed: {}", e)))?;

    let io = TokioIo::new(tls_stream);
    let service = TowerToHyperService::new(router);

    if let Err(e) = ConnectionBuilder::new(TokioExecutor::new())
        .serve_connection_with_upgrades(io, service)
        .await
    {
        // typically just a client disconnect
        debug!(error = %e, "HTTP connection ended");
    }

    Ok(())
}
