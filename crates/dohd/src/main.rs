//! dohd, a DNS-over-HTTPS gateway.
//!
//! Accepts wire-format DNS queries over HTTP(S) per RFC 8484, forwards
//! them to configured upstream resolvers, caches responses in Redis and
//! pushes request telemetry to InfluxDB.

use anyhow::{bail, Context, Result};
use clap::Parser;
use dohd_cache::ResponseCache;
use dohd_config::Config;
use dohd_server::{bind_listener, load_tls_config, router, serve_http, serve_tls, Gateway};
use dohd_telemetry::{Collector, InfluxSink};
use dohd_upstream::ResolverPool;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// dohd - DNS-over-HTTPS gateway
#[derive(Parser, Debug)]
#[command(name = "dohd", version, about)]
struct Cli {
    /// Configuration file (optional)
    #[arg(long = "configfile", value_name = "FILE")]
    configfile: Option<PathBuf>,

    /// Verbose mode (info-level logging)
    #[arg(long)]
    verbose: bool,

    /// Debug mode (debug-level logging)
    #[arg(long)]
    debug: bool,
}

/// Locates the configuration file: an explicit `--configfile` must
/// exist, otherwise the standard locations are searched and a missing
/// file simply means defaults.
fn find_config_file(explicit: Option<PathBuf>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            bail!("error accessing '{}': no such file", path.display());
        }
        return Ok(Some(path));
    }

    let search_paths = [
        PathBuf::from("./dohd.yaml"),
        PathBuf::from("./conf/dohd.yaml"),
        PathBuf::from("/etc/dohd/dohd.yaml"),
    ];

    Ok(search_paths.into_iter().find(|path| path.exists()))
}

fn init_logging(level: Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

fn listen_addr(listen: &str, port: u16) -> Result<SocketAddr> {
    let host = if listen.is_empty() { "0.0.0.0" } else { listen };
    format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("invalid listen address '{}'", host))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_file = find_config_file(cli.configfile)?;
    let mut config = match &config_file {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("reading config file {}", path.display()))?,
        None => {
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // CLI flags override the configured log level
    if cli.debug {
        config.global.loglevel = "debug".to_string();
    } else if cli.verbose {
        config.global.loglevel = "info".to_string();
    }

    let level = config
        .log_level()
        .context("configuration validation failed")?;
    init_logging(level);

    if let Some(path) = &config_file {
        info!(path = %path.display(), "using config file");
    }

    config.validate().context("configuration validation failed")?;
    debug!(?config, "runtime configuration");

    let _ = rustls::crypto::ring::default_provider().install_default();

    // telemetry collector; runs even with the sink disabled so producers
    // never back up
    let (telemetry, telemetry_rx) = dohd_telemetry::channel();
    let sink = if config.influx.enable {
        Some(
            InfluxSink::new(
                &config.influx.url,
                &config.influx.database,
                &config.influx.username,
                &config.influx.password,
            )
            .context("building telemetry sink")?,
        )
    } else {
        info!("InfluxDB telemetry forwarding is disabled");
        None
    };
    tokio::spawn(Collector::new(telemetry_rx, sink).run());

    // upstream resolver pool
    if config.dns.resolvers.is_empty() {
        warn!("no DNS resolvers configured, queries will fail until resolvers are added");
    }
    let pool =
        ResolverPool::from_uris(&config.dns.resolvers).context("building resolver pool")?;
    for resolver in pool.all() {
        info!(resolver = %resolver, "registered upstream resolver");
    }

    // response cache; an unreachable backend degrades to caching off
    let cache = if config.redis.enable {
        match ResponseCache::connect(&config.redis.addr, config.redis.port, &config.redis.password)
            .await
        {
            Ok(cache) => cache,
            Err(e) => {
                warn!(error = %e, "redis unavailable, caching disabled");
                ResponseCache::disabled()
            }
        }
    } else {
        ResponseCache::disabled()
    };

    let gateway = Arc::new(Gateway::new(pool, cache, telemetry));
    let app = router(gateway);

    let mut servers = tokio::task::JoinSet::new();

    if config.http.enable {
        let addr = listen_addr(&config.global.listen, config.http.port)?;
        let listener = bind_listener(addr)
            .await
            .with_context(|| format!("binding HTTP listener on {}", addr))?;
        let app = app.clone();
        servers.spawn(async move { serve_http(listener, app).await });
        info!("HTTP server started");
    }

    if config.tls.enable {
        let tls_config = load_tls_config(&config.tls.cert, &config.tls.pkey)
            .context("loading TLS certificate")?;
        let addr = listen_addr(&config.global.listen, config.tls.port)?;
        let listener = bind_listener(addr)
            .await
            .with_context(|| format!("binding TLS listener on {}", addr))?;
        let app = app.clone();
        servers.spawn(async move { serve_tls(listener, tls_config, app).await });
        info!("TLS HTTP server started");
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        Some(finished) = servers.join_next() => {
            finished.context("server task panicked")??;
        }
    }

    Ok(())
}
