//! # dohd configuration
//!
//! Hierarchical configuration for the gateway, loaded from YAML, JSON or
//! TOML (chosen by file extension) with environment-variable overrides.
//! Every section has sensible defaults so a minimal deployment only needs
//! to list its upstream resolvers.
//!
//! ```yaml
//! global:
//!   loglevel: info
//! tls:
//!   cert: /etc/dohd/public.crt
//!   pkey: /etc/dohd/private.key
//! dns:
//!   resolvers:
//!     - udp://9.9.9.9
//!     - https://dns.example.net#GET
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::Level;

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Process-wide settings.
    pub global: GlobalConfig,

    /// Plain-HTTP listener.
    pub http: HttpConfig,

    /// TLS listener.
    pub tls: TlsConfig,

    /// Upstream DNS resolvers.
    pub dns: DnsConfig,

    /// Redis response cache.
    pub redis: RedisConfig,

    /// InfluxDB telemetry sink.
    pub influx: InfluxConfig,
}

impl Config {
    /// Loads configuration from a file, picking the parser by extension.
    /// Unknown extensions fall back to YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let mut config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?,
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Applies `DOHD_<SECTION>_<KEY>` environment overrides for scalar
    /// settings, e.g. `DOHD_REDIS_ADDR` or `DOHD_TLS_PORT`.
    pub fn apply_env_overrides(&mut self) {
        override_string("DOHD_GLOBAL_LISTEN", &mut self.global.listen);
        override_string("DOHD_GLOBAL_LOGLEVEL", &mut self.global.loglevel);
        override_bool("DOHD_HTTP_ENABLE", &mut self.http.enable);
        override_u16("DOHD_HTTP_PORT", &mut self.http.port);
        override_bool("DOHD_TLS_ENABLE", &mut self.tls.enable);
        override_u16("DOHD_TLS_PORT", &mut self.tls.port);
        override_path("DOHD_TLS_CERT", &mut self.tls.cert);
        override_path("DOHD_TLS_PKEY", &mut self.tls.pkey);
        override_bool("DOHD_REDIS_ENABLE", &mut self.redis.enable);
        override_string("DOHD_REDIS_ADDR", &mut self.redis.addr);
        override_u16("DOHD_REDIS_PORT", &mut self.redis.port);
        override_string("DOHD_REDIS_PASSWORD", &mut self.redis.password);
        override_bool("DOHD_INFLUX_ENABLE", &mut self.influx.enable);
        override_string("DOHD_INFLUX_URL", &mut self.influx.url);
        override_string("DOHD_INFLUX_DATABASE", &mut self.influx.database);
        override_string("DOHD_INFLUX_USERNAME", &mut self.influx.username);
        override_string("DOHD_INFLUX_PASSWORD", &mut self.influx.password);
    }

    /// Validates settings whose absence must abort startup.
    pub fn validate(&self) -> Result<()> {
        if !self.http.enable && !self.tls.enable {
            return Err(ConfigError::Validation(
                "no listener enabled; set http.enable or tls.enable".to_string(),
            ));
        }

        if self.tls.enable {
            if !self.tls.cert.exists() {
                return Err(ConfigError::Validation(format!(
                    "error accessing TLS certificate: {}",
                    self.tls.cert.display()
                )));
            }
            if !self.tls.pkey.exists() {
                return Err(ConfigError::Validation(format!(
                    "error accessing TLS private key: {}",
                    self.tls.pkey.display()
                )));
            }
        }

        if self.redis.enable && self.redis.addr.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "redis.addr".to_string(),
                message: "must not be empty when redis.enable is set".to_string(),
            });
        }

        if self.influx.enable {
            if self.influx.url.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "influx.url".to_string(),
                    message: "must not be empty when influx.enable is set".to_string(),
                });
            }
            if self.influx.database.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "influx.database".to_string(),
                    message: "must not be empty when influx.enable is set".to_string(),
                });
            }
        }

        self.log_level()?;

        Ok(())
    }

    /// Maps the syslog-style `global.loglevel` onto a tracing level.
    pub fn log_level(&self) -> Result<Level> {
        match self.global.loglevel.to_lowercase().as_str() {
            "emerg" | "alert" | "crit" | "err" | "error" => Ok(Level::ERROR),
            "warn" | "warning" => Ok(Level::WARN),
            "notice" | "info" => Ok(Level::INFO),
            "debug" => Ok(Level::DEBUG),
            other => Err(ConfigError::InvalidValue {
                field: "global.loglevel".to_string(),
                message: format!("unknown level '{}'", other),
            }),
        }
    }
}

fn override_string(var: &str, slot: &mut String) {
    if let Ok(value) = env::var(var) {
        *slot = value;
    }
}

fn override_path(var: &str, slot: &mut PathBuf) {
    if let Ok(value) = env::var(var) {
        *slot = PathBuf::from(value);
    }
}

fn override_bool(var: &str, slot: &mut bool) {
    if let Ok(value) = env::var(var) {
        if let Ok(parsed) = value.parse() {
            *slot = parsed;
        }
    }
}

fn override_u16(var: &str, slot: &mut u16) {
    if let Ok(value) = env::var(var) {
        if let Ok(parsed) = value.parse() {
            *slot = parsed;
        }
    }
}

/// Process-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Bind address for all listeners; empty means all interfaces.
    pub listen: String,

    /// Syslog-style log level: emerg, alert, crit, err, warn, notice,
    /// info or debug.
    pub loglevel: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            listen: String::new(),
            loglevel: "notice".to_string(),
        }
    }
}

/// Plain-HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Serve plain HTTP alongside TLS.
    pub enable: bool,

    /// Listener port.
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enable: false,
            port: 80,
        }
    }
}

/// TLS listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Serve HTTPS.
    pub enable: bool,

    /// Listener port.
    pub port: u16,

    /// PEM certificate chain.
    pub cert: PathBuf,

    /// PEM private key.
    pub pkey: PathBuf,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enable: true,
            port: 443,
            cert: PathBuf::from("./conf/public.crt"),
            pkey: PathBuf::from("./conf/private.key"),
        }
    }
}

/// Upstream resolver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    /// Resolver URIs of the form `scheme://host[:port][#method]` with
    /// `scheme` one of `udp` or `https`; the fragment selects the DoH
    /// request method (POST or GET).
    pub resolvers: Vec<String>,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            resolvers: vec!["udp://localhost".to_string()],
        }
    }
}

/// Redis response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Enable the response cache.
    pub enable: bool,

    /// Redis host.
    pub addr: String,

    /// Redis port.
    pub port: u16,

    /// AUTH password; empty disables authentication.
    pub password: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enable: false,
            addr: "localhost".to_string(),
            port: 6379,
            password: String::new(),
        }
    }
}

/// InfluxDB telemetry sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    /// Enable telemetry forwarding.
    pub enable: bool,

    /// Base URL of the InfluxDB HTTP API.
    pub url: String,

    /// Target database.
    pub database: String,

    /// Basic-auth username; empty disables authentication.
    pub username: String,

    /// Basic-auth password.
    pub password: String,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            enable: false,
            url: String::new(),
            database: String::new(),
            username: String::new(),
            password: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_are_complete() {
        let config = Config::default();
        assert_eq!(config.global.loglevel, "notice");
        assert!(!config.http.enable);
        assert_eq!(config.http.port, 80);
        assert!(config.tls.enable);
        assert_eq!(config.tls.port, 443);
        assert_eq!(config.dns.resolvers, vec!["udp://localhost"]);
        assert!(!config.redis.enable);
        assert_eq!(config.redis.port, 6379);
        assert!(!config.influx.enable);
    }

    #[test]
    fn loads_yaml_with_partial_sections() {
        let config = Config::from_yaml(
            r#"
http:
  enable: true
  port: 8080
dns:
  resolvers:
    - udp://9.9.9.9
    - https://dns.example.net#GET
"#,
        )
        .unwrap();

        assert!(config.http.enable);
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.dns.resolvers.len(), 2);
        // untouched sections keep their defaults
        assert_eq!(config.tls.port, 443);
    }

    #[test]
    fn loads_toml_by_extension() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "[http]\nenable = true\nport = 8053").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(config.http.enable);
        assert_eq!(config.http.port, 8053);
    }

    #[test]
    fn missing_file_is_reported() {
        assert!(matches!(
            Config::from_file("/nonexistent/dohd.yaml"),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn log_levels_map_to_tracing() {
        let mut config = Config::default();
        for (name, level) in [
            ("emerg", Level::ERROR),
            ("err", Level::ERROR),
            ("warn", Level::WARN),
            ("notice", Level::INFO),
            ("info", Level::INFO),
            ("debug", Level::DEBUG),
        ] {
            config.global.loglevel = name.to_string();
            assert_eq!(config.log_level().unwrap(), level);
        }

        config.global.loglevel = "chatty".to_string();
        assert!(config.log_level().is_err());
    }

    #[test]
    fn validate_rejects_missing_cert() {
        let mut config = Config::default();
        config.tls.cert = PathBuf::from("/nonexistent/cert.pem");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn validate_accepts_http_only() {
        let mut config = Config::default();
        config.tls.enable = false;
        config.http.enable = true;
        config.validate().unwrap();
    }

    #[test]
    fn validate_requires_some_listener() {
        let mut config = Config::default();
        config.tls.enable = false;
        config.http.enable = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_requires_influx_settings() {
        let mut config = Config::default();
        config.tls.enable = false;
        config.http.enable = true;
        config.influx.enable = true;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        config.influx.url = "http://localhost:8086".to_string();
        config.influx.database = "doh".to_string();
        config.validate().unwrap();
    }

    #[test]
    fn tls_cert_validation_with_existing_files() {
        let cert = NamedTempFile::new().unwrap();
        let pkey = NamedTempFile::new().unwrap();

        let mut config = Config::default();
        config.tls.cert = cert.path().to_path_buf();
        config.tls.pkey = pkey.path().to_path_buf();
        config.validate().unwrap();
    }
}
