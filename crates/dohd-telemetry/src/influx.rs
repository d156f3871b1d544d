//! InfluxDB 1.x line-protocol sink.

use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// Measurement name for all gateway statistics.
const MEASUREMENT: &str = "dohStatistics";

/// Tag key distinguishing the per-category points.
const CATEGORY_TAG: &str = "ServiceStats";

/// Deadline for a write request.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Sink write error.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("write request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sink responded with HTTP status code={0}")]
    Status(u16),
}

/// One data point: a category tag and its counter fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Point {
    /// Category tag value (`HTTP`, `DNS`, ...).
    pub category: &'static str,

    /// Counter fields in render order.
    pub fields: Vec<(&'static str, u64)>,
}

impl Point {
    /// Renders the point in line protocol with a seconds-precision
    /// timestamp.
    pub fn line(&self, timestamp_secs: u64) -> String {
        let fields = self
            .fields
            .iter()
            .map(|(name, value)| format!("{}={}i", name, value))
            .collect::<Vec<_>>()
            .join(",");

        format!(
            "{},{}={} {} {}",
            MEASUREMENT, CATEGORY_TAG, self.category, fields, timestamp_secs
        )
    }
}

/// HTTP client for the InfluxDB `/write` endpoint.
pub struct InfluxSink {
    client: Client,
    url: String,
    database: String,
    username: String,
    password: String,
}

impl InfluxSink {
    /// Creates a sink for the given InfluxDB base URL and database.
    pub fn new(
        url: &str,
        database: &str,
        username: &str,
        password: &str,
    ) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(WRITE_TIMEOUT).build()?;

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            database: database.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Writes a batch of points as one request.
    pub async fn write(&self, points: &[Point], timestamp_secs: u64) -> Result<(), SinkError> {
        let body = points
            .iter()
            .map(|p| p.line(timestamp_secs))
            .collect::<Vec<_>>()
            .join("\n");

        trace!(points = points.len(), "pushing telemetry batch");

        let mut request = self
            .client
            .post(format!("{}/write", self.url))
            .query(&[("db", self.database.as_str()), ("precision", "s")])
            .body(body);

        if !self.username.is_empty() {
            request = request.basic_auth(&self.username, Some(&self.password));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SinkError::Status(response.status().as_u16()));
        }

        Ok(())
    }
}
