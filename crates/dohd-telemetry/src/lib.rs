//! # dohd telemetry
//!
//! Request counters aggregated in-process and periodically pushed to an
//! InfluxDB sink. Producers fire [`Event`]s into a bounded channel from
//! anywhere in the request path; a single [`Collector`] task owns the
//! counter table, flushes it on a fixed tick, and injects a keep-alive
//! event so the sink sees liveness even when the gateway is idle.
//!
//! Producers never block: when the channel is full the event is dropped
//! and the drop is logged. Telemetry loss is always preferable to
//! holding up a DNS response.

use tokio::sync::mpsc;
use tracing::debug;

pub mod collector;
pub mod influx;

pub use collector::Collector;
pub use influx::{InfluxSink, Point, SinkError};

/// Depth of the producer/consumer channel.
pub const CHANNEL_CAPACITY: usize = 4096;

/// A countable request event.
///
/// The set is closed; each variant belongs to exactly one [`Category`]
/// and maps to one field of the category's outbound data point. Values
/// are opaque in transit, names only appear in the sink format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    HttpGet,
    HttpPost,
    DnsA,
    DnsAaaa,
    DnsCname,
    DnsMx,
    DnsNs,
    DnsPtr,
    DnsSoa,
    DnsSrv,
    DnsTxt,
    DnsHinfo,
    DnsMinfo,
    DnsWks,
    DnsAny,
    CacheHit,
    CacheMiss,
    KeepAlive,
}

/// Grouping of events into outbound data points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Http,
    Dns,
    Cache,
    Service,
}

impl Category {
    /// All categories, in push order.
    pub const ALL: [Category; 4] = [Self::Http, Self::Dns, Self::Cache, Self::Service];

    /// Tag value used in the outbound point.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Dns => "DNS",
            Self::Cache => "Cache",
            Self::Service => "Service",
        }
    }
}

impl Event {
    /// All events, in field render order.
    pub const ALL: [Event; 18] = [
        Self::HttpGet,
        Self::HttpPost,
        Self::DnsA,
        Self::DnsAaaa,
        Self::DnsCname,
        Self::DnsMx,
        Self::DnsNs,
        Self::DnsPtr,
        Self::DnsSoa,
        Self::DnsSrv,
        Self::DnsTxt,
        Self::DnsHinfo,
        Self::DnsMinfo,
        Self::DnsWks,
        Self::DnsAny,
        Self::CacheHit,
        Self::CacheMiss,
        Self::KeepAlive,
    ];

    /// The category whose data point carries this event.
    pub const fn category(&self) -> Category {
        match self {
            Self::HttpGet | Self::HttpPost => Category::Http,
            Self::DnsA
            | Self::DnsAaaa
            | Self::DnsCname
            | Self::DnsMx
            | Self::DnsNs
            | Self::DnsPtr
            | Self::DnsSoa
            | Self::DnsSrv
            | Self::DnsTxt
            | Self::DnsHinfo
            | Self::DnsMinfo
            | Self::DnsWks
            | Self::DnsAny => Category::Dns,
            Self::CacheHit | Self::CacheMiss => Category::Cache,
            Self::KeepAlive => Category::Service,
        }
    }

    /// Field name in the outbound point.
    pub const fn field(&self) -> &'static str {
        match self {
            Self::HttpGet => "GET",
            Self::HttpPost => "POST",
            Self::DnsA => "TypeA",
            Self::DnsAaaa => "TypeAAAA",
            Self::DnsCname => "TypeCNAME",
            Self::DnsMx => "TypeMX",
            Self::DnsNs => "TypeNS",
            Self::DnsPtr => "TypePTR",
            Self::DnsSoa => "TypeSOA",
            Self::DnsSrv => "TypeSRV",
            Self::DnsTxt => "TypeTXT",
            Self::DnsHinfo => "TypeHINFO",
            Self::DnsMinfo => "TypeMINFO",
            Self::DnsWks => "TypeWKS",
            Self::DnsAny => "TypeANY",
            Self::CacheHit => "Hit",
            Self::CacheMiss => "Miss",
            Self::KeepAlive => "KeepAlive",
        }
    }
}

impl From<dohd_proto::RecordType> for Event {
    /// Classifies a question type. Types outside the counted set fall
    /// into the ANY bucket rather than growing the table.
    fn from(rtype: dohd_proto::RecordType) -> Self {
        use dohd_proto::RecordType;
        match rtype {
            RecordType::A => Self::DnsA,
            RecordType::Aaaa => Self::DnsAaaa,
            RecordType::Cname => Self::DnsCname,
            RecordType::Mx => Self::DnsMx,
            RecordType::Ns => Self::DnsNs,
            RecordType::Ptr => Self::DnsPtr,
            RecordType::Soa => Self::DnsSoa,
            RecordType::Srv => Self::DnsSrv,
            RecordType::Txt => Self::DnsTxt,
            RecordType::Hinfo => Self::DnsHinfo,
            RecordType::Minfo => Self::DnsMinfo,
            RecordType::Wks => Self::DnsWks,
            RecordType::Any | RecordType::Unknown(_) => Self::DnsAny,
        }
    }
}

/// Producer handle, cheap to clone into every request task.
#[derive(Clone)]
pub struct Sender {
    tx: mpsc::Sender<Event>,
}

impl Sender {
    /// Emits an event without blocking. Dropped when the channel is full
    /// or the collector is gone.
    pub fn emit(&self, event: Event) {
        if let Err(e) = self.tx.try_send(event) {
            debug!(?event, error = %e, "telemetry event dropped");
        }
    }
}

/// Creates the producer/consumer pair with the standard channel depth.
pub fn channel() -> (Sender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    (Sender { tx }, rx)
}
