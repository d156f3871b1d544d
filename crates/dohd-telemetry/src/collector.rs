//! Single-consumer counter aggregation.

use crate::influx::{InfluxSink, Point};
use crate::{Category, Event};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

/// How often accumulated counters are pushed to the sink.
const FLUSH_INTERVAL: Duration = Duration::from_secs(2);

/// How often a keep-alive event is self-injected.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// Minimum spacing between warnings about a failing sink.
const PUSH_WARN_INTERVAL: Duration = Duration::from_secs(60);

/// The telemetry consumer.
///
/// Owns the counter table exclusively; producers only ever touch the
/// channel. Counters survive a failed push and are retried with the
/// next tick; they reset only after the sink accepted the batch.
pub struct Collector {
    rx: mpsc::Receiver<Event>,
    sink: Option<InfluxSink>,
    counters: HashMap<Event, u64>,
    last_push_warning: Option<Instant>,
}

impl Collector {
    /// Creates a collector. With `sink` unset the collector still drains
    /// the channel so producers never observe backpressure, but discards
    /// every event.
    pub fn new(rx: mpsc::Receiver<Event>, sink: Option<InfluxSink>) -> Self {
        Self {
            rx,
            sink,
            counters: HashMap::new(),
            last_push_warning: None,
        }
    }

    /// Increments the counter for one event.
    pub fn record(&mut self, event: Event) {
        *self.counters.entry(event).or_insert(0) += 1;
    }

    /// Returns the current count for an event.
    pub fn count(&self, event: Event) -> u64 {
        self.counters.get(&event).copied().unwrap_or(0)
    }

    /// Renders the counter table as one point per category, including
    /// zero-valued fields so the sink sees a stable schema.
    pub fn points(&self) -> Vec<Point> {
        Category::ALL
            .iter()
            .map(|category| Point {
                category: category.name(),
                fields: Event::ALL
                    .iter()
                    .filter(|event| event.category() == *category)
                    .map(|event| (event.field(), self.count(*event)))
                    .collect(),
            })
            .collect()
    }

    fn reset(&mut self) {
        self.counters.clear();
    }

    async fn push(&mut self) {
        let Some(sink) = self.sink.as_ref() else {
            return;
        };

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        match sink.write(&self.points(), timestamp).await {
            Ok(()) => {
                trace!("telemetry batch pushed, resetting counters");
                self.reset();
            }
            Err(e) => {
                let now = Instant::now();
                let warned_recently = self
                    .last_push_warning
                    .is_some_and(|at| now.duration_since(at) < PUSH_WARN_INTERVAL);

                if warned_recently {
                    debug!(error = %e, "telemetry push failed");
                } else {
                    warn!(error = %e, "telemetry push failed, counters retained");
                    self.last_push_warning = Some(now);
                }
            }
        }
    }

    /// Runs the consumer loop until every producer handle is dropped.
    pub async fn run(mut self) {
        if self.sink.is_none() {
            debug!("telemetry forwarding is disabled, discarding events");
            while let Some(event) = self.rx.recv().await {
                trace!(?event, "telemetry event discarded");
            }
            return;
        }

        let mut flush = interval_at(Instant::now() + FLUSH_INTERVAL, FLUSH_INTERVAL);
        flush.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut keepalive =
            interval_at(Instant::now() + KEEPALIVE_INTERVAL, KEEPALIVE_INTERVAL);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                received = self.rx.recv() => match received {
                    Some(event) => {
                        trace!(?event, "telemetry event received");
                        self.record(event);
                    }
                    None => {
                        self.push().await;
                        return;
                    }
                },
                _ = flush.tick() => self.push().await,
                _ = keepalive.tick() => self.record(Event::KeepAlive),
            }
        }
    }
}
