//! Flow aggregator for grouping packet events into per-window reports
//!
//! Events are grouped by the directed endpoint pair (source, destination).
//! Names are resolved once when a pair first shows up in a window. On every
//! tick the current window is swapped for an empty one and shipped as a
//! `Report`.

use crate::channel::{LossySender, Offer};
use crate::discovery::NameResolver;
use flatnet_common::{now_millis, Endpoint, FlowAggregate, FlowEvent, FlowKey, Report, ServiceIdentity};
use prometheus::IntCounter;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(2);

/// Shortest accepted window; the tick interval cannot be zero.
pub const MIN_WINDOW: Duration = Duration::from_millis(1);

/// Owns the open window. Only the aggregation task touches it, so the hot
/// path needs no locking.
pub struct FlowAggregator {
    resolver: Arc<dyn NameResolver>,
    window: Duration,
    flows: HashMap<FlowKey, FlowAggregate>,
    events_processed: u64,
}

impl FlowAggregator {
    /// Windows shorter than [`MIN_WINDOW`] are raised to it.
    pub fn new(resolver: Arc<dyn NameResolver>, window: Duration) -> Self {
        if window < MIN_WINDOW {
            warn!(requested = ?window, "Window too short, using {:?}", MIN_WINDOW);
        }

        Self {
            resolver,
            window: window.max(MIN_WINDOW),
            flows: HashMap::new(),
            events_processed: 0,
        }
    }

    /// Add one event to the open window.
    pub fn process_event(&mut self, event: &FlowEvent) {
        self.events_processed += 1;

        match self.flows.entry(event.key()) {
            Entry::Occupied(mut entry) => entry.get_mut().record(event.length),
            Entry::Vacant(entry) => {
                let source = identify(self.resolver.as_ref(), event.source);
                let destination = identify(self.resolver.as_ref(), event.destination);
                entry.insert(FlowAggregate::new(source, destination, event));
            }
        }
    }

    /// Swap out the open window and snapshot it, largest flows first.
    pub fn close_window(&mut self, timestamp: i64) -> Report {
        let mut flows: Vec<FlowAggregate> = std::mem::take(&mut self.flows).into_values().collect();
        flows.sort_by(|a, b| b.bytes.cmp(&a.bytes));

        Report {
            timestamp,
            flows,
            duration_ms: self.window.as_millis() as u64,
        }
    }

    /// Number of flows in the open window
    pub fn active_flow_count(&self) -> usize {
        self.flows.len()
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Consume events and emit one report per window until `stop` fires or
    /// the event channel is closed. The open window is discarded on exit and
    /// the report channel is closed by dropping `reports`.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<FlowEvent>,
        reports: LossySender<Report>,
        emitted: IntCounter,
        stop: CancellationToken,
    ) {
        let mut ticker = interval_at(Instant::now() + self.window, self.window);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(window = ?self.window, "Aggregator started");

        loop {
            tokio::select! {
                biased;

                _ = stop.cancelled() => {
                    info!("Aggregator stop requested");
                    break;
                }

                _ = ticker.tick() => {
                    let report = self.close_window(now_millis() as i64);
                    let flows = report.flows.len();

                    match reports.offer(report) {
                        Offer::Sent => {
                            emitted.inc();
                            debug!(flows, "Window report emitted");
                        }
                        Offer::Dropped => debug!(flows, "Publisher is behind, dropped window report"),
                        Offer::Closed => warn!(flows, "Report channel closed, dropped window report"),
                    }
                }

                event = events.recv() => match event {
                    Some(event) => self.process_event(&event),
                    None => {
                        info!("Event channel closed, aggregator shutting down");
                        break;
                    }
                },
            }
        }

        debug!(
            discarded_flows = self.flows.len(),
            events_processed = self.events_processed,
            "Discarding open window"
        );
    }
}

fn identify(resolver: &dyn NameResolver, endpoint: Endpoint) -> ServiceIdentity {
    let name = resolver.get_name(&endpoint.host.to_string(), endpoint.port);
    ServiceIdentity::new(name, endpoint)
}
