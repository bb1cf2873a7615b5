//! Wires capture -> aggregator -> publisher together and tears them down in
//! order.
//!
//! Shutdown order:
//! 1. close every capture and wait for all capture loops to exit
//! 2. drop the last event sender, closing the event channel
//! 3. the aggregator drains buffered events, discards its open window and
//!    closes the report channel
//! 4. the publisher drains buffered reports and closes the sink

use crate::aggregator::FlowAggregator;
use crate::capture::{self, Capture};
use crate::channel::{lossy_channel, LossySender};
use crate::config::AgentConfig;
use crate::discovery::NameResolver;
use crate::metrics::PipelineMetrics;
use crate::publisher::{PublishSummary, Publisher, ReportSink};
use crate::{FlatnetError, Result};
use flatnet_common::FlowEvent;
use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Log every this many dropped events at the capture boundary.
const EVENT_DROP_LOG_INTERVAL: u64 = 1000;

pub struct Pipeline {
    captures: Vec<Box<dyn Capture>>,
    events: Option<LossySender<FlowEvent>>,
    aggregator: JoinHandle<()>,
    publisher: JoinHandle<PublishSummary>,
    stop: CancellationToken,
    metrics: PipelineMetrics,
}

impl Pipeline {
    /// Spawn the aggregator and publisher tasks. Captures are attached
    /// afterwards. `stop` is cancelled once shutdown completes; discovery
    /// refreshes should hang off it.
    pub fn spawn<S: ReportSink + 'static>(
        config: &AgentConfig,
        resolver: Arc<dyn NameResolver>,
        sink: S,
        metrics: PipelineMetrics,
        stop: CancellationToken,
    ) -> Self {
        let (events, event_rx) = lossy_channel(
            config.event_capacity,
            metrics.events_dropped.clone(),
            "capture->aggregator",
        );
        let events = events.warn_every(EVENT_DROP_LOG_INTERVAL);

        let (reports, report_rx) = lossy_channel(
            config.report_capacity,
            metrics.reports_dropped.clone(),
            "aggregator->publisher",
        );

        let aggregator = tokio::spawn(FlowAggregator::new(resolver, config.window).run(
            event_rx,
            reports,
            metrics.reports_emitted.clone(),
            stop.child_token(),
        ));

        let publisher = tokio::spawn(Publisher::new(sink, metrics.clone()).run(report_rx));

        Self {
            captures: Vec::new(),
            events: Some(events),
            aggregator,
            publisher,
            stop,
            metrics,
        }
    }

    /// Sender for capture sources. `None` once shutdown has begun.
    pub fn event_sink(&self) -> Option<&LossySender<FlowEvent>> {
        self.events.as_ref()
    }

    pub fn attach(&mut self, capture: Box<dyn Capture>) {
        info!(device = capture.device(), "Capture attached");
        self.captures.push(capture);
    }

    /// Open a pcap capture on every device; returns how many were opened.
    pub fn start_captures(&mut self, devices: &[String]) -> usize {
        let Some(events) = self.events.as_ref() else {
            return 0;
        };

        let started = capture::start_all(devices, events, &self.metrics.events_captured);
        let count = started.len();
        self.captures.extend(started);
        count
    }

    pub fn capture_count(&self) -> usize {
        self.captures.len()
    }

    /// Graceful, ordered shutdown. Returns once the sink is closed.
    pub async fn shutdown(mut self) -> Result<PublishSummary> {
        info!(captures = self.captures.len(), "Closing captures");
        let closing = self.captures.drain(..).map(|capture| async move {
            let device = capture.device().to_string();
            match tokio::task::spawn_blocking(move || capture.close()).await {
                Ok(Ok(())) => debug!(device = %device, "Capture closed"),
                Ok(Err(e)) => warn!(device = %device, error = %e, "Capture did not close cleanly"),
                Err(e) => warn!(device = %device, error = %e, "Capture close task failed"),
            }
        });
        join_all(closing).await;

        self.events.take();

        if let Err(e) = self.aggregator.await {
            warn!(error = %e, "Aggregator task failed");
        }

        let summary = self
            .publisher
            .await
            .map_err(|e| FlatnetError::BrokerError(format!("publisher task failed: {}", e)))?;

        self.stop.cancel();

        info!(
            published = summary.published,
            failed = summary.failed,
            "Pipeline drained"
        );
        Ok(summary)
    }
}
