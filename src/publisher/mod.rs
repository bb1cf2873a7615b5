//! Ships window reports to the broker
//!
//! Delivery is best-effort: a report that cannot be encoded or sent is
//! logged and dropped, never retried.

pub mod kafka;

pub use kafka::{KafkaSink, DEFAULT_TOPIC};

use crate::metrics::PipelineMetrics;
use crate::Result;
use async_trait::async_trait;
use flatnet_common::Report;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Destination for encoded reports.
#[async_trait]
pub trait ReportSink: Send {
    fn name(&self) -> &str;

    async fn send(&mut self, payload: Vec<u8>) -> Result<()>;

    /// Flush anything pending and release the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Totals returned when the publisher finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub published: u64,
    pub failed: u64,
}

pub struct Publisher<S> {
    sink: S,
    metrics: PipelineMetrics,
    summary: PublishSummary,
}

impl<S: ReportSink> Publisher<S> {
    pub fn new(sink: S, metrics: PipelineMetrics) -> Self {
        Self {
            sink,
            metrics,
            summary: PublishSummary::default(),
        }
    }

    /// Publish reports until the channel is closed and drained, then close
    /// the sink.
    pub async fn run(mut self, mut reports: mpsc::Receiver<Report>) -> PublishSummary {
        info!(sink = self.sink.name(), "Publisher started");

        while let Some(report) = reports.recv().await {
            self.publish(&report).await;
        }

        info!(sink = self.sink.name(), "Report channel closed, closing sink");
        if let Err(e) = self.sink.close().await {
            warn!(sink = self.sink.name(), error = %e, "Could not close sink cleanly");
        }

        self.summary
    }

    async fn publish(&mut self, report: &Report) {
        let payload = match serde_json::to_vec(report) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Could not encode report");
                self.record_failure();
                return;
            }
        };

        debug!(value = %String::from_utf8_lossy(&payload), "Send report to broker");

        match self.sink.send(payload).await {
            Ok(()) => {
                self.summary.published += 1;
                self.metrics.reports_published.inc();
            }
            Err(e) => {
                warn!(sink = self.sink.name(), error = %e, "Could not send report");
                self.record_failure();
            }
        }
    }

    fn record_failure(&mut self) {
        self.summary.failed += 1;
        self.metrics.publish_failures.inc();
    }
}
