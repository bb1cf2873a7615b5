use crate::metrics::collector::{Metrics, PipelineMetrics};
use crate::Result;
use prometheus::{Encoder, TextEncoder};

/// Renders the pipeline counters in the Prometheus text exposition format.
pub struct PrometheusExporter {
    metrics: PipelineMetrics,
}

impl PrometheusExporter {
    pub fn new(metrics: PipelineMetrics) -> Self {
        Self { metrics }
    }

    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.metrics.registry().gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// One-line summary used in the shutdown log.
    pub fn summary(&self) -> String {
        format_summary(&self.metrics.snapshot())
    }
}

pub fn format_summary(metrics: &Metrics) -> String {
    format!(
        "events captured={} dropped={}, reports emitted={} dropped={} published={} failed={}",
        metrics.events_captured,
        metrics.events_dropped,
        metrics.reports_emitted,
        metrics.reports_dropped,
        metrics.reports_published,
        metrics.publish_failures,
    )
}
