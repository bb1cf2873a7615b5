use crate::Result;
use prometheus::{IntCounter, Registry};

/// Point-in-time copy of the pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    pub events_captured: u64,
    pub events_dropped: u64,
    pub reports_emitted: u64,
    pub reports_dropped: u64,
    pub reports_published: u64,
    pub publish_failures: u64,
}

/// Counters shared by every pipeline stage. Cloning is cheap; all clones
/// update the same underlying counters.
#[derive(Clone)]
pub struct PipelineMetrics {
    registry: Registry,
    pub events_captured: IntCounter,
    pub events_dropped: IntCounter,
    pub reports_emitted: IntCounter,
    pub reports_dropped: IntCounter,
    pub reports_published: IntCounter,
    pub publish_failures: IntCounter,
}

impl PipelineMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let events_captured = register(
            &registry,
            "flatnet_events_captured_total",
            "TCP segments with payload handed to the aggregator",
        )?;
        let events_dropped = register(
            &registry,
            "flatnet_events_dropped_total",
            "Flow events dropped because the aggregator queue was full",
        )?;
        let reports_emitted = register(
            &registry,
            "flatnet_reports_emitted_total",
            "Window reports handed to the publisher",
        )?;
        let reports_dropped = register(
            &registry,
            "flatnet_reports_dropped_total",
            "Window reports dropped because the publisher queue was full",
        )?;
        let reports_published = register(
            &registry,
            "flatnet_reports_published_total",
            "Window reports accepted by the broker",
        )?;
        let publish_failures = register(
            &registry,
            "flatnet_publish_failures_total",
            "Window reports that could not be encoded or sent",
        )?;

        Ok(Self {
            registry,
            events_captured,
            events_dropped,
            reports_emitted,
            reports_dropped,
            reports_published,
            publish_failures,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn snapshot(&self) -> Metrics {
        Metrics {
            events_captured: self.events_captured.get(),
            events_dropped: self.events_dropped.get(),
            reports_emitted: self.reports_emitted.get(),
            reports_dropped: self.reports_dropped.get(),
            reports_published: self.reports_published.get(),
            publish_failures: self.publish_failures.get(),
        }
    }
}

fn register(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let metrics = PipelineMetrics::new().unwrap();
        let clone = metrics.clone();

        clone.events_dropped.inc();
        clone.events_dropped.inc();
        metrics.reports_published.inc();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.events_dropped, 2);
        assert_eq!(snapshot.reports_published, 1);
        assert_eq!(snapshot.reports_dropped, 0);
    }

    #[test]
    fn test_independent_registries() {
        let a = PipelineMetrics::new().unwrap();
        let b = PipelineMetrics::new().unwrap();

        a.events_captured.inc();

        assert_eq!(b.snapshot().events_captured, 0);
    }
}
