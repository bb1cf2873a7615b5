pub mod collector;
pub mod exporter;

pub use collector::{Metrics, PipelineMetrics};
pub use exporter::PrometheusExporter;
