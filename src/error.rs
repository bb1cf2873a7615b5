use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlatnetError {
    #[error("Capture error: {0}")]
    CaptureError(String),

    #[error("No capture device matches '{pattern}'. Available devices: {available:?}")]
    NoMatchingDevice {
        pattern: String,
        available: Vec<String>,
    },

    #[error("Invalid range '{spec}': {reason}. Must be like: 1.2.3.4/16:80:90")]
    InvalidRange { spec: String, reason: String },

    #[error("Discovery error: {0}")]
    DiscoveryError(String),

    #[error("Broker error: {0}")]
    BrokerError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("pcap error: {0}")]
    PcapError(#[from] pcap::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Kafka error: {0}")]
    KafkaError(#[from] rdkafka::error::KafkaError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),

    #[error("Invalid pattern: {0}")]
    PatternError(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, FlatnetError>;
