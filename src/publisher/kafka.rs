use crate::publisher::ReportSink;
use crate::{FlatnetError, Result};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_TOPIC: &str = "flatnet_log";

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
const QUEUE_TIMEOUT: Duration = Duration::from_millis(100);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Producer settings favouring latency over durability: leader-only acks,
/// snappy compression, batches flushed at least every 500 ms.
pub fn producer_config(brokers: &[String]) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", brokers.join(","))
        .set("acks", "1")
        .set("compression.type", "snappy")
        .set("linger.ms", "500")
        .set("message.timeout.ms", "5000");
    config
}

/// Sends each report as one unkeyed message to a fixed topic.
pub struct KafkaSink {
    producer: Option<FutureProducer>,
    topic: String,
}

impl KafkaSink {
    /// Create the producer and make sure at least one broker answers.
    pub async fn connect(brokers: &[String], topic: &str) -> Result<Self> {
        if brokers.is_empty() {
            return Err(FlatnetError::ConfigError("no kafka brokers configured".to_string()));
        }

        let producer: FutureProducer = producer_config(brokers).create()?;

        let probe = producer.clone();
        tokio::task::spawn_blocking(move || {
            probe
                .client()
                .fetch_metadata(None, METADATA_TIMEOUT)
                .map(|_| ())
        })
        .await
        .map_err(|e| FlatnetError::BrokerError(format!("metadata probe failed: {}", e)))??;

        info!(brokers = ?brokers, topic, "Connected to kafka");

        Ok(Self {
            producer: Some(producer),
            topic: topic.to_string(),
        })
    }
}

#[async_trait]
impl ReportSink for KafkaSink {
    fn name(&self) -> &str {
        "kafka"
    }

    async fn send(&mut self, payload: Vec<u8>) -> Result<()> {
        let producer = self
            .producer
            .as_ref()
            .ok_or_else(|| FlatnetError::BrokerError("producer already closed".to_string()))?;

        let record = FutureRecord::<(), [u8]>::to(&self.topic).payload(&payload);

        match producer.send(record, Timeout::After(QUEUE_TIMEOUT)).await {
            Ok((partition, offset)) => {
                debug!(partition, offset, "Wrote message to broker");
                Ok(())
            }
            Err((e, _)) => Err(e.into()),
        }
    }

    async fn close(&mut self) -> Result<()> {
        let Some(producer) = self.producer.take() else {
            return Ok(());
        };

        tokio::task::spawn_blocking(move || producer.flush(FLUSH_TIMEOUT))
            .await
            .map_err(|e| FlatnetError::BrokerError(format!("flush failed: {}", e)))??;

        info!("Kafka producer closed");
        Ok(())
    }
}
