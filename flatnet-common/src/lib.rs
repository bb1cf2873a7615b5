//! Shared types between the capture, aggregation and publishing stages
//!
//! This crate defines the values that cross channel boundaries:
//! - `FlowEvent`, produced once per TCP segment carrying payload
//! - `FlowAggregate` and `Report`, the windowed snapshot shipped to the broker
//!
//! The serde layout of `Report` is the wire format consumed downstream and
//! must stay stable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Timestamp
}

/// One side of a network flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: IpAddr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<IpAddr>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.host {
            IpAddr::V4(ip) => write!(f, "{}:{}", ip, self.port),
            IpAddr::V6(ip) => write!(f, "[{}]:{}", ip, self.port),
        }
    }
}

/// Grouping key of the aggregator. Direction matters: A->B and B->A are
/// distinct flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub source: Endpoint,
    pub destination: Endpoint,
}

/// A single observed TCP segment with a non-empty payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowEvent {
    pub source: Endpoint,
    pub destination: Endpoint,
    pub timestamp: Timestamp,
    /// TCP payload length in bytes
    pub length: u32,
}

impl FlowEvent {
    pub fn key(&self) -> FlowKey {
        FlowKey {
            source: self.source,
            destination: self.destination,
        }
    }
}

/// An endpoint enriched with the service name a resolver found for it.
/// An empty name means "unknown".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIdentity {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "IP")]
    pub host: IpAddr,
    #[serde(rename = "Port")]
    pub port: u16,
}

impl ServiceIdentity {
    pub fn new(name: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            name: name.into(),
            host: endpoint.host,
            port: endpoint.port,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host, self.port)
    }
}

/// Byte and packet totals of one flow within the current window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowAggregate {
    #[serde(rename = "Source")]
    pub source: ServiceIdentity,
    #[serde(rename = "Destination")]
    pub destination: ServiceIdentity,
    #[serde(rename = "Len")]
    pub bytes: u32,
    #[serde(rename = "Count")]
    pub packets: u64,
    /// Timestamp of the first packet of this flow in the window
    #[serde(rename = "Timestamp")]
    pub first_seen: Timestamp,
}

impl FlowAggregate {
    /// Seed an aggregate from the first event of a flow.
    pub fn new(source: ServiceIdentity, destination: ServiceIdentity, event: &FlowEvent) -> Self {
        Self {
            source,
            destination,
            bytes: event.length,
            packets: 1,
            first_seen: event.timestamp,
        }
    }

    pub fn record(&mut self, length: u32) {
        self.bytes = self.bytes.saturating_add(length);
        self.packets += 1;
    }
}

/// Snapshot of one closed aggregation window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    #[serde(rename = "Timestamp")]
    pub timestamp: i64,
    #[serde(rename = "ServicePackages")]
    pub flows: Vec<FlowAggregate>,
    #[serde(rename = "DurationInMillis")]
    pub duration_ms: u64,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.flows.iter().map(|f| f.bytes as u64).sum()
    }
}
