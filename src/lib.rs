//! flatnet - host agent for per-service TCP traffic visibility
//!
//! Pipeline:
//! - `capture`: decode live frames into `FlowEvent`s
//! - `aggregator`: group events per endpoint pair over a fixed window
//! - `discovery`: resolve endpoints to service names (Consul, Docker, ranges)
//! - `publisher`: ship each window `Report` to Kafka
//! - `pipeline`: wire the stages together and shut them down in order
//! - `shutdown`: stop signals and the bounded two-phase drain

pub mod aggregator;
pub mod capture;
pub mod channel;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod publisher;
pub mod shutdown;

pub use error::{FlatnetError, Result};
pub use flatnet_common as common;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
