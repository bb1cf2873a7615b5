use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "flatnet")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Aggregates TCP traffic per service pair and ships windowed reports to Kafka", long_about = None)]
pub struct Cli {
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(
        short,
        long,
        default_value = "^(eth|en)",
        help = "Regular expression selecting the interfaces to capture on"
    )]
    pub interface: String,

    #[arg(
        short,
        long = "kafka",
        value_delimiter = ',',
        default_value = "localhost:9092",
        help = "Kafka broker addresses, comma separated"
    )]
    pub kafka: Vec<String>,

    #[arg(long, default_value = crate::publisher::DEFAULT_TOPIC, help = "Kafka topic for window reports")]
    pub topic: String,

    #[arg(long, help = "Consul HTTP address used to resolve service names")]
    pub consul: Option<String>,

    #[arg(long, help = "Docker Engine HTTP endpoint used to resolve container names")]
    pub docker: Option<String>,

    #[arg(long, help = "YAML file with static names by network range")]
    pub names: Option<PathBuf>,

    #[arg(long, default_value_t = 2000, help = "Aggregation window in milliseconds")]
    pub window_ms: u64,

    #[arg(long, help = "Give up on a graceful shutdown after this many seconds")]
    pub drain_timeout: Option<u64>,
}
