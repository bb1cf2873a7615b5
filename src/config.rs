//! Runtime configuration assembled from the command line and the optional
//! names file.
//!
//! Names file format:
//!
//! ```yaml
//! names:
//!   - range: "10.0.0.0/8:5432"
//!     name: postgres
//!   - range: "[fd00::/8]"
//!     name: internal
//! ```
//!
//! Entries are checked in file order before any discovery backend.

use crate::cli::Cli;
use crate::discovery::DiscoveryConfig;
use crate::publisher::DEFAULT_TOPIC;
use crate::{FlatnetError, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const EVENT_CHANNEL_CAPACITY: usize = 2048;
pub const REPORT_CHANNEL_CAPACITY: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub interface_pattern: String,
    pub brokers: Vec<String>,
    pub topic: String,
    pub discovery: DiscoveryConfig,
    pub window: Duration,
    pub drain_timeout: Option<Duration>,
    pub event_capacity: usize,
    pub report_capacity: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            interface_pattern: "^(eth|en)".to_string(),
            brokers: vec!["localhost:9092".to_string()],
            topic: DEFAULT_TOPIC.to_string(),
            discovery: DiscoveryConfig::default(),
            window: crate::aggregator::DEFAULT_WINDOW,
            drain_timeout: None,
            event_capacity: EVENT_CHANNEL_CAPACITY,
            report_capacity: REPORT_CHANNEL_CAPACITY,
        }
    }
}

impl AgentConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        if cli.window_ms == 0 {
            return Err(FlatnetError::ConfigError(
                "window must be at least 1 ms".to_string(),
            ));
        }

        let brokers: Vec<String> = cli
            .kafka
            .iter()
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .collect();

        let name_overrides = match &cli.names {
            Some(path) => load_name_overrides(path)?,
            None => Vec::new(),
        };

        Ok(Self {
            interface_pattern: cli.interface.clone(),
            brokers,
            topic: cli.topic.clone(),
            discovery: DiscoveryConfig {
                consul: cli.consul.clone(),
                docker: cli.docker.clone(),
                name_overrides,
            },
            window: Duration::from_millis(cli.window_ms),
            drain_timeout: cli.drain_timeout.map(Duration::from_secs),
            ..Default::default()
        })
    }

    pub fn interface_regex(&self) -> Result<Regex> {
        Ok(Regex::new(&self.interface_pattern)?)
    }
}

#[derive(Debug, Deserialize)]
struct NamesFile {
    #[serde(default)]
    names: Vec<NameOverride>,
}

#[derive(Debug, Deserialize)]
struct NameOverride {
    range: String,
    name: String,
}

/// Read `(range spec, name)` pairs from a YAML names file.
pub fn load_name_overrides(path: &Path) -> Result<Vec<(String, String)>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        FlatnetError::ConfigError(format!("cannot read names file {}: {}", path.display(), e))
    })?;

    parse_name_overrides(&content)
}

fn parse_name_overrides(content: &str) -> Result<Vec<(String, String)>> {
    let file: NamesFile = serde_yaml::from_str(content)?;
    Ok(file
        .names
        .into_iter()
        .map(|entry| (entry.range, entry.name))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_from_cli_defaults() {
        let cli = Cli::parse_from(["flatnet"]);
        let config = AgentConfig::from_cli(&cli).unwrap();

        assert_eq!(config, AgentConfig::default());
    }

    #[test]
    fn test_zero_window_is_rejected() {
        let cli = Cli::parse_from(["flatnet", "--window-ms", "0"]);
        assert!(matches!(
            AgentConfig::from_cli(&cli),
            Err(FlatnetError::ConfigError(_))
        ));
    }

    #[test]
    fn test_interface_regex() {
        let config = AgentConfig {
            interface_pattern: "(".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.interface_regex(),
            Err(FlatnetError::PatternError(_))
        ));
    }

    #[test]
    fn test_parse_names_keeps_order() {
        let overrides = parse_name_overrides(
            r#"
names:
  - range: "10.0.0.0/8:5432"
    name: postgres
  - range: "[fd00::/8]"
    name: internal
"#,
        )
        .unwrap();

        assert_eq!(
            overrides,
            vec![
                ("10.0.0.0/8:5432".to_string(), "postgres".to_string()),
                ("[fd00::/8]".to_string(), "internal".to_string()),
            ]
        );
        assert!(parse_name_overrides("{}").unwrap().is_empty());
        assert!(parse_name_overrides("names: 12").is_err());
    }

    #[test]
    fn test_names_file_from_cli() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "names:\n  - range: \"192.168.0.0/16\"\n    name: office").unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let cli = Cli::parse_from(["flatnet", "--names", path.as_str(), "--drain-timeout", "5"]);
        let config = AgentConfig::from_cli(&cli).unwrap();

        assert_eq!(
            config.discovery.name_overrides,
            vec![("192.168.0.0/16".to_string(), "office".to_string())]
        );
        assert_eq!(config.drain_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_missing_names_file() {
        let result = load_name_overrides(Path::new("/nonexistent/flatnet-names.yaml"));
        assert!(matches!(result, Err(FlatnetError::ConfigError(_))));
    }
}
