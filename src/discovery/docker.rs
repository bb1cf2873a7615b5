//! Container names from the Docker Engine API
//!
//! Identity is per container, not per socket: lookups use the host address
//! only and ignore the port.

use crate::discovery::snapshot::{start_refreshing, SnapshotCache, SnapshotSource};
use crate::discovery::{api_url, http_base_url, NameResolver};
use crate::Result;
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub const REFRESH_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContainerSummary {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Names", default)]
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContainerDetails {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "NetworkSettings", default)]
    pub network_settings: Option<NetworkSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NetworkSettings {
    #[serde(rename = "Networks", default)]
    pub networks: HashMap<String, AttachedNetwork>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AttachedNetwork {
    #[serde(rename = "IPAddress", default)]
    pub ip_address: String,
}

impl ContainerDetails {
    /// Container name without Docker's leading slash.
    pub fn display_name(&self) -> &str {
        self.name.trim_matches('/')
    }

    pub fn ip_addresses(&self) -> impl Iterator<Item = &str> {
        self.network_settings
            .iter()
            .flat_map(|settings| settings.networks.values())
            .map(|network| network.ip_address.as_str())
            .filter(|ip| !ip.is_empty())
    }
}

/// Read-only view of a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>>;

    async fn inspect(&self, id: &str) -> Result<ContainerDetails>;
}

/// Docker Engine API client over HTTP.
pub struct DockerClient {
    http: reqwest::Client,
    base: Url,
}

impl DockerClient {
    pub fn new(endpoint: &str) -> Result<Self> {
        let base = http_base_url(endpoint)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            http,
            base,
        })
    }
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let containers = self
            .http
            .get(api_url(&self.base, &["containers", "json"])?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(containers)
    }

    async fn inspect(&self, id: &str) -> Result<ContainerDetails> {
        let details = self
            .http
            .get(api_url(&self.base, &["containers", id, "json"])?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(details)
    }
}

struct RuntimeSource<R> {
    runtime: R,
}

#[async_trait]
impl<R: ContainerRuntime> SnapshotSource for RuntimeSource<R> {
    type Key = String;

    fn name(&self) -> &'static str {
        "docker"
    }

    async fn load(&self) -> Result<HashMap<String, String>> {
        let containers = self.runtime.list_containers().await?;

        let mut mapping = HashMap::with_capacity(containers.len());
        for container in containers {
            if container.names.is_empty() {
                continue;
            }

            let details = match self.runtime.inspect(&container.id).await {
                Ok(details) => details,
                Err(e) => {
                    warn!(id = %container.id, error = %e, "Could not inspect container");
                    continue;
                }
            };

            let name = details.display_name();
            for ip in details.ip_addresses() {
                mapping.insert(ip.to_string(), name.to_string());
            }
        }

        Ok(mapping)
    }
}

/// Resolves a host address to the container attached with that address.
pub struct DockerResolver {
    cache: Arc<SnapshotCache<String>>,
}

impl DockerResolver {
    pub async fn start<R: ContainerRuntime>(runtime: R, cancel: CancellationToken) -> Self {
        Self::with_interval(runtime, REFRESH_INTERVAL, cancel).await
    }

    pub async fn with_interval<R: ContainerRuntime>(
        runtime: R,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let cache = start_refreshing(RuntimeSource { runtime }, interval, cancel).await;
        Self { cache }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl NameResolver for DockerResolver {
    fn get_name(&self, host: &str, _port: u16) -> String {
        self.cache.get(host).unwrap_or_default()
    }
}
