//! Service names from the Consul catalog

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
use tracing::debug;

pub const REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// One registered instance of a service as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogInstance {
    /// Address of the node the instance runs on
    pub address: String,
    /// Address the service registered itself with (may be empty)
    #[serde(default)]
    pub service_address: String,
    pub service_port: u16,
    pub service_name: String,
}

/// Read-only view of a service catalog.
#[async_trait]
pub trait ServiceCatalog: Send + Sync + 'static {
    async fn services(&self) -> Result<Vec<String>>;

    async fn instances(&self, service: &str) -> Result<Vec<CatalogInstance>>;
}

/// Consul HTTP API client.
pub struct ConsulClient {
    http: reqwest::Client,
    base: Url,
}

impl ConsulClient {
    pub fn new(address: &str) -> Result<Self> {
        let base = http_base_url(address)?;
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
impl ServiceCatalog for ConsulClient {
    async fn services(&self) -> Result<Vec<String>> {
        let services: HashMap<String, Vec<String>> = self
            .http
            .get(api_url(&self.base, &["v1", "catalog", "services"])?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(services.into_keys().collect())
    }

    async fn instances(&self, service: &str) -> Result<Vec<CatalogInstance>> {
        let instances = self
            .http
            .get(api_url(&self.base, &["v1", "catalog", "service", service])?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(instances)
    }
}

/// Register both the node address and the service address of every
/// instance. Empty service addresses are skipped.
pub fn index_instances(mapping: &mut HashMap<(String, u16), String>, instances: &[CatalogInstance]) {
    for instance in instances {
        let port = instance.service_port;
        mapping.insert((instance.address.clone(), port), instance.service_name.clone());

        if !instance.service_address.is_empty() {
            mapping.insert(
                (instance.service_address.clone(), port),
                instance.service_name.clone(),
            );
        }
    }
}

struct CatalogSource<C> {
    catalog: C,
}

#[async_trait]
impl<C: ServiceCatalog> SnapshotSource for CatalogSource<C> {
    type Key = (String, u16);

    fn name(&self) -> &'static str {
        "consul"
    }

    async fn load(&self) -> Result<HashMap<(String, u16), String>> {
        debug!("Updating consul services now");

        let mut mapping = HashMap::new();
        for service in self.catalog.services().await? {
            let instances = self.catalog.instances(&service).await?;
            index_instances(&mut mapping, &instances);
        }

        Ok(mapping)
    }
}

/// Resolves `host:port` to the Consul service registered there.
pub struct ConsulResolver {
    cache: Arc<SnapshotCache<(String, u16)>>,
}

impl ConsulResolver {
    pub async fn start<C: ServiceCatalog>(catalog: C, cancel: CancellationToken) -> Self {
        Self::with_interval(catalog, REFRESH_INTERVAL, cancel).await
    }

    pub async fn with_interval<C: ServiceCatalog>(
        catalog: C,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let cache = start_refreshing(CatalogSource { catalog }, interval, cancel).await;
        Self { cache }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl NameResolver for ConsulResolver {
    fn get_name(&self, host: &str, port: u16) -> String {
        self.cache
            .get(&(host.to_string(), port))
            .unwrap_or_default()
    }
}
