//! Endpoint -> service name resolution
//!
//! Every backend implements [`NameResolver`]. Lookups run on the aggregation
//! path and never do network I/O; backends that talk to a remote API keep a
//! snapshot that is refreshed in the background (see [`snapshot`]).

pub mod constant;
pub mod consul;
pub mod docker;
pub mod range;
pub mod snapshot;

pub use constant::ConstantResolver;
pub use consul::{ConsulClient, ConsulResolver};
pub use docker::{DockerClient, DockerResolver};
pub use range::{NetRange, RangeResolver};

use crate::{FlatnetError, Result};
use reqwest::Url;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub trait NameResolver: Send + Sync {
    /// Service name for `host:port`, or an empty string if unknown.
    fn get_name(&self, host: &str, port: u16) -> String;
}

impl<T: NameResolver + ?Sized> NameResolver for Arc<T> {
    fn get_name(&self, host: &str, port: u16) -> String {
        (**self).get_name(host, port)
    }
}

/// Which discovery backends to use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Consul HTTP address
    pub consul: Option<String>,
    /// Docker Engine HTTP endpoint
    pub docker: Option<String>,
    /// Static names by range spec, checked before any backend
    pub name_overrides: Vec<(String, String)>,
}

/// Compose the configured backends into one resolver.
///
/// Precedence: static overrides, then Docker, then Consul. Background
/// refreshes stop when `cancel` fires. A malformed override fails before any
/// backend is started.
pub async fn build_resolver(
    config: &DiscoveryConfig,
    cancel: &CancellationToken,
) -> Result<Arc<dyn NameResolver>> {
    let mut routes: Vec<(String, Arc<dyn NameResolver>)> = Vec::new();

    for (range, name) in &config.name_overrides {
        range.parse::<NetRange>()?;
        routes.push((range.clone(), Arc::new(ConstantResolver::new(name.as_str()))));
    }

    if let Some(endpoint) = &config.docker {
        info!(endpoint = %endpoint, "Resolving container names from docker");
        let docker = DockerResolver::start(DockerClient::new(endpoint)?, cancel.child_token()).await;
        info!(containers = docker.len(), "Docker name cache loaded");
        routes.extend(catch_all(Arc::new(docker)));
    }

    if let Some(address) = &config.consul {
        info!(address = %address, "Resolving service names from consul");
        let consul = ConsulResolver::start(ConsulClient::new(address)?, cancel.child_token()).await;
        info!(addresses = consul.len(), "Consul name cache loaded");
        routes.extend(catch_all(Arc::new(consul)));
    }

    if routes.is_empty() {
        info!("No name discovery configured, flows will be reported without names");
        return Ok(Arc::new(ConstantResolver::noop()));
    }

    Ok(Arc::new(RangeResolver::new(routes)?))
}

fn catch_all(resolver: Arc<dyn NameResolver>) -> Vec<(String, Arc<dyn NameResolver>)> {
    ["0.0.0.0/0", "[::/0]"]
        .iter()
        .map(|range| (range.to_string(), resolver.clone()))
        .collect()
}

/// Accepts `host:port` or an `http://` URL. The HTTP client is built
/// without TLS, so any other scheme is a configuration error.
pub(crate) fn http_base_url(address: &str) -> Result<Url> {
    let address = address.trim();
    let candidate = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };

    let url = Url::parse(&candidate).map_err(|e| {
        FlatnetError::ConfigError(format!("invalid address '{}': {}", address, e))
    })?;

    if url.scheme() != "http" {
        return Err(FlatnetError::ConfigError(format!(
            "unsupported scheme '{}' in '{}', only http is supported",
            url.scheme(),
            address
        )));
    }

    Ok(url)
}

/// Append percent-encoded path segments to `base`.
pub(crate) fn api_url(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| FlatnetError::ConfigError(format!("'{}' cannot be used as a base URL", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_base_url() {
        assert_eq!(
            http_base_url("localhost:8500").unwrap().as_str(),
            "http://localhost:8500/"
        );
        assert_eq!(
            http_base_url("http://consul:8500/").unwrap().as_str(),
            "http://consul:8500/"
        );
    }

    #[test]
    fn test_non_http_scheme_is_rejected() {
        for address in ["https://docker.local", "unix:///var/run/docker.sock"] {
            assert!(matches!(
                http_base_url(address),
                Err(FlatnetError::ConfigError(_))
            ));
        }
        assert!(matches!(
            ConsulClient::new("https://consul:8501"),
            Err(FlatnetError::ConfigError(_))
        ));
        assert!(matches!(
            DockerClient::new("https://docker.local"),
            Err(FlatnetError::ConfigError(_))
        ));
    }

    #[test]
    fn test_api_url_encodes_segments() {
        let base = http_base_url("http://consul:8500/").unwrap();
        let url = api_url(&base, &["v1", "catalog", "service", "web api/v2"]).unwrap();
        assert_eq!(url.as_str(), "http://consul:8500/v1/catalog/service/web%20api%2Fv2");

        let prefixed = http_base_url("http://proxy/consul").unwrap();
        let url = api_url(&prefixed, &["v1", "catalog", "services"]).unwrap();
        assert_eq!(url.as_str(), "http://proxy/consul/v1/catalog/services");
    }

    #[tokio::test]
    async fn test_no_backends_resolves_nothing() {
        let cancel = CancellationToken::new();
        let resolver = build_resolver(&DiscoveryConfig::default(), &cancel)
            .await
            .unwrap();

        assert_eq!(resolver.get_name("10.0.0.1", 80), "");
    }

    #[tokio::test]
    async fn test_overrides_only() {
        let config = DiscoveryConfig {
            name_overrides: vec![
                ("10.0.0.0/8:5432".to_string(), "postgres".to_string()),
                ("192.168.0.0/16".to_string(), "office".to_string()),
            ],
            ..Default::default()
        };
        let cancel = CancellationToken::new();

        let resolver = build_resolver(&config, &cancel).await.unwrap();

        assert_eq!(resolver.get_name("10.1.1.1", 5432), "postgres");
        assert_eq!(resolver.get_name("10.1.1.1", 80), "");
        assert_eq!(resolver.get_name("192.168.4.2", 22), "office");
    }

    #[tokio::test]
    async fn test_malformed_override_fails() {
        let config = DiscoveryConfig {
            name_overrides: vec![("10.0.0.0/8:http".to_string(), "web".to_string())],
            ..Default::default()
        };
        let cancel = CancellationToken::new();

        let result = build_resolver(&config, &cancel).await;

        assert!(matches!(result, Err(FlatnetError::InvalidRange { .. })));
    }
}
