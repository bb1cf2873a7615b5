//! Dispatch lookups to other resolvers by network prefix and port range
//!
//! Range syntax: `<network-prefix>[:<minPort>[:<maxPort>]]`, for example
//! `10.0.0.0/8`, `10.0.0.0/8:5432` or `10.0.0.0/8:8000:8999`. IPv6 prefixes
//! are written in brackets: `[fd00::/8]:80:90`.

use crate::discovery::NameResolver;
use crate::{FlatnetError, Result};
use ipnetwork::IpNetwork;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetRange {
    pub network: IpNetwork,
    pub min_port: u16,
    pub max_port: u16,
}

impl NetRange {
    /// Bounds given in reverse order are swapped.
    pub fn new(network: IpNetwork, min_port: u16, max_port: u16) -> Self {
        let (min_port, max_port) = if min_port > max_port {
            (max_port, min_port)
        } else {
            (min_port, max_port)
        };

        Self {
            network,
            min_port,
            max_port,
        }
    }

    pub fn contains(&self, ip: IpAddr, port: u16) -> bool {
        self.min_port <= port && port <= self.max_port && self.network.contains(ip)
    }
}

impl FromStr for NetRange {
    type Err = FlatnetError;

    fn from_str(spec: &str) -> Result<Self> {
        let invalid = |reason: String| FlatnetError::InvalidRange {
            spec: spec.to_string(),
            reason,
        };

        let (prefix, ports) = match spec.strip_prefix('[') {
            Some(rest) => {
                let (prefix, tail) = rest
                    .split_once(']')
                    .ok_or_else(|| invalid("missing ']'".to_string()))?;
                let ports = match tail {
                    "" => None,
                    tail => Some(
                        tail.strip_prefix(':')
                            .ok_or_else(|| invalid("expected ':' after ']'".to_string()))?,
                    ),
                };
                (prefix, ports)
            }
            None => match spec.split_once(':') {
                Some((prefix, ports)) => (prefix, Some(ports)),
                None => (spec, None),
            },
        };

        let network: IpNetwork = prefix
            .trim()
            .parse()
            .map_err(|e| invalid(format!("bad network prefix: {}", e)))?;

        let parse_port = |value: &str, default: u16| -> Result<u16> {
            let value = value.trim();
            if value.is_empty() {
                return Ok(default);
            }
            value
                .parse()
                .map_err(|e| invalid(format!("bad port '{}': {}", value, e)))
        };

        let (min_port, max_port) = match ports {
            None => (0, u16::MAX),
            Some(ports) => {
                let parts: Vec<&str> = ports.split(':').collect();
                match parts.as_slice() {
                    [single] if single.trim().is_empty() => (0, u16::MAX),
                    [single] => {
                        let port = parse_port(single, 0)?;
                        (port, port)
                    }
                    [min, max] => (parse_port(min, 0)?, parse_port(max, u16::MAX)?),
                    _ => return Err(invalid("too many ':' separated parts".to_string())),
                }
            }
        };

        Ok(NetRange::new(network, min_port, max_port))
    }
}

/// Routes each lookup to the resolvers whose range contains the endpoint.
/// Ranges are tried in configuration order; the first non-empty answer wins.
pub struct RangeResolver {
    routes: Vec<(NetRange, Arc<dyn NameResolver>)>,
}

impl RangeResolver {
    /// Fails if any range spec is malformed; nothing is built in that case.
    pub fn new<I, S>(config: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Arc<dyn NameResolver>)>,
        S: AsRef<str>,
    {
        let routes = config
            .into_iter()
            .map(|(spec, resolver)| -> Result<(NetRange, Arc<dyn NameResolver>)> {
                Ok((spec.as_ref().parse()?, resolver))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { routes })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl NameResolver for RangeResolver {
    fn get_name(&self, host: &str, port: u16) -> String {
        let Ok(ip) = host.parse::<IpAddr>() else {
            return String::new();
        };

        self.routes
            .iter()
            .filter(|(range, _)| range.contains(ip, port))
            .map(|(_, resolver)| resolver.get_name(host, port))
            .find(|name| !name.is_empty())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::ConstantResolver;

    fn constant(name: &str) -> Arc<dyn NameResolver> {
        Arc::new(ConstantResolver::new(name))
    }

    #[test]
    fn test_parse_full_range() {
        let range: NetRange = "1.2.3.4/16:80:90".parse().unwrap();
        assert_eq!(range.min_port, 80);
        assert_eq!(range.max_port, 90);
        assert_eq!(range.network.prefix(), 16);
    }

    #[test]
    fn test_parse_swaps_reversed_ports() {
        let range: NetRange = "1.2.3.4/16:90:80".parse().unwrap();
        assert_eq!((range.min_port, range.max_port), (80, 90));
    }

    #[test]
    fn test_parse_defaults_to_all_ports() {
        let range: NetRange = "1.2.3.4/16".parse().unwrap();
        assert_eq!((range.min_port, range.max_port), (0, 65535));

        let range: NetRange = "1.2.3.4/16::".parse().unwrap();
        assert_eq!((range.min_port, range.max_port), (0, 65535));

        let range: NetRange = "1.2.3.4/16::443".parse().unwrap();
        assert_eq!((range.min_port, range.max_port), (0, 443));

        let range: NetRange = "1.2.3.4/16:8000:".parse().unwrap();
        assert_eq!((range.min_port, range.max_port), (8000, 65535));
    }

    #[test]
    fn test_parse_single_port_is_exact() {
        let range: NetRange = "10.0.0.0/8:5432".parse().unwrap();
        assert_eq!((range.min_port, range.max_port), (5432, 5432));
    }

    #[test]
    fn test_parse_ipv6_in_brackets() {
        let range: NetRange = "[fd00::/8]:80:90".parse().unwrap();
        assert!(range.contains("fd12::1".parse().unwrap(), 85));
        assert!(!range.contains("10.0.0.1".parse().unwrap(), 85));

        let range: NetRange = "[::/0]".parse().unwrap();
        assert_eq!((range.min_port, range.max_port), (0, 65535));
    }

    #[test]
    fn test_parse_rejects_malformed_specs() {
        for spec in [
            "not-a-network",
            "1.2.3.400/16",
            "1.2.3.4/40",
            "1.2.3.4/16:http",
            "1.2.3.4/16:80:70000",
            "1.2.3.4/16:1:2:3",
            "[fd00::/8",
            "[fd00::/8]80",
            "",
        ] {
            assert!(spec.parse::<NetRange>().is_err(), "{} should not parse", spec);
        }
    }

    #[test]
    fn test_contains() {
        let range: NetRange = "10.0.0.0/24:100:200".parse().unwrap();
        let ip: IpAddr = "10.0.0.5".parse().unwrap();

        assert!(range.contains(ip, 100));
        assert!(range.contains(ip, 200));
        assert!(!range.contains(ip, 99));
        assert!(!range.contains(ip, 201));
        assert!(!range.contains("10.0.1.5".parse().unwrap(), 150));
    }

    #[test]
    fn test_construction_fails_closed() {
        let result = RangeResolver::new(vec![
            ("10.0.0.0/8", constant("a")),
            ("garbage/8", constant("b")),
        ]);

        assert!(matches!(result, Err(FlatnetError::InvalidRange { .. })));
    }

    #[test]
    fn test_overlapping_ranges_answer_from_one_resolver() {
        let resolver = RangeResolver::new(vec![
            ("10.0.0.0/8:100:200", constant("A")),
            ("10.0.0.0/24:150:160", constant("B")),
        ])
        .unwrap();

        let name = resolver.get_name("10.0.0.5", 155);
        assert!(name == "A" || name == "B", "unexpected answer {:?}", name);
    }

    #[test]
    fn test_unmatched_or_unparsable_host_is_empty() {
        let resolver = RangeResolver::new(vec![("10.0.0.0/8:100:200", constant("A"))]).unwrap();

        assert_eq!(resolver.get_name("10.0.0.5", 80), "");
        assert_eq!(resolver.get_name("192.168.1.1", 150), "");
        assert_eq!(resolver.get_name("db.internal", 150), "");
        assert_eq!(resolver.get_name("", 150), "");
    }

    #[test]
    fn test_falls_through_empty_answers() {
        let resolver = RangeResolver::new(vec![
            ("10.0.0.0/8", Arc::new(ConstantResolver::noop()) as Arc<dyn NameResolver>),
            ("10.0.0.0/8:80", constant("web")),
        ])
        .unwrap();

        assert_eq!(resolver.get_name("10.1.2.3", 80), "web");
        assert_eq!(resolver.get_name("10.1.2.3", 81), "");
    }
}
