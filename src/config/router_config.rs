use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use ipnet::Ipv4Net;

use crate::RouterId;
use crate::error::ConfigError;
use crate::protocol::TIMEOUT_INTERVAL;
use crate::protocol::cost::LinkMetrics;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub router_id: RouterId,
    pub listen_port: u16,
    #[serde(default = "default_listen_ip")]
    pub listen_ip: Ipv4Addr,
    pub network_map: HashMap<RouterId, String>,
    pub neighbors: Vec<NeighborConfig>,
    #[serde(default)]
    pub timers: TimerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborConfig {
    pub id: RouterId,
    pub ip: Ipv4Addr,
    pub port: u16,
    pub metrics: LinkMetrics,
}

impl NeighborConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.ip), self.port)
    }
}

/// Cadence of the periodic tasks. The protocol constants themselves
/// (`INFINITY`, `TIMEOUT_INTERVAL`, `HOLD_DOWN_INTERVAL`) are fixed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub update_interval_secs: u64,
    pub sweep_interval_ms: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: 10,
            sweep_interval_ms: 1000,
        }
    }
}

impl TimerConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

fn default_listen_ip() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

/// Destination networks keyed by the router that owns them. Read-only once
/// built from a validated config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkMap {
    networks: BTreeMap<RouterId, Ipv4Net>,
}

impl NetworkMap {
    pub fn get(&self, router_id: &str) -> Option<Ipv4Net> {
        self.networks.get(router_id).copied()
    }

    pub fn contains(&self, router_id: &str) -> bool {
        self.networks.contains_key(router_id)
    }

    pub fn router_ids(&self) -> impl Iterator<Item = &RouterId> {
        self.networks.keys()
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

impl FromIterator<(RouterId, Ipv4Net)> for NetworkMap {
    fn from_iter<T: IntoIterator<Item = (RouterId, Ipv4Net)>>(iter: T) -> Self {
        Self {
            networks: iter.into_iter().collect(),
        }
    }
}

impl RouterConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parses and validates a config document.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: RouterConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.router_id.is_empty() {
            return Err(ConfigError::EmptyRouterId);
        }

        self.network_map()?;
        if !self.network_map.contains_key(&self.router_id) {
            return Err(ConfigError::MissingNetwork(self.router_id.clone()));
        }

        let mut ids = HashSet::new();
        let mut addrs: HashMap<SocketAddr, &RouterId> = HashMap::new();
        for neighbor in &self.neighbors {
            if neighbor.id == self.router_id {
                return Err(ConfigError::SelfNeighbor(neighbor.id.clone()));
            }
            if !ids.insert(neighbor.id.as_str()) {
                return Err(ConfigError::DuplicateNeighbor(neighbor.id.clone()));
            }
            if let Some(first) = addrs.insert(neighbor.socket_addr(), &neighbor.id) {
                return Err(ConfigError::DuplicateAddress {
                    first: first.clone(),
                    second: neighbor.id.clone(),
                    addr: neighbor.socket_addr(),
                });
            }
            if !self.network_map.contains_key(&neighbor.id) {
                return Err(ConfigError::MissingNetwork(neighbor.id.clone()));
            }

            let metrics = &neighbor.metrics;
            if !metrics.bandwidth_mbps.is_finite() || metrics.bandwidth_mbps <= 0.0 {
                return Err(ConfigError::InvalidBandwidth {
                    neighbor: neighbor.id.clone(),
                    value: metrics.bandwidth_mbps,
                });
            }
            if !metrics.latency_ms.is_finite() || metrics.latency_ms < 0.0 {
                return Err(ConfigError::InvalidLatency {
                    neighbor: neighbor.id.clone(),
                    value: metrics.latency_ms,
                });
            }
        }

        let update = self.timers.update_interval();
        if update.is_zero() || update >= TIMEOUT_INTERVAL {
            return Err(ConfigError::InvalidTimers(format!(
                "update interval {:?} must be non-zero and shorter than the {:?} neighbor timeout",
                update, TIMEOUT_INTERVAL
            )));
        }
        if self.timers.sweep_interval().is_zero() {
            return Err(ConfigError::InvalidTimers(
                "sweep interval must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Parses every network-map value into an IPv4 prefix.
    pub fn network_map(&self) -> Result<NetworkMap, ConfigError> {
        self.network_map
            .iter()
            .map(|(router, value)| {
                value
                    .parse::<Ipv4Net>()
                    .map(|net| (router.clone(), net.trunc()))
                    .map_err(|_| ConfigError::InvalidNetwork {
                        router: router.clone(),
                        value: value.clone(),
                    })
            })
            .collect()
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.listen_ip), self.listen_port)
    }
}
