use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use crate::RouterId;
use crate::config::NeighborConfig;

use super::cost::LinkMetrics;

#[derive(Debug, Clone)]
pub struct Neighbor {
    pub id: RouterId,
    pub address: Ipv4Addr,
    pub port: u16,
    pub metrics: LinkMetrics,
    /// `None` until the first advertisement arrives.
    pub last_seen: Option<Instant>,
    pub alive: bool,
}

impl Neighbor {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.address, self.port))
    }

    pub fn silent_for(&self, now: Instant) -> Option<Duration> {
        self.last_seen.map(|seen| now.saturating_duration_since(seen))
    }
}

impl From<&NeighborConfig> for Neighbor {
    fn from(config: &NeighborConfig) -> Self {
        Self {
            id: config.id.clone(),
            address: config.ip,
            port: config.port,
            metrics: config.metrics,
            last_seen: None,
            alive: false,
        }
    }
}
