use log::{info, warn};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;

use crate::RouterId;
use crate::config::NeighborConfig;

use super::neighbor::Neighbor;
use super::types::{Cost, TIMEOUT_INTERVAL};

/// Outcome of recording an advertisement from a neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Touch {
    /// The neighbor was already alive.
    Refreshed,
    /// The neighbor was dead (or never heard from) and is now alive.
    Revived,
}

/// Liveness and link metrics of the statically configured neighbors. The
/// set of neighbors never changes after construction.
#[derive(Debug, Clone, Default)]
pub struct NeighborTable {
    neighbors: BTreeMap<RouterId, Neighbor>,
}

impl NeighborTable {
    pub fn new<'a>(configs: impl IntoIterator<Item = &'a NeighborConfig>) -> Self {
        Self {
            neighbors: configs
                .into_iter()
                .map(|config| (config.id.clone(), Neighbor::from(config)))
                .collect(),
        }
    }

    /// Records an advertisement received from `neighbor_id`. Returns `None`
    /// for an id that is not configured.
    pub fn touch(&mut self, neighbor_id: &str, now: Instant) -> Option<Touch> {
        let neighbor = self.neighbors.get_mut(neighbor_id)?;
        neighbor.last_seen = Some(now);
        if neighbor.alive {
            Some(Touch::Refreshed)
        } else {
            neighbor.alive = true;
            info!("Neighbor {} is now ALIVE", neighbor_id);
            Some(Touch::Revived)
        }
    }

    /// Marks every alive neighbor silent for longer than
    /// [`TIMEOUT_INTERVAL`] as dead and returns the ones that just died.
    pub fn sweep_timeouts(&mut self, now: Instant) -> Vec<RouterId> {
        let mut dead = Vec::new();
        for (id, neighbor) in self.neighbors.iter_mut() {
            if !neighbor.alive {
                continue;
            }
            if let Some(silence) = neighbor.silent_for(now) {
                if silence > TIMEOUT_INTERVAL {
                    warn!("TIMEOUT! Neighbor {} silent for {:?}, marking DEAD", id, silence);
                    neighbor.alive = false;
                    dead.push(id.clone());
                }
            }
        }
        dead
    }

    pub fn active_count(&self) -> usize {
        self.neighbors.values().filter(|n| n.alive).count()
    }

    /// Cost of the direct link to `neighbor_id` at the current activity
    /// level.
    pub fn link_cost(&self, neighbor_id: &str) -> Option<Cost> {
        let active = self.active_count();
        self.neighbors
            .get(neighbor_id)
            .map(|neighbor| neighbor.metrics.cost(active))
    }

    pub fn get(&self, neighbor_id: &str) -> Option<&Neighbor> {
        self.neighbors.get(neighbor_id)
    }

    pub fn is_alive(&self, neighbor_id: &str) -> bool {
        self.neighbors.get(neighbor_id).is_some_and(|n| n.alive)
    }

    /// Maps a datagram source address to the configured neighbor.
    pub fn lookup_by_addr(&self, addr: SocketAddr) -> Option<&Neighbor> {
        self.neighbors
            .values()
            .find(|neighbor| neighbor.socket_addr() == addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Neighbor> {
        self.neighbors.values()
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}
