//! Distance-vector convergence: merging received vectors into the routing
//! table, poisoning on timeout, hold-down release and per-neighbor vector
//! generation with poison reverse.
//!
//! Every operation takes `now` explicitly. The engine itself is not
//! synchronised; the router keeps it behind a single lock so that each call
//! is atomic with respect to the others.

use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use crate::RouterId;
use crate::config::{NetworkMap, RouterConfig};
use crate::error::ConfigError;
use crate::system::RouteSnapshot;

use super::cost::add_costs;
use super::messages::{Advertisement, DistanceVector};
use super::neighbor_manager::{NeighborTable, Touch};
use super::routing_table::{RouteEntry, RoutingTable};
use super::types::{HOLD_DOWN_INTERVAL, INFINITY, RouteState, Via};

/// Destinations whose entry changed during one engine operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableChange {
    /// Cost, next hop or state changed.
    pub updated: BTreeSet<RouterId>,
    /// Went from finite to [`INFINITY`] and entered hold-down. These need an
    /// immediate poison announcement.
    pub poisoned: BTreeSet<RouterId>,
    /// Advertised destinations with no network-map entry. Not a table change
    /// on its own.
    pub unmapped: BTreeSet<RouterId>,
}

impl TableChange {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.poisoned.is_empty()
    }

    pub fn merge(&mut self, other: TableChange) {
        self.updated.extend(other.updated);
        self.poisoned.extend(other.poisoned);
        self.unmapped.extend(other.unmapped);
    }
}

#[derive(Debug, Clone)]
pub struct ConvergenceEngine {
    router_id: RouterId,
    network_map: Arc<NetworkMap>,
    neighbors: NeighborTable,
    routes: RoutingTable,
}

impl ConvergenceEngine {
    pub fn new(config: &RouterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let network_map = Arc::new(config.network_map()?);
        Ok(Self::from_parts(
            config.router_id.clone(),
            network_map,
            NeighborTable::new(&config.neighbors),
        ))
    }

    /// Builds an engine whose table holds the self-route plus an unreachable
    /// entry for every other router in the network map.
    pub fn from_parts(
        router_id: RouterId,
        network_map: Arc<NetworkMap>,
        neighbors: NeighborTable,
    ) -> Self {
        let mut routes = RoutingTable::new(router_id.clone());
        for id in network_map.router_ids() {
            routes.entry(id);
        }
        Self {
            router_id,
            network_map,
            neighbors,
            routes,
        }
    }

    pub fn router_id(&self) -> &str {
        &self.router_id
    }

    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn network_map(&self) -> &NetworkMap {
        &self.network_map
    }

    /// Records an advertisement from `from` and merges its vector. Returns
    /// `None` if `from` is not a configured neighbor.
    pub fn process_advertisement(
        &mut self,
        from: &str,
        vector: &DistanceVector,
        now: Instant,
    ) -> Option<TableChange> {
        let touch = self.neighbors.touch(from, now)?;
        let mut change = TableChange::default();
        if touch == Touch::Revived {
            // the congestion penalty moved with the active count
            change.merge(self.reprice(now));
            change.merge(self.release_hold_downs(now, Some(from)));
        }

        let link_cost = self.neighbors.link_cost(from)?;
        for (destination, &advertised) in vector {
            if *destination == self.router_id {
                continue;
            }
            if !self.network_map.contains(destination) {
                warn!("{} advertised {} which has no network mapping", from, destination);
                change.unmapped.insert(destination.clone());
            }

            let candidate = add_costs(advertised, link_cost);
            let entry = self.routes.entry(destination);

            if entry.is_held(now) {
                debug!(
                    "Ignoring {} -> {} cost {}: route in hold-down",
                    from, destination, candidate
                );
                continue;
            }
            if entry.state == RouteState::HoldDown {
                entry.release();
                change.updated.insert(destination.clone());
            }

            if entry.via.is_neighbor(from) {
                entry.advertised_cost = advertised;
                if candidate == entry.cost {
                    continue;
                }
                let was_reachable = entry.is_reachable();
                entry.cost = candidate;
                if candidate >= INFINITY && was_reachable {
                    info!("Route to {} via {} is now unreachable", destination, from);
                    Self::poison(entry, now, &mut change);
                } else {
                    debug!("Route to {} via {} now costs {}", destination, from, candidate);
                    change.updated.insert(destination.clone());
                }
            } else if candidate < entry.cost {
                info!(
                    "New best route to {} via {} cost {} (was {} via {})",
                    destination, from, candidate, entry.cost, entry.via
                );
                entry.cost = candidate;
                entry.via = Via::Neighbor(from.to_string());
                entry.advertised_cost = advertised;
                change.updated.insert(destination.clone());
            }
        }

        Some(change)
    }

    /// Declares silent neighbors dead and poisons every route through them.
    pub fn sweep_neighbor_timeouts(&mut self, now: Instant) -> TableChange {
        let dead = self.neighbors.sweep_timeouts(now);
        let mut change = TableChange::default();
        if dead.is_empty() {
            return change;
        }

        for neighbor in &dead {
            for entry in self.routes.iter_mut() {
                if !entry.via.is_neighbor(neighbor) {
                    continue;
                }
                if entry.is_reachable() {
                    info!(
                        "Poisoning route to {} (via dead neighbor {}) and starting hold-down",
                        entry.destination, neighbor
                    );
                    Self::poison(entry, now, &mut change);
                } else {
                    entry.enter_hold_down(now + HOLD_DOWN_INTERVAL);
                    change.updated.insert(entry.destination.clone());
                }
            }
        }

        change.merge(self.reprice(now));
        change
    }

    /// Returns every expired hold-down to `Active`. Cost and next hop stay
    /// as they are until the next advertisement resolves them.
    pub fn sweep_hold_downs(&mut self, now: Instant) -> TableChange {
        self.release_hold_downs(now, None)
    }

    fn release_hold_downs(&mut self, now: Instant, via: Option<&str>) -> TableChange {
        let mut change = TableChange::default();
        for entry in self.routes.iter_mut() {
            if entry.state != RouteState::HoldDown || entry.is_held(now) {
                continue;
            }
            if via.is_some_and(|id| !entry.via.is_neighbor(id)) {
                continue;
            }
            debug!("Hold-down expired for {}", entry.destination);
            entry.release();
            change.updated.insert(entry.destination.clone());
        }
        change
    }

    /// Recomputes learned route costs after the active-neighbor count
    /// changed. Hold-down entries are left frozen.
    fn reprice(&mut self, now: Instant) -> TableChange {
        let mut change = TableChange::default();
        let active = self.neighbors.active_count();
        for entry in self.routes.iter_mut() {
            if entry.state != RouteState::Active || !entry.is_reachable() {
                continue;
            }
            let Some(neighbor) = entry.via.neighbor().and_then(|id| self.neighbors.get(id)) else {
                continue;
            };
            let cost = add_costs(entry.advertised_cost, neighbor.metrics.cost(active));
            if cost == entry.cost {
                continue;
            }
            if cost >= INFINITY {
                warn!("Re-priced route to {} exceeds the cost ceiling", entry.destination);
                Self::poison(entry, now, &mut change);
            } else {
                debug!("Re-priced route to {}: {} -> {}", entry.destination, entry.cost, cost);
                entry.cost = cost;
                change.updated.insert(entry.destination.clone());
            }
        }
        change
    }

    fn poison(entry: &mut RouteEntry, now: Instant, change: &mut TableChange) {
        entry.enter_hold_down(now + HOLD_DOWN_INTERVAL);
        change.poisoned.insert(entry.destination.clone());
        change.updated.insert(entry.destination.clone());
    }

    /// Vector for `for_neighbor`: the whole table, with routes learned from
    /// that neighbor reported at [`INFINITY`] (poison reverse).
    pub fn generate_advertisement(&self, for_neighbor: &str) -> Advertisement {
        let vector = self
            .routes
            .iter()
            .map(|entry| {
                let cost = match &entry.via {
                    Via::Local => 0,
                    Via::Neighbor(id) if id == for_neighbor => INFINITY,
                    _ => entry.cost,
                };
                (entry.destination.clone(), cost)
            })
            .collect();
        Advertisement::new(self.router_id.clone(), vector)
    }

    /// Routes that should be present in the kernel: active, finite and
    /// learned from a neighbor, keyed by destination prefix.
    pub fn kernel_routes(&self) -> RouteSnapshot {
        let mut snapshot = RouteSnapshot::new();
        for entry in self.routes.iter() {
            if entry.state != RouteState::Active || !entry.is_reachable() {
                continue;
            }
            let Some(via) = entry.via.neighbor() else {
                continue;
            };
            let (Some(prefix), Some(neighbor)) =
                (self.network_map.get(&entry.destination), self.neighbors.get(via))
            else {
                debug!("No kernel route for {}: unknown network or next hop", entry.destination);
                continue;
            };
            snapshot.insert(prefix, neighbor.address);
        }
        snapshot
    }
}
