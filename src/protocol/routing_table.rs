use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use crate::RouterId;

use super::types::{Cost, INFINITY, RouteState, Via};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub destination: RouterId,
    pub cost: Cost,
    pub via: Via,
    /// Raw cost last advertised by `via`, before the link cost was added.
    pub advertised_cost: Cost,
    pub state: RouteState,
    pub hold_until: Option<Instant>,
}

impl RouteEntry {
    pub fn local(destination: RouterId) -> Self {
        Self {
            destination,
            cost: 0,
            via: Via::Local,
            advertised_cost: 0,
            state: RouteState::Active,
            hold_until: None,
        }
    }

    pub fn unreachable(destination: RouterId) -> Self {
        Self {
            destination,
            cost: INFINITY,
            via: Via::Unknown,
            advertised_cost: INFINITY,
            state: RouteState::Active,
            hold_until: None,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.cost < INFINITY
    }

    /// Whether updates are frozen at `now`.
    pub fn is_held(&self, now: Instant) -> bool {
        self.state == RouteState::HoldDown && self.hold_until.is_some_and(|until| until > now)
    }

    pub fn enter_hold_down(&mut self, until: Instant) {
        self.cost = INFINITY;
        self.state = RouteState::HoldDown;
        self.hold_until = Some(until);
    }

    pub fn release(&mut self) {
        self.state = RouteState::Active;
        self.hold_until = None;
    }
}

/// Best route per destination. Entries are never removed: unreachable
/// destinations stay in the table with cost [`INFINITY`].
#[derive(Debug, Clone)]
pub struct RoutingTable {
    entries: BTreeMap<RouterId, RouteEntry>,
}

impl RoutingTable {
    pub fn new(local_id: RouterId) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(local_id.clone(), RouteEntry::local(local_id));
        Self { entries }
    }

    pub fn get(&self, destination: &str) -> Option<&RouteEntry> {
        self.entries.get(destination)
    }

    /// Returns the entry for `destination`, creating an unreachable one on
    /// first mention.
    pub fn entry(&mut self, destination: &str) -> &mut RouteEntry {
        self.entries
            .entry(destination.to_string())
            .or_insert_with(|| RouteEntry::unreachable(destination.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RouteEntry> {
        self.entries.values_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> Vec<RouteEntry> {
        self.entries.values().cloned().collect()
    }
}

/// Valid routes only, one per line.
impl fmt::Display for RoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(55))?;
        writeln!(f, "{:<10} | {:<10} | {:<15}", "Destination", "Cost", "Next hop")?;
        writeln!(f, "{}", "-".repeat(55))?;
        let mut any = false;
        for entry in self.entries.values().filter(|e| e.is_reachable()) {
            any = true;
            writeln!(f, "{:<10} | {:<10} | {:<15}", entry.destination, entry.cost, entry.via)?;
        }
        if !any {
            writeln!(f, " (no valid routes known)")?;
        }
        write!(f, "{}", "=".repeat(55))
    }
}
