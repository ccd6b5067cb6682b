use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::RouterId;

/// Link and route cost. Always within `0..=INFINITY`.
pub type Cost = u32;

/// Cost of an unreachable destination.
pub const INFINITY: Cost = 999;

/// Silence after which a neighbor is declared dead.
pub const TIMEOUT_INTERVAL: Duration = Duration::from_secs(30);

/// How long a freshly poisoned route ignores further updates.
pub const HOLD_DOWN_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Active,
    HoldDown,
}

/// Next hop of a route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Via {
    /// The router's own destination.
    Local,
    Neighbor(RouterId),
    /// Destination mentioned but never learned from anyone.
    Unknown,
}

impl Via {
    pub fn neighbor(&self) -> Option<&str> {
        match self {
            Via::Neighbor(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_neighbor(&self, id: &str) -> bool {
        self.neighbor() == Some(id)
    }
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Via::Local => write!(f, "local"),
            Via::Neighbor(id) => write!(f, "{}", id),
            Via::Unknown => write!(f, "-"),
        }
    }
}

/// Anomaly and activity counters shared by the router tasks.
#[derive(Debug, Default)]
pub struct ProtocolStats {
    advertisements_processed: AtomicU64,
    malformed_messages: AtomicU64,
    unknown_senders: AtomicU64,
    unmapped_destinations: AtomicU64,
    send_failures: AtomicU64,
    kernel_sync_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub advertisements_processed: u64,
    pub malformed_messages: u64,
    pub unknown_senders: u64,
    pub unmapped_destinations: u64,
    pub send_failures: u64,
    pub kernel_sync_failures: u64,
}

impl ProtocolStats {
    pub fn record_processed(&self) {
        self.advertisements_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown_sender(&self) {
        self.unknown_senders.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unmapped(&self, count: u64) {
        self.unmapped_destinations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_kernel_failures(&self, count: u64) {
        self.kernel_sync_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            advertisements_processed: self.advertisements_processed.load(Ordering::Relaxed),
            malformed_messages: self.malformed_messages.load(Ordering::Relaxed),
            unknown_senders: self.unknown_senders.load(Ordering::Relaxed),
            unmapped_destinations: self.unmapped_destinations.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            kernel_sync_failures: self.kernel_sync_failures.load(Ordering::Relaxed),
        }
    }
}
