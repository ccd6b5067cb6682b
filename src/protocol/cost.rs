//! Composite link cost.
//!
//! `cost = latency_ms + 1000 / bandwidth_mbps + 0.5 * active_neighbors`,
//! rounded to the nearest integer and capped at [`INFINITY`]. The
//! congestion term counts the live neighbors of the router computing the
//! cost, so a router that loses a neighbor prices its remaining links lower.

use serde::{Deserialize, Serialize};

use super::types::{Cost, INFINITY};

const BANDWIDTH_REFERENCE_MBPS: f64 = 1000.0;
const CONGESTION_WEIGHT: f64 = 0.5;

/// Static metrics of a configured link. Bandwidth is validated to be
/// positive when the config is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkMetrics {
    pub bandwidth_mbps: f64,
    pub latency_ms: f64,
}

impl LinkMetrics {
    pub fn new(bandwidth_mbps: f64, latency_ms: f64) -> Self {
        Self {
            bandwidth_mbps,
            latency_ms,
        }
    }

    pub fn cost(&self, active_neighbors: usize) -> Cost {
        composite_cost(self.latency_ms, self.bandwidth_mbps, active_neighbors)
    }
}

pub fn congestion_penalty(active_neighbors: usize) -> f64 {
    active_neighbors as f64 * CONGESTION_WEIGHT
}

pub fn composite_cost(latency_ms: f64, bandwidth_mbps: f64, active_neighbors: usize) -> Cost {
    let raw = latency_ms + BANDWIDTH_REFERENCE_MBPS / bandwidth_mbps
        + congestion_penalty(active_neighbors);
    if !raw.is_finite() || raw >= INFINITY as f64 {
        return INFINITY;
    }
    raw.round().max(0.0) as Cost
}

/// `a + b`, saturating at [`INFINITY`].
pub fn add_costs(a: Cost, b: Cost) -> Cost {
    a.saturating_add(b).min(INFINITY)
}
