//! Error types for the router.
//!
//! Only [`ConfigError`] and [`RouterError`] ever abort the process. The
//! others are logged and counted where they happen.

use std::net::SocketAddr;

use thiserror::Error;

use crate::RouterId;

/// Malformed or inconsistent startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("router_id must not be empty")]
    EmptyRouterId,

    #[error("network_map has no entry for router {0}")]
    MissingNetwork(RouterId),

    #[error("network_map entry for {router} is not an IPv4 CIDR: {value}")]
    InvalidNetwork { router: RouterId, value: String },

    #[error("router {0} lists itself as a neighbor")]
    SelfNeighbor(RouterId),

    #[error("neighbor {0} is configured more than once")]
    DuplicateNeighbor(RouterId),

    #[error("neighbors {first} and {second} share the address {addr}")]
    DuplicateAddress {
        first: RouterId,
        second: RouterId,
        addr: SocketAddr,
    },

    #[error("neighbor {neighbor} has invalid bandwidth {value} (must be > 0)")]
    InvalidBandwidth { neighbor: RouterId, value: f64 },

    #[error("neighbor {neighbor} has invalid latency {value} (must be >= 0)")]
    InvalidLatency { neighbor: RouterId, value: f64 },

    #[error("invalid timers: {0}")]
    InvalidTimers(String),
}

/// A datagram that does not conform to the advertisement schema.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid advertisement encoding: {0}")]
    Json(#[from] serde_json::Error),

    #[error("advertisement has an empty sender_id")]
    EmptySender,

    #[error("advertisement has an empty destination id")]
    EmptyDestination,

    #[error("cost {cost} for destination {destination} is out of range")]
    CostOutOfRange { destination: RouterId, cost: u32 },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("send to {addr} failed: {source}")]
    Send {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("send to {0} timed out")]
    SendTimeout(SocketAddr),

    #[error("receive failed: {0}")]
    Receive(#[source] std::io::Error),

    #[error("failed to encode advertisement: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure to install or remove an OS route.
#[derive(Debug, Error)]
pub enum KernelSyncError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("`{0}` timed out")]
    Timeout(String),
}

/// Startup failures of a router instance.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
