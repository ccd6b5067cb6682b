//! Kernel forwarding-table synchronisation.

use async_trait::async_trait;
use ipnet::Ipv4Net;
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::process::Command;

use crate::error::KernelSyncError;

/// Desired kernel routes: destination prefix to next-hop address.
pub type RouteSnapshot = BTreeMap<Ipv4Net, Ipv4Addr>;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait KernelRouteSync: Send + Sync {
    /// Adds the route, or replaces an existing route to the same prefix.
    async fn replace_route(
        &self,
        destination: Ipv4Net,
        next_hop: Ipv4Addr,
    ) -> Result<(), KernelSyncError>;

    async fn remove_route(&self, destination: Ipv4Net) -> Result<(), KernelSyncError>;
}

/// Drives `ip route` from iproute2.
#[derive(Debug, Clone, Default)]
pub struct IpRouteCommand;

impl IpRouteCommand {
    async fn run(&self, args: &[String]) -> Result<(), KernelSyncError> {
        let command = format!("ip route {}", args.join(" "));
        let mut cmd = Command::new("ip");
        cmd.arg("route").args(args).kill_on_drop(true);

        let output = match tokio::time::timeout(COMMAND_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => return Err(KernelSyncError::Spawn { command, source }),
            Err(_) => return Err(KernelSyncError::Timeout(command)),
        };

        if !output.status.success() {
            return Err(KernelSyncError::Failed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        debug!("Executed: {}", command);
        Ok(())
    }
}

#[async_trait]
impl KernelRouteSync for IpRouteCommand {
    async fn replace_route(
        &self,
        destination: Ipv4Net,
        next_hop: Ipv4Addr,
    ) -> Result<(), KernelSyncError> {
        self.run(&[
            "replace".to_string(),
            destination.to_string(),
            "via".to_string(),
            next_hop.to_string(),
        ])
        .await
    }

    async fn remove_route(&self, destination: Ipv4Net) -> Result<(), KernelSyncError> {
        self.run(&["del".to_string(), destination.to_string()]).await
    }
}

/// Logs the route changes without touching the kernel.
#[derive(Debug, Clone, Default)]
pub struct DryRunKernel;

#[async_trait]
impl KernelRouteSync for DryRunKernel {
    async fn replace_route(
        &self,
        destination: Ipv4Net,
        next_hop: Ipv4Addr,
    ) -> Result<(), KernelSyncError> {
        info!("[dry-run] ip route replace {} via {}", destination, next_hop);
        Ok(())
    }

    async fn remove_route(&self, destination: Ipv4Net) -> Result<(), KernelSyncError> {
        info!("[dry-run] ip route del {}", destination);
        Ok(())
    }
}

/// Brings the kernel in line with successive route snapshots, issuing
/// commands only for differences against what it has installed so far.
pub struct KernelReconciler {
    backend: Box<dyn KernelRouteSync>,
    installed: HashMap<Ipv4Net, Ipv4Addr>,
}

impl KernelReconciler {
    pub fn new(backend: Box<dyn KernelRouteSync>) -> Self {
        Self {
            backend,
            installed: HashMap::new(),
        }
    }

    pub fn installed(&self) -> &HashMap<Ipv4Net, Ipv4Addr> {
        &self.installed
    }

    /// Returns the number of failed commands. Failed prefixes keep their
    /// previous bookkeeping and are retried on the next call.
    pub async fn reconcile(&mut self, desired: &RouteSnapshot) -> usize {
        let mut failures = 0;

        for (&destination, &next_hop) in desired {
            if self.installed.get(&destination) == Some(&next_hop) {
                continue;
            }
            info!("Kernel sync: installing route to {} via {}", destination, next_hop);
            match self.backend.replace_route(destination, next_hop).await {
                Ok(()) => {
                    self.installed.insert(destination, next_hop);
                }
                Err(e) => {
                    warn!("Failed to install route to {}: {}", destination, e);
                    failures += 1;
                }
            }
        }

        let stale: Vec<Ipv4Net> = self
            .installed
            .keys()
            .filter(|prefix| !desired.contains_key(prefix))
            .copied()
            .collect();
        for destination in stale {
            info!("Kernel sync: removing route to {}", destination);
            match self.backend.remove_route(destination).await {
                Ok(()) => {
                    self.installed.remove(&destination);
                }
                Err(e) => {
                    warn!("Failed to remove route to {}: {}", destination, e);
                    failures += 1;
                }
            }
        }

        failures
    }

    /// Removes every route this reconciler installed.
    pub async fn withdraw_all(&mut self) -> usize {
        self.reconcile(&RouteSnapshot::new()).await
    }
}
