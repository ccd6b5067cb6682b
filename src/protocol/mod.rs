pub mod cost;
pub mod message_handler;
pub mod messages;
pub mod neighbor;
pub mod neighbor_manager;
pub mod route_manager;
pub mod routing_table;
pub mod task_manager;
pub mod types;

pub use cost::{LinkMetrics, composite_cost};
pub use messages::{Advertisement, DistanceVector};
pub use neighbor::Neighbor;
pub use neighbor_manager::{NeighborTable, Touch};
pub use route_manager::{ConvergenceEngine, TableChange};
pub use routing_table::{RouteEntry, RoutingTable};
pub use types::*;

use chrono::Local;
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::RouterId;
use crate::config::{RouterConfig, TimerConfig};
use crate::error::RouterError;
use crate::network::Transport;
use crate::system::{KernelReconciler, KernelRouteSync, RouteSnapshot};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// State shared by every router task. `engine` is the single lock over the
/// routing and neighbor tables.
pub(crate) struct RouterContext {
    pub(crate) engine: Mutex<ConvergenceEngine>,
    pub(crate) transport: Transport,
    pub(crate) kernel_tx: mpsc::UnboundedSender<RouteSnapshot>,
    pub(crate) triggered: Notify,
    pub(crate) stats: ProtocolStats,
    pub(crate) timers: TimerConfig,
}

impl RouterContext {
    /// Must be called while still holding the engine lock, so the kernel
    /// snapshot matches the table state that produced `change`.
    pub(crate) fn publish(&self, engine: &ConvergenceEngine, change: &TableChange, reason: &str) {
        if change.is_empty() {
            return;
        }
        if !change.poisoned.is_empty() {
            info!("Announcing poisoned routes: {:?}", change.poisoned);
        }
        info!(
            "Routing table changed ({}) at {}\n{}",
            reason,
            Local::now().format("%H:%M:%S"),
            engine.routes()
        );
        if self.kernel_tx.send(engine.kernel_routes()).is_err() {
            debug!("Kernel sync task is gone, snapshot dropped");
        }
        self.triggered.notify_one();
    }
}

/// A running router instance: one receive loop, the periodic advertisement,
/// timeout and hold-down tasks, and the kernel sync task.
pub struct DistanceVectorRouter {
    router_id: RouterId,
    local_addr: SocketAddr,
    ctx: Arc<RouterContext>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

impl DistanceVectorRouter {
    pub async fn spawn(
        config: RouterConfig,
        kernel: Box<dyn KernelRouteSync>,
    ) -> Result<Self, RouterError> {
        config.validate()?;
        let transport = Transport::bind(config.listen_addr()).await?;
        Self::spawn_with_transport(config, transport, kernel).await
    }

    /// Starts a router on an already bound transport.
    pub async fn spawn_with_transport(
        config: RouterConfig,
        transport: Transport,
        kernel: Box<dyn KernelRouteSync>,
    ) -> Result<Self, RouterError> {
        let engine = ConvergenceEngine::new(&config)?;
        let local_addr = transport.local_addr()?;
        info!(
            "Router {} started, listening on {} with {} neighbors",
            config.router_id,
            local_addr,
            engine.neighbors().len()
        );

        let (kernel_tx, kernel_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = broadcast::channel(1);
        let ctx = Arc::new(RouterContext {
            engine: Mutex::new(engine),
            transport,
            kernel_tx,
            triggered: Notify::new(),
            stats: ProtocolStats::default(),
            timers: config.timers.clone(),
        });

        {
            let engine = ctx.engine.lock().await;
            info!("Initial routing table\n{}", engine.routes());
            let _ = ctx.kernel_tx.send(engine.kernel_routes());
        }

        let handles = task_manager::start_tasks(
            &ctx,
            KernelReconciler::new(kernel),
            kernel_rx,
            &shutdown_tx,
        );

        Ok(Self {
            router_id: config.router_id,
            local_addr,
            ctx,
            shutdown_tx,
            handles,
        })
    }

    pub fn router_id(&self) -> &str {
        &self.router_id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn routes(&self) -> Vec<RouteEntry> {
        self.ctx.engine.lock().await.routes().snapshot()
    }

    pub async fn route(&self, destination: &str) -> Option<RouteEntry> {
        self.ctx.engine.lock().await.routes().get(destination).cloned()
    }

    /// `None` if `id` is not a configured neighbor.
    pub async fn neighbor_alive(&self, id: &str) -> Option<bool> {
        self.ctx.engine.lock().await.neighbors().get(id).map(|n| n.alive)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats.snapshot()
    }

    /// Stops every task and waits for them, aborting whatever has not
    /// finished within the grace period.
    pub async fn shutdown(mut self) {
        info!("Shutting down router {}", self.router_id);
        let _ = self.shutdown_tx.send(());

        let handles = std::mem::take(&mut self.handles);
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        if tokio::time::timeout(SHUTDOWN_GRACE, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!("Router tasks did not stop within {:?}, aborting", SHUTDOWN_GRACE);
            for handle in aborts {
                handle.abort();
            }
        }
    }
}

impl Drop for DistanceVectorRouter {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}
