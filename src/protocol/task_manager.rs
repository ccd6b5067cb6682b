use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::RouterId;
use crate::network::transport::RECV_BUFFER_SIZE;
use crate::system::{KernelReconciler, RouteSnapshot};

use super::RouterContext;
use super::message_handler;
use super::messages::Advertisement;

pub(crate) fn start_tasks(
    ctx: &Arc<RouterContext>,
    reconciler: KernelReconciler,
    kernel_rx: mpsc::UnboundedReceiver<RouteSnapshot>,
    shutdown_tx: &broadcast::Sender<()>,
) -> Vec<JoinHandle<()>> {
    let handles = vec![
        tokio::spawn(listen_task(ctx.clone(), shutdown_tx.subscribe())),
        tokio::spawn(advertisement_task(ctx.clone(), shutdown_tx.subscribe())),
        tokio::spawn(timeout_task(ctx.clone(), shutdown_tx.subscribe())),
        tokio::spawn(hold_down_task(ctx.clone(), shutdown_tx.subscribe())),
        tokio::spawn(kernel_sync_task(
            ctx.clone(),
            reconciler,
            kernel_rx,
            shutdown_tx.subscribe(),
        )),
    ];
    info!("All protocol tasks started");
    handles
}

async fn listen_task(ctx: Arc<RouterContext>, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut buffer = vec![0u8; RECV_BUFFER_SIZE];

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Listen task shutting down");
                break;
            }
            result = ctx.transport.recv(&mut buffer) => {
                match result {
                    Ok((payload, from)) => {
                        message_handler::handle_datagram(&ctx, payload, from).await;
                    }
                    Err(e) => {
                        warn!("{}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }
}

/// Periodic full-table advertisement, plus an immediate burst whenever a
/// table change is published.
async fn advertisement_task(ctx: Arc<RouterContext>, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut interval = interval(ctx.timers.update_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Advertisement task shutting down");
                break;
            }
            _ = interval.tick() => {
                send_advertisements(&ctx, "periodic").await;
            }
            _ = ctx.triggered.notified() => {
                send_advertisements(&ctx, "triggered").await;
            }
        }
    }
}

async fn send_advertisements(ctx: &RouterContext, reason: &str) {
    let outgoing: Vec<(RouterId, SocketAddr, Advertisement)> = {
        let engine = ctx.engine.lock().await;
        engine
            .neighbors()
            .iter()
            .map(|n| (n.id.clone(), n.socket_addr(), engine.generate_advertisement(&n.id)))
            .collect()
    };

    debug!("Sending {} update to {} neighbors", reason, outgoing.len());
    let sends = outgoing.iter().map(|(id, addr, advertisement)| async move {
        if let Err(e) = ctx.transport.send(*addr, advertisement).await {
            warn!("Failed to send update to {}: {}", id, e);
            ctx.stats.record_send_failure();
        }
    });
    futures::future::join_all(sends).await;
}

async fn timeout_task(ctx: Arc<RouterContext>, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut interval = interval(ctx.timers.sweep_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Timeout task shutting down");
                break;
            }
            _ = interval.tick() => {
                let mut engine = ctx.engine.lock().await;
                let change = engine.sweep_neighbor_timeouts(Instant::now());
                ctx.publish(&engine, &change, "neighbor timeout");
            }
        }
    }
}

async fn hold_down_task(ctx: Arc<RouterContext>, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut interval = interval(ctx.timers.sweep_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Hold-down task shutting down");
                break;
            }
            _ = interval.tick() => {
                let mut engine = ctx.engine.lock().await;
                let change = engine.sweep_hold_downs(Instant::now());
                ctx.publish(&engine, &change, "hold-down expiry");
            }
        }
    }
}

/// Applies snapshots one at a time, in the order they were published. On
/// shutdown every installed route is withdrawn.
async fn kernel_sync_task(
    ctx: Arc<RouterContext>,
    mut reconciler: KernelReconciler,
    mut kernel_rx: mpsc::UnboundedReceiver<RouteSnapshot>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                debug!("Kernel sync task shutting down");
                break;
            }
            snapshot = kernel_rx.recv() => {
                let Some(snapshot) = snapshot else {
                    break;
                };
                let failures = reconciler.reconcile(&snapshot).await;
                if failures > 0 {
                    ctx.stats.record_kernel_failures(failures as u64);
                }
            }
        }
    }

    let failures = reconciler.withdraw_all().await;
    if failures > 0 {
        warn!("{} installed routes could not be withdrawn", failures);
        ctx.stats.record_kernel_failures(failures as u64);
    }
}
