use async_trait::async_trait;
use ipnet::Ipv4Net;
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;

use dv_router::config::{NeighborConfig, RouterConfig, TimerConfig};
use dv_router::error::KernelSyncError;
use dv_router::network::Transport;
use dv_router::protocol::{
    Advertisement, LinkMetrics, RouteEntry, RouteState, Via, composite_cost,
};
use dv_router::{DistanceVectorRouter, KernelRouteSync};

#[derive(Clone, Default)]
struct RecordingKernel {
    routes: Arc<Mutex<HashMap<Ipv4Net, Ipv4Addr>>>,
}

impl RecordingKernel {
    fn installed(&self) -> HashMap<Ipv4Net, Ipv4Addr> {
        self.routes.lock().unwrap().clone()
    }
}

#[async_trait]
impl KernelRouteSync for RecordingKernel {
    async fn replace_route(
        &self,
        destination: Ipv4Net,
        next_hop: Ipv4Addr,
    ) -> Result<(), KernelSyncError> {
        self.routes.lock().unwrap().insert(destination, next_hop);
        Ok(())
    }

    async fn remove_route(&self, destination: Ipv4Net) -> Result<(), KernelSyncError> {
        self.routes.lock().unwrap().remove(&destination);
        Ok(())
    }
}

async fn bind() -> (Transport, SocketAddr) {
    let transport = Transport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = transport.local_addr().unwrap();
    (transport, addr)
}

fn config(id: &str, addr: SocketAddr, neighbors: &[(&str, SocketAddr)]) -> RouterConfig {
    RouterConfig {
        router_id: id.to_string(),
        listen_port: addr.port(),
        listen_ip: Ipv4Addr::LOCALHOST,
        network_map: [("r1", "10.0.1.0/24"), ("r2", "10.0.2.0/24"), ("r3", "10.0.3.0/24")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        neighbors: neighbors
            .iter()
            .map(|(id, addr)| NeighborConfig {
                id: id.to_string(),
                ip: Ipv4Addr::LOCALHOST,
                port: addr.port(),
                metrics: LinkMetrics::new(100.0, 10.0),
            })
            .collect(),
        timers: TimerConfig {
            update_interval_secs: 1,
            sweep_interval_ms: 100,
        },
    }
}

async fn wait_for_route<F>(router: &DistanceVectorRouter, destination: &str, done: F) -> RouteEntry
where
    F: Fn(&RouteEntry) -> bool,
{
    let poll = async {
        loop {
            if let Some(entry) = router.route(destination).await {
                if done(&entry) {
                    return entry;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), poll)
        .await
        .unwrap_or_else(|_| panic!("{} never converged on {}", router.router_id(), destination))
}

async fn wait_until<F>(what: &str, condition: F)
where
    F: Fn() -> bool,
{
    let poll = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), poll)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", what));
}

#[tokio::test]
async fn two_routers_converge_and_install_kernel_routes() {
    let (t1, a1) = bind().await;
    let (t2, a2) = bind().await;
    let k1 = RecordingKernel::default();
    let k2 = RecordingKernel::default();

    let r1 = DistanceVectorRouter::spawn_with_transport(
        config("r1", a1, &[("r2", a2)]),
        t1,
        Box::new(k1.clone()),
    )
    .await
    .unwrap();
    let r2 = DistanceVectorRouter::spawn_with_transport(
        config("r2", a2, &[("r1", a1)]),
        t2,
        Box::new(k2.clone()),
    )
    .await
    .unwrap();

    let link = composite_cost(10.0, 100.0, 1);
    let learned = wait_for_route(&r1, "r2", |e| e.is_reachable()).await;
    assert_eq!(learned.cost, link);
    assert_eq!(learned.via, Via::Neighbor("r2".into()));
    let learned = wait_for_route(&r2, "r1", |e| e.is_reachable()).await;
    assert_eq!(learned.cost, link);

    let r2_net: Ipv4Net = "10.0.2.0/24".parse().unwrap();
    wait_until("r1 kernel route", || k1.installed().contains_key(&r2_net)).await;
    assert_eq!(k1.installed()[&r2_net], Ipv4Addr::LOCALHOST);
    assert!(!k1.installed().contains_key(&"10.0.1.0/24".parse().unwrap()));
    assert!(r1.stats().advertisements_processed > 0);

    r2.shutdown().await;
    r1.shutdown().await;
    assert!(k1.installed().is_empty());
    assert!(k2.installed().is_empty());
}

#[tokio::test]
async fn chain_of_three_learns_remote_destination() {
    let (t1, a1) = bind().await;
    let (t2, a2) = bind().await;
    let (t3, a3) = bind().await;

    let r1 = DistanceVectorRouter::spawn_with_transport(
        config("r1", a1, &[("r2", a2)]),
        t1,
        Box::new(RecordingKernel::default()),
    )
    .await
    .unwrap();
    let r2 = DistanceVectorRouter::spawn_with_transport(
        config("r2", a2, &[("r1", a1), ("r3", a3)]),
        t2,
        Box::new(RecordingKernel::default()),
    )
    .await
    .unwrap();
    let r3 = DistanceVectorRouter::spawn_with_transport(
        config("r3", a3, &[("r2", a2)]),
        t3,
        Box::new(RecordingKernel::default()),
    )
    .await
    .unwrap();

    let expected = composite_cost(10.0, 100.0, 1) + composite_cost(10.0, 100.0, 2);
    let remote = wait_for_route(&r1, "r3", |e| e.cost == expected).await;
    assert_eq!(remote.via, Via::Neighbor("r2".into()));
    let remote = wait_for_route(&r3, "r1", |e| e.cost == expected).await;
    assert_eq!(remote.via, Via::Neighbor("r2".into()));

    for router in [r1, r2, r3] {
        router.shutdown().await;
    }
}

#[tokio::test]
async fn table_changes_propagate_without_waiting_for_the_periodic_update() {
    let (t1, a1) = bind().await;
    let (t2, a2) = bind().await;
    let (t3, a3) = bind().await;
    let slow = |mut config: RouterConfig| {
        config.timers.update_interval_secs = 25;
        config
    };

    let r1 = DistanceVectorRouter::spawn_with_transport(
        slow(config("r1", a1, &[("r2", a2)])),
        t1,
        Box::new(RecordingKernel::default()),
    )
    .await
    .unwrap();
    let r2 = DistanceVectorRouter::spawn_with_transport(
        slow(config("r2", a2, &[("r1", a1), ("r3", a3)])),
        t2,
        Box::new(RecordingKernel::default()),
    )
    .await
    .unwrap();
    let r3 = DistanceVectorRouter::spawn_with_transport(
        slow(config("r3", a3, &[("r2", a2)])),
        t3,
        Box::new(RecordingKernel::default()),
    )
    .await
    .unwrap();

    // only the first tick of each interval fires in this window
    let expected = composite_cost(10.0, 100.0, 1) + composite_cost(10.0, 100.0, 2);
    let converged = async {
        wait_for_route(&r1, "r3", |e| e.cost == expected).await;
        wait_for_route(&r3, "r1", |e| e.cost == expected).await;
    };
    tokio::time::timeout(Duration::from_secs(3), converged)
        .await
        .expect("chain converged only on the periodic update");

    for router in [r1, r2, r3] {
        router.shutdown().await;
    }
}

#[tokio::test]
async fn failed_send_to_one_neighbor_does_not_block_the_others() {
    let (t1, a1) = bind().await;
    let (t2, a2) = bind().await;
    // sending to port 0 is rejected by the kernel
    let unroutable: SocketAddr = "127.0.0.1:0".parse().unwrap();

    let r1 = DistanceVectorRouter::spawn_with_transport(
        config("r1", a1, &[("r2", a2), ("r3", unroutable)]),
        t1,
        Box::new(RecordingKernel::default()),
    )
    .await
    .unwrap();
    let r2 = DistanceVectorRouter::spawn_with_transport(
        config("r2", a2, &[("r1", a1)]),
        t2,
        Box::new(RecordingKernel::default()),
    )
    .await
    .unwrap();

    wait_for_route(&r1, "r2", |e| e.is_reachable()).await;
    wait_for_route(&r2, "r1", |e| e.is_reachable()).await;
    wait_until("send failure count", || r1.stats().send_failures > 0).await;

    assert_eq!(r1.neighbor_alive("r2").await, Some(true));
    assert_eq!(r1.neighbor_alive("r3").await, Some(false));
    let r3 = r1.route("r3").await.unwrap();
    assert!(!r3.is_reachable());
    assert_eq!(r3.state, RouteState::Active);
    assert_eq!(r3.via, Via::Unknown);

    r2.shutdown().await;
    r1.shutdown().await;
}

#[tokio::test]
async fn datagrams_from_strangers_and_garbage_are_dropped() {
    let (t1, a1) = bind().await;
    let (_t2, a2) = bind().await;
    let r1 = DistanceVectorRouter::spawn_with_transport(
        config("r1", a1, &[("r2", a2)]),
        t1,
        Box::new(RecordingKernel::default()),
    )
    .await
    .unwrap();

    // claims to be r2 but comes from a different port
    let stranger = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let forged = Advertisement::new("r2".into(), [("r2".to_string(), 0)].into_iter().collect());
    stranger
        .send_to(&forged.encode().unwrap(), a1)
        .await
        .unwrap();
    wait_until("unknown sender count", || r1.stats().unknown_senders >= 1).await;

    stranger.send_to(b"not a vector", a1).await.unwrap();
    wait_until("malformed count", || r1.stats().malformed_messages >= 1).await;

    let r2 = r1.route("r2").await.unwrap();
    assert!(!r2.is_reachable());
    assert_eq!(r1.stats().advertisements_processed, 0);

    r1.shutdown().await;
}

#[tokio::test]
async fn shutdown_completes_promptly() {
    let (t1, a1) = bind().await;
    let (_t2, a2) = bind().await;
    let router = DistanceVectorRouter::spawn_with_transport(
        config("r1", a1, &[("r2", a2)]),
        t1,
        Box::new(RecordingKernel::default()),
    )
    .await
    .unwrap();
    assert_eq!(router.local_addr(), a1);

    tokio::time::timeout(Duration::from_secs(2), router.shutdown())
        .await
        .expect("shutdown hung");
}
