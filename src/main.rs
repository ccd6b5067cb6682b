use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::io::Write;
use tokio::runtime::Builder;

use dv_router::{DistanceVectorRouter, DryRunKernel, IpRouteCommand, KernelRouteSync, RouterConfig};

#[derive(Parser)]
#[command(name = "dv-router", about = "Distance-vector router agent")]
struct Cli {
    /// Path to the JSON router configuration
    #[arg(long)]
    config: String,

    /// Log kernel route changes instead of applying them
    #[arg(long)]
    dry_run: bool,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = RouterConfig::load(&cli.config)
        .with_context(|| format!("invalid configuration in {}", cli.config))?;

    let router_id = config.router_id.clone();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_level.as_str()))
        .format(move |buf, record| {
            writeln!(
                buf,
                "{} [{}] - [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                router_id,
                record.args()
            )
        })
        .init();

    let kernel: Box<dyn KernelRouteSync> = if cli.dry_run {
        Box::new(DryRunKernel)
    } else {
        Box::new(IpRouteCommand)
    };

    let rt = Builder::new_multi_thread().enable_all().build()?;

    rt.block_on(async {
        let router = DistanceVectorRouter::spawn(config, kernel)
            .await
            .context("failed to start router")?;

        tokio::signal::ctrl_c().await?;
        router.shutdown().await;
        Ok::<(), anyhow::Error>(())
    })
}
