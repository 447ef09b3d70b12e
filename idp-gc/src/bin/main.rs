use std::{env, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use idp_gc::{load, run, shutdown_signal, GcConfig};

#[cfg(target_env = "msvc")]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> Result<()> {
    let args = env::args().collect::<Vec<_>>();
    let config =
        if args.len() == 3 && (args[1] == "-c" || args[1] == "--config") {
            load(&args[2])?
        } else {
            GcConfig::parse()
        };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    debug!("{:#?}", &config);
    info!("idp-gc {}", env!("CARGO_PKG_VERSION"));

    let interval = config.interval()?;
    let storage = config
        .storage()?
        .open()
        .await
        .context("could not open storage")?;
    info!("storage opened, sweeping every {:?}", interval);

    run(Arc::clone(&storage), interval, shutdown_signal()).await;

    storage.close().await.context("could not close storage")?;
    info!("storage closed");
    Ok(())
}
