//! Periodic sweeper for expired identity provider state.

mod config;

pub use config::{load, BackendKind, GcConfig};

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::signal;
use tracing::{error, info, warn};

use idp_storage::{GcResult, Storage};

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!("failed to install signal handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Runs one collection. Failures are logged; what could be removed is
/// still returned.
pub async fn sweep(storage: &dyn Storage) -> GcResult {
    match storage.garbage_collect(Utc::now()).await {
        Ok(result) => result,
        Err(err) => {
            error!("{}", err);
            for failure in &err.failures {
                warn!(
                    kind = %failure.kind,
                    key = ?failure.key,
                    "{}",
                    failure.error
                );
            }
            err.partial
        }
    }
}

/// Sweeps every `interval` until `shutdown` resolves.
pub async fn run<F>(storage: Arc<dyn Storage>, interval: Duration, shutdown: F)
where
    F: std::future::Future<Output = ()> + Send,
{
    let mut ticker = tokio::time::interval(interval);
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let result = sweep(storage.as_ref()).await;
                info!("sweep done, {} records removed", result.total());
            },
            _ = &mut shutdown => {
                break;
            }
        }
    }
    info!("sweeper stopped");
}
