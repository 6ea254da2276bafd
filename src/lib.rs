use rocket::Config;
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod alert;
pub mod api;
pub mod cli;
pub mod dashboard;
pub mod env;
pub mod error;
pub mod filter;
pub mod journal;
pub mod lifecycle;
pub mod poller;
pub mod preferences;
pub mod slots;
pub mod stats;
pub mod store;
pub mod telemetry;
pub mod transition;

#[cfg(test)]
pub mod test_utils;

pub use dashboard::Dashboard;
pub use env::{Env, LogLevel};

use crate::alert::TerminalBell;
use crate::poller::OrderPoller;

/// Runs the order desk server: HTTP API plus background polling, until
/// Ctrl-C or the server stops.
pub async fn launch(env: Env) -> anyhow::Result<()> {
    let poller_config = env.get_poller_config()?;
    let dashboard = Dashboard::connect(&env, Arc::new(TerminalBell)).await?;

    if let Err(e) = dashboard.refresher.refresh_now().await {
        warn!("Initial order load failed, the poller will retry: {e}");
    }

    let poller = OrderPoller::spawn(dashboard.refresher.clone(), poller_config);

    let config = Config::figment()
        .merge(("port", env.port))
        .merge(("address", "0.0.0.0"));

    let rocket = rocket::custom(config)
        .mount("/", api::routes())
        .manage(dashboard);

    let server_task = tokio::spawn(rocket.launch());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, shutting down gracefully...");
        }

        result = server_task => {
            match result {
                Ok(Ok(_)) => info!("Server completed successfully"),
                Ok(Err(e)) => error!("Server failed: {e}"),
                Err(e) => error!("Server task panicked: {e}"),
            }
        }
    }

    poller.shutdown().await;

    info!("Shutdown complete");
    Ok(())
}
