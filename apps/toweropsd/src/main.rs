//! towerops reconciliation daemon
//!
//! Wires the Postgres store, the REST tracker client and the
//! reconciliation runner together and loops until terminated.

mod config;
mod logging;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use config::Config;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing::{error, info};
use towerops_db::{migrations, PgStore};
use towerops_reconciliation::{
    EngineConfig, ReconciliationEngine, Runner, RunnerConfig, TrackerCommentNotifier,
};
use towerops_tracker::{RestTrackerClient, RestTrackerConfig, TrackerApi};

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.log_filter);

    let pool = match PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "Failed to connect to the database");
            std::process::exit(1);
        }
    };

    if let Err(e) = migrations::run_migrations(&pool).await {
        error!(error = %e, "Failed to apply migrations");
        std::process::exit(1);
    }

    let store = Arc::new(PgStore::new(pool));

    let mut tracker_config = RestTrackerConfig::new(
        &config.tracker_base_url,
        &config.tracker_org_id,
        &config.tracker_queue,
        &config.tracker_token,
    );
    tracker_config.refresh_url = config.tracker_refresh_url.clone();
    tracker_config.refresh_token = config.tracker_refresh_token.clone();

    let tracker = match RestTrackerClient::new(tracker_config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "Failed to build the tracker client");
            std::process::exit(1);
        }
    };

    // Auth probe before entering the loop, so a bad token fails loudly at
    // startup instead of on the first sweep.
    match tracker.current_user().await {
        Ok(user) => info!(login = %user.login, "Authenticated against the tracker"),
        Err(e) => {
            error!(error = %e, "Tracker authentication failed at startup");
            std::process::exit(1);
        }
    }

    let notifier = Arc::new(TrackerCommentNotifier::new(tracker.clone()));

    let mut engine_config = EngineConfig::new(&config.tracker_queue);
    engine_config.lookback_days = config.lookback_days;

    let engine = ReconciliationEngine::new(store, tracker, notifier, engine_config);

    let runner = Runner::new(
        engine,
        RunnerConfig {
            min_cycle: config.min_cycle,
            ..RunnerConfig::default()
        },
    );

    let stop = runner.stop_flag();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            stop.store(true, Ordering::Relaxed);
        }
    });

    runner.run().await;
    info!("toweropsd exited cleanly");
}
