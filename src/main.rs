use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use field_sync::api;
use field_sync::api::grpc::GrpcRemote;
use field_sync::config::Config;
use field_sync::engine::connectivity::{probe_target, run_connectivity_probe};
use field_sync::engine::gps::NoGps;
use field_sync::engine::store::FileStore;
use field_sync::engine::sync::run_sync_loop;
use field_sync::error::AppError;
use field_sync::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.compact().init();
    }

    let store = Arc::new(FileStore::open(&config.queue_dir)?);
    let remote = Arc::new(GrpcRemote::connect_lazy(
        &config.remote_endpoint,
        config.submit_timeout,
    )?);

    // Fixes arrive with each request from the device UI; without one the
    // transition is recorded fix-less.
    let app_state = AppState::new(&config, store, remote, Arc::new(NoGps));
    let shared_state = Arc::new(app_state);

    tracing::info!(
        pending_actions = shared_state.queue.len(),
        online = shared_state.network.is_online(),
        remote = %config.remote_endpoint,
        "field sync engine started"
    );

    let app = api::rest::router(shared_state.clone());

    tokio::spawn(run_sync_loop(
        shared_state.clone(),
        config.sync_retry_interval,
    ));

    let probe = probe_target(&config.remote_endpoint)?;
    tokio::spawn(run_connectivity_probe(
        shared_state.monitor.clone(),
        probe,
        config.connectivity_probe_interval,
    ));

    let startup_state = shared_state.clone();
    tokio::spawn(async move {
        startup_state.sync.drain().await;
    });

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
