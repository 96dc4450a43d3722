//! Gatepass gate server.
//!
//! Serves the scan, registration and admin API over the admission engine.

use anyhow::Context;
use gatepass_core::environment::SystemClock;
use gatepass_core::store::GroupStore;
use gatepass_postgres::PostgresGroupStore;
use gatepass_runtime::{GateEngine, MetricsExporter};
use gatepass_server::config::{Config, StoreBackend, StorageConfig};
use gatepass_testing::InMemoryGroupStore;
use gatepass_web::{AppState, build_router};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Missing .env is fine; the environment may already be set
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gatepass=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Gatepass gate server");

    let config = Config::from_env().context("Invalid configuration")?;
    info!(
        store = ?config.storage.backend,
        timezone = %config.event.timezone,
        event_days = config.event.days.len(),
        capacity_cleanup = config.event.capacity_cleanup,
        "Configuration loaded"
    );

    let mut exporter = MetricsExporter::new();
    exporter.install().context("Failed to install metrics recorder")?;

    let store = open_store(&config.storage).await?;

    let engine = GateEngine::new(store, config.event.calendar())
        .with_registration_policy(config.event.registration_policy())
        .with_retry_policy(config.retry.policy())
        .with_capacity_cleanup(config.event.capacity_cleanup);

    let mut state = AppState::new(Arc::new(engine), Arc::new(SystemClock));
    if let Some(handle) = exporter.handle() {
        state = state.with_metrics(handle.clone());
    }
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, "Server listening");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    tokio::select! {
        joined = &mut server => {
            joined??;
            info!("Server stopped");
            return Ok(());
        }
        () = shutdown_signal() => {}
    }

    let _ = stop_tx.send(());
    match tokio::time::timeout(config.server.shutdown_timeout, server).await {
        Ok(joined) => joined??,
        Err(_) => warn!(
            timeout_secs = config.server.shutdown_timeout.as_secs(),
            "Graceful shutdown timed out, dropping open connections"
        ),
    }

    info!("Server stopped");
    Ok(())
}

async fn open_store(storage: &StorageConfig) -> anyhow::Result<Arc<dyn GroupStore>> {
    match storage.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory group store; registrations are lost on restart");
            Ok(Arc::new(InMemoryGroupStore::new()))
        }
        StoreBackend::Postgres => {
            let url = storage
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres store")?;
            info!("Connecting to group store database...");
            let store = PostgresGroupStore::connect(
                url,
                storage.max_connections,
                storage.connect_timeout,
            )
            .await
            .context("Failed to connect to PostgreSQL")?;
            store.migrate().await.context("Failed to run migrations")?;
            info!("Group store database ready");
            Ok(Arc::new(store))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
