pub(crate) mod controllers;
pub(crate) mod core;
pub(crate) mod routes;
pub(crate) mod store;
pub(crate) mod types;
pub(crate) mod workers;

use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::core::config::Args;
use crate::core::error::ConfigError as Error;
use crate::core::state::AppState;
use crate::store::postgres::PgStore;

pub async fn run() -> Result<(), Error> {
    let config = Args::load()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_new(&config.log_level).unwrap_or_default())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = config.lease_settings()?;
    let reconcile_interval = config.reconcile_interval()?;

    let store = PgStore::connect(&config.database_url(), config.database_max_connections)
        .await
        .map_err(Error::Sql)?;

    sqlx::migrate!()
        .run(store.pool())
        .await
        .map_err(Error::DatabaseMigration)?;

    let state = AppState::new(store, settings);

    let (cancel, worker) =
        workers::reconcile::spawn(state.controller.clone(), reconcile_interval);

    let app = routes::router::routes(
        state,
        Duration::from_secs(config.handler_timeout_seconds),
    );

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .map_err(Error::IO)?;

    tracing::info!("listening on port {}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(Error::IO)?;

    cancel.cancel();
    if let Err(e) = worker.await {
        tracing::error!("reconciliation worker did not stop cleanly: {:?}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
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

    tracing::info!("shutting down");
}
