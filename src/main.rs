//! Server entry point: settings from env, collections from CONFIG_PATH or built-in,
//! store from STORE_BACKEND, then serve until Ctrl-C / SIGTERM.

use hotel_records::{
    app, builtin, ensure_database_exists, load_from_path, resolve, AppState, MemoryStore, PgStore, RecordStore,
    Settings, StoreBackend,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hotel_records=info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    let config = match &settings.config_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading collections");
            load_from_path(path).await?
        }
        None => builtin()?,
    };
    let model = resolve(&config)?;

    let store: Arc<dyn RecordStore> = match settings.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; records are lost on exit");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Postgres => {
            ensure_database_exists(&settings.database_url).await?;
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(settings.db_max_connections)
                .connect(&settings.database_url)
                .await?;
            tracing::info!("database connected");
            Arc::new(PgStore::new(pool))
        }
    };
    store.ensure_schema(&model.collections).await?;

    let state = AppState::new(store, model);
    let listener = TcpListener::bind(settings.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
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
    tracing::info!("shutdown signal received");
}
