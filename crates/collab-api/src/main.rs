//! # collab-api — Binary Entry Point
//!
//! Reads configuration from the environment, connects the optional
//! database, hydrates the stores and serves the API.

use std::time::Duration;

use anyhow::Context;
use collab_api::state::{AppConfig, AppState, LogFormat};
use collab_core::Timestamp;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(config.log_format);
    tracing::info!(config = ?config, "starting collab-api");

    // Absent DATABASE_URL means in-memory only.
    let db_pool =
        collab_api::db::init_pool(config.database_url.as_deref(), config.db_max_connections)
            .await
            .map_err(|e| {
                tracing::error!("Database initialization failed: {e}");
                e
            })?;

    let port = config.port;
    let sweep_secs = config.expiry_sweep_secs;
    let state =
        AppState::try_with_config(config, db_pool).context("building application state")?;

    state.hydrate_from_db().await.map_err(|e| {
        tracing::error!("Database hydration failed: {e}");
        anyhow::anyhow!(e)
    })?;

    if let Some(secs) = sweep_secs {
        spawn_expiry_sweep(state.clone(), Duration::from_secs(secs.max(1)));
    }

    let app = collab_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("collab-api listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Persist lazily-expired records on a fixed interval. Readers never
/// depend on this; it only keeps stored statuses current.
fn spawn_expiry_sweep(state: AppState, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let expired = collab_api::proposals::expire_due(&state, Timestamp::now()).await;
            if expired > 0 {
                tracing::info!(expired, "expiry sweep persisted expired collaborations");
            }
        }
    });
}
