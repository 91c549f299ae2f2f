mod error;
mod routes;

use std::sync::Arc;

use anyhow::{Context, Result};
use tanya_core::config::TanyaConfig;
use tanya_core::storage::{self, Storage};

pub struct AppState {
    pub storage: Storage,
    pub config: TanyaConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tanya_web=info,tanya_core=info,tower_http=info".into()),
        )
        .init();

    let cwd = std::env::current_dir().ok();
    let config = TanyaConfig::load(cwd.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("failed to load config, using defaults: {e}");
        TanyaConfig::default_config()
    });

    let storage = storage::create_backend(&config)
        .await
        .context("failed to open conversation store")?;
    let info = storage.info().await;
    tracing::info!(backend = info.backend, location = %info.location, "storage ready");

    let addr = format!("{}:{}", config.web.host, config.web.port);
    let state = Arc::new(AppState { storage, config });

    let app = routes::router()
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    tracing::info!("tanya-web listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
