//! eq-gateway - Multi-tenant ingestion gateway service
//!
//! Front door for live audio (WebSocket), uploaded audio files
//! (synchronous and presigned-upload jobs), and raw text notes.

use anyhow::Result;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use eq_gateway::{build_router, config::Config, db, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting eq-gateway");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let pool = db::init_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(pool, config);

    // Recover jobs orphaned by a previous crash before accepting work
    state.worker.reap_stuck_jobs().await;

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{bind_addr}");
    info!("Health check: http://{bind_addr}/health");

    axum::serve(listener, app).await?;

    Ok(())
}
