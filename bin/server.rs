// Subscription Tracker - Web Server
// REST API with Axum over the local SQLite store

use anyhow::{Context, Result};
use rusqlite::Connection;
use subtrack::api::{router, AppState};
use subtrack::config::{init_tracing, Config};
use subtrack::db::{setup_database, verify_count};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config)?;

    let conn = Connection::open(&config.db_path)
        .with_context(|| format!("Failed to open database at {}", config.db_path))?;
    setup_database(&conn).context("Failed to set up database schema")?;

    let count = verify_count(&conn)?;
    tracing::info!(db_path = %config.db_path, subscriptions = count, "database opened");

    let listen_addr = config.listen_addr.clone();
    let app = router(AppState::new(conn, config));

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind to {listen_addr}"))?;

    tracing::info!(addr = %listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
