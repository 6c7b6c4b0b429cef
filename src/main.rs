use crate::config::Config;
use crate::startup::{AppState, router, session_layer};
use std::future::IntoFuture;
use tower_sessions::MemoryStore;
use tower_sessions_sqlx_store::PostgresStore;
use tracing_subscriber::EnvFilter;

#[macro_use]
extern crate tracing;

mod admin;
mod auth;
mod config;
mod db;
mod error;
mod proxy;
mod session;
mod sse;
mod startup;
mod subjects;
mod tally;
mod voting;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;
    let listen_addr = config.listen_addr;
    let inactivity_secs = config.session_inactivity_secs;

    let app_state = AppState::new(config).await?;
    let coordinator = app_state.coordinator.clone();

    let app = match app_state.db.clone() {
        Some(pool) => {
            let session_store = PostgresStore::new(pool);
            session_store.migrate().await?;
            router(app_state).layer(session_layer(session_store, inactivity_secs))
        }
        None => router(app_state).layer(session_layer(MemoryStore::default(), inactivity_secs)),
    };

    info!("listening on {listen_addr}");
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;

    // SSE clients never hang up on their own, so shutdown does not wait for
    // open connections to drain.
    tokio::select! {
        served = axum::serve(listener, app).into_future() => served?,
        _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
    }

    coordinator.shutdown().await;
    info!("coordinator stopped");
    Ok(())
}
