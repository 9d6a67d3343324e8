mod config;
mod errors;
mod feed;
mod models;
mod routes;
mod source;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::feed::FeedController;
use crate::routes::build_router;
use crate::source::postgrest::PostgrestClient;
use crate::source::{RecordSource, SocialStatsSource};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting feed API v{}", env!("CARGO_PKG_VERSION"));

    // One client serves both the record pages and the engagement counters
    let backend = Arc::new(PostgrestClient::new(
        &config.supabase_url,
        config.supabase_anon_key.clone(),
    )?);
    info!("Backend client initialized ({})", config.supabase_url);

    info!(
        "Feed settings: page size {}, cooldown {}ms, safety timeout {}ms",
        config.feed.page_size,
        config.feed.refresh.cooldown.as_millis(),
        config.feed.refresh.safety_timeout.as_millis()
    );
    let records: Arc<dyn RecordSource> = backend.clone();
    let stats: Arc<dyn SocialStatsSource> = backend;
    let (feed, _controller) = FeedController::spawn(records, Some(stats), config.feed.clone());

    let app = build_router(AppState { feed })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
