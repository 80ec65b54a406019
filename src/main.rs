//! L3 order book estimator
//!
//! Reconstructs per-order queues from an aggregated depth stream and serves
//! the estimated book to browsers over WebSocket.

use std::sync::Arc;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use l3book::config::Config;
use l3book::feed::FeedManager;
use l3book::orderbook::L3Book;
use l3book::precision::PrecisionManager;
use l3book::{server, AppState};

#[derive(Parser, Debug)]
#[command(name = "l3book", about = "L3 order book estimator")]
struct Cli {
    /// Instrument to subscribe to
    #[arg(default_value = "ag2510")]
    symbol: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    info!(symbol = %cli.symbol, "starting L3 order book estimator");

    let config = Config::load()?;

    let precision = PrecisionManager::new(&config.rest_endpoint);
    let initial_precision = precision.resolve(&cli.symbol).await;
    let book = L3Book::new(&cli.symbol, initial_precision);

    let state = Arc::new(AppState::new(config, precision, book));

    // Ingestion task: snapshot + delta stream into the shared book
    let feed_state = state.clone();
    tokio::spawn(async move {
        FeedManager::new(feed_state).run().await;
    });

    let app = server::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&state.config.bind_addr).await?;
    info!(addr = %state.config.bind_addr, "fan-out server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
