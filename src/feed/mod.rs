//! Ingestion adapter
//!
//! Owns the lifecycle of the depth subscription: REST snapshot on every
//! (re)connect, delta pump into the book, automatic reconnection with capped
//! exponential backoff, and teardown when the symbol switches.

mod client;

pub use client::FeedClient;

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use crate::error::{L3BookError, Result};
use crate::parser::{DepthSnapshot, ParsedMessage};
use crate::AppState;

/// Maximum backoff delay in milliseconds (60 seconds)
const MAX_BACKOFF_MS: u64 = 60_000;
/// Cooldown period after which reconnect attempts are reset (5 minutes)
const RECONNECT_COOLDOWN_SECS: u64 = 300;
/// Receive window before the connection is considered stale
const RECV_TIMEOUT: Duration = Duration::from_secs(45);

/// Drives the depth subscription for whichever symbol is active
pub struct FeedManager {
    state: Arc<AppState>,
    symbol_rx: watch::Receiver<String>,
    reconnect_attempts: u32,
    last_successful_connection: Option<Instant>,
}

impl FeedManager {
    pub fn new(state: Arc<AppState>) -> Self {
        let symbol_rx = state.symbol_tx.subscribe();
        Self {
            state,
            symbol_rx,
            reconnect_attempts: 0,
            last_successful_connection: None,
        }
    }

    /// Run indefinitely, reconnecting on error and resubscribing on symbol
    /// switch
    pub async fn run(mut self) {
        info!("starting feed manager");

        loop {
            if let Some(last_success) = self.last_successful_connection {
                if last_success.elapsed() > Duration::from_secs(RECONNECT_COOLDOWN_SECS)
                    && self.reconnect_attempts > 0
                {
                    info!(
                        previous_attempts = self.reconnect_attempts,
                        "resetting reconnect counter after cooldown period"
                    );
                    self.reconnect_attempts = 0;
                }
            }

            let symbol = self.symbol_rx.borrow_and_update().clone();

            match self.connect_and_sync(&symbol).await {
                Ok(()) => {
                    // Clean exit means the symbol changed; pick it up on the
                    // next pass. A closed channel means shutdown.
                    if self.symbol_rx.has_changed().is_err() {
                        info!("symbol channel closed, stopping feed");
                        return;
                    }
                }
                Err(e) => {
                    error!(symbol = %symbol, error = %e, "feed error");
                    self.reconnect_attempts += 1;

                    let base_delay = self.state.config.reconnect_delay_ms
                        * 2u64.pow(self.reconnect_attempts.min(6));
                    let delay = Duration::from_millis(base_delay.min(MAX_BACKOFF_MS));

                    warn!(
                        attempt = self.reconnect_attempts,
                        delay_secs = delay.as_secs(),
                        "reconnecting after error..."
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Connect, resync from a snapshot, and pump deltas until the stream
    /// fails or the symbol switches
    async fn connect_and_sync(&mut self, symbol: &str) -> Result<()> {
        let mut client = FeedClient::new(&self.state.config.ws_endpoint, symbol);
        client.connect().await?;

        self.last_successful_connection = Some(Instant::now());
        self.reconnect_attempts = 0;

        let snapshot = self.fetch_snapshot(symbol).await?;
        self.state.book.write().await.load_snapshot(&snapshot);

        let mut last_message = Instant::now();

        loop {
            tokio::select! {
                changed = self.symbol_rx.changed() => {
                    if changed.is_ok() {
                        info!(symbol, "symbol switched, dropping depth stream");
                    }
                    client.close().await;
                    return Ok(());
                }
                result = timeout(RECV_TIMEOUT, client.next_text()) => match result {
                    Ok(Ok(text)) => {
                        last_message = Instant::now();
                        self.process_message(&text).await;
                    }
                    Ok(Err(e)) => return Err(e),
                    Err(_) => {
                        warn!(
                            last_message_secs = last_message.elapsed().as_secs(),
                            "no message received within timeout, sending keepalive"
                        );
                        if client.ping().await.is_err() {
                            return Err(L3BookError::ConnectionTimeout);
                        }
                    }
                }
            }
        }
    }

    /// Fetch the initial depth snapshot over REST
    async fn fetch_snapshot(&self, symbol: &str) -> Result<DepthSnapshot> {
        let url = format!(
            "{}/depth?symbol={}&limit={}",
            self.state.config.rest_endpoint,
            symbol.to_uppercase(),
            self.state.config.snapshot_depth
        );

        info!(symbol, url = %url, "fetching depth snapshot");

        let snapshot = reqwest::Client::new()
            .get(&url)
            .send()
            .await?
            .json::<DepthSnapshot>()
            .await?;

        Ok(snapshot)
    }

    /// Apply one raw stream message to the book
    async fn process_message(&self, raw: &str) {
        match ParsedMessage::parse(raw) {
            Ok(ParsedMessage::Depth(delta)) => {
                self.state.book.write().await.apply_delta(&delta);
            }
            Ok(ParsedMessage::Unknown(msg)) => {
                tracing::trace!(msg = %msg, "unknown message type");
            }
            Err(e) => {
                warn!(error = %e, "failed to parse stream message");
            }
        }
    }
}
