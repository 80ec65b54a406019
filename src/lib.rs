//! L3 order book estimator
//!
//! Reconstructs a per-order (L3) view of a limit order book from aggregated
//! (L2) depth updates, clusters the synthetic orders by size for
//! visualization, and fans the reconstruction out to browsers over
//! WebSocket.

use tokio::sync::{watch, RwLock};
use tracing::info;

pub mod config;
pub mod error;
pub mod feed;
pub mod orderbook;
pub mod parser;
pub mod precision;
pub mod server;

pub use config::Config;
pub use error::{L3BookError, Result};
pub use orderbook::{L3Book, L3Level, L3Snapshot, OrderInfo, OrderQueue, QueueMetrics, Side};
pub use parser::{DepthDelta, DepthSnapshot, ParsedMessage};
pub use precision::{PrecisionInfo, PrecisionManager};

/// Application state shared across components
pub struct AppState {
    /// The reconstructed book for the active symbol
    pub book: RwLock<L3Book>,
    pub config: Config,
    pub precision: PrecisionManager,
    /// Active-symbol channel; the feed task resubscribes when it changes
    pub symbol_tx: watch::Sender<String>,
}

impl AppState {
    pub fn new(config: Config, precision: PrecisionManager, book: L3Book) -> Self {
        let (symbol_tx, _) = watch::channel(book.symbol().to_string());
        Self {
            book: RwLock::new(book),
            config,
            precision,
            symbol_tx,
        }
    }

    /// Replace the book with a fresh one for `symbol` and signal the feed
    /// task to resubscribe. Switching to the active symbol is a no-op.
    pub async fn switch_symbol(&self, symbol: &str) {
        {
            let book = self.book.read().await;
            if book.symbol() == symbol {
                return;
            }
        }

        let precision = self.precision.resolve(symbol).await;
        *self.book.write().await = L3Book::new(symbol, precision);
        let _ = self.symbol_tx.send(symbol.to_string());
        info!(symbol, "book rebuilt for new symbol");
    }
}
