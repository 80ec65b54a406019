//! L3 order book reconstruction
//!
//! Rebuilds a per-order (L3) view of each price level from aggregated (L2)
//! depth updates. Queues of synthetic orders live under `queue`, the book
//! itself under `book`, the size-clustering pass under `cluster`, and the
//! published snapshot shape under `snapshot`.

mod book;
mod cluster;
pub mod colors;
mod queue;
mod snapshot;

pub use book::L3Book;
pub use cluster::{ClusteredOrder, MiniBatchKMeans};
pub use queue::{OrderInfo, OrderQueue, QueueMetrics};
pub use snapshot::{L3Level, L3Snapshot};

use serde::{Deserialize, Serialize};

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    pub fn is_bid(self) -> bool {
        matches!(self, Side::Bid)
    }
}

/// Current wall-clock time in epoch milliseconds
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
