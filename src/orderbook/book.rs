//! The L3 book: price-keyed queues per side, delta reconciliation, pruning
//!
//! Price levels are keyed by the feed's canonical price string, never a
//! normalized numeric form: the exchange treats `"12.30"` and `"12.3"` as
//! distinct level identities and so does the book.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{info, warn};

use super::cluster::MiniBatchKMeans;
use super::now_ms;
use super::queue::OrderQueue;
use super::Side;
use crate::error::{L3BookError, Result};
use crate::parser::{DepthDelta, DepthSnapshot};
use crate::precision::PrecisionInfo;

/// Interval between book-wide queue maintenance sweeps
const OPTIMIZATION_INTERVAL_MS: i64 = 30_000;

/// Valid range for the cluster count
const MAX_CLUSTERS: usize = 20;

pub(super) type SideMap = HashMap<String, Arc<RwLock<OrderQueue>>>;

fn parse_decimal(value: &str) -> Result<Decimal> {
    Decimal::from_str(value).map_err(|_| L3BookError::Parse(value.to_string()))
}

/// L3 reconstruction of one instrument's order book
pub struct L3Book {
    pub(super) bids: SideMap,
    pub(super) asks: SideMap,
    symbol: String,
    last_update_id: u64,
    kmeans_enabled: bool,
    num_clusters: usize,
    precision: PrecisionInfo,
    last_optimization_ms: i64,
    pub(super) bid_clusterer: Mutex<Option<MiniBatchKMeans>>,
    pub(super) ask_clusterer: Mutex<Option<MiniBatchKMeans>>,
}

impl L3Book {
    pub fn new(symbol: &str, precision: PrecisionInfo) -> Self {
        Self {
            bids: HashMap::new(),
            asks: HashMap::new(),
            symbol: symbol.to_string(),
            last_update_id: 0,
            kmeans_enabled: false,
            num_clusters: 10,
            precision,
            last_optimization_ms: now_ms(),
            bid_clusterer: Mutex::new(None),
            ask_clusterer: Mutex::new(None),
        }
    }

    /// Initialize both sides from an L2 snapshot
    ///
    /// Every non-zero level starts as a single synthetic order carrying the
    /// whole aggregate quantity.
    pub fn load_snapshot(&mut self, snapshot: &DepthSnapshot) {
        self.bids.clear();
        self.asks.clear();

        for (price, qty_str) in &snapshot.bids {
            Self::seed_level(&mut self.bids, price, qty_str);
        }
        for (price, qty_str) in &snapshot.asks {
            Self::seed_level(&mut self.asks, price, qty_str);
        }

        self.last_update_id = snapshot.last_update_id;
        info!(
            bid_levels = self.bids.len(),
            ask_levels = self.asks.len(),
            last_update_id = self.last_update_id,
            "L3 book initialized from snapshot"
        );
    }

    fn seed_level(side: &mut SideMap, price: &str, qty_str: &str) {
        let qty = match parse_decimal(qty_str) {
            Ok(q) => q,
            Err(e) => {
                warn!(price, error = %e, "skipping snapshot level");
                return;
            }
        };
        if qty.is_zero() {
            return;
        }

        let mut queue = OrderQueue::new(price);
        queue.add(qty);
        side.insert(price.to_string(), Arc::new(RwLock::new(queue)));
    }

    /// Reconcile one L2 delta against the synthetic queues
    pub fn apply_delta(&mut self, update: &DepthDelta) {
        if update.is_empty() {
            return;
        }

        for (price, qty_str) in &update.bids {
            Self::apply_level(&mut self.bids, price, qty_str);
        }
        // Stale levels above the new best bid mean a crossed book; pruning
        // only runs when the delta actually carried bids.
        if let Some((best_bid, _)) = update.bids.first() {
            Self::prune_side(&mut self.bids, best_bid, Side::Bid);
        }

        for (price, qty_str) in &update.asks {
            Self::apply_level(&mut self.asks, price, qty_str);
        }
        if let Some((best_ask, _)) = update.asks.first() {
            Self::prune_side(&mut self.asks, best_ask, Side::Ask);
        }

        self.last_update_id = self.last_update_id.max(update.last_update_id);

        if now_ms() - self.last_optimization_ms > OPTIMIZATION_INTERVAL_MS {
            self.optimize_all();
        }
    }

    fn apply_level(side: &mut SideMap, price: &str, qty_str: &str) {
        let new_qty = match parse_decimal(qty_str) {
            Ok(q) => q,
            Err(e) => {
                warn!(price, error = %e, "skipping delta level");
                return;
            }
        };

        if new_qty.is_zero() {
            side.remove(price);
            return;
        }

        let Some(queue) = side.get(price) else {
            let mut queue = OrderQueue::new(price);
            queue.add(new_qty);
            side.insert(price.to_string(), Arc::new(RwLock::new(queue)));
            return;
        };

        let mut queue = queue.write();
        let old_qty = queue.total_qty();
        if new_qty > old_qty {
            queue.add(new_qty - old_qty);
        } else if new_qty < old_qty {
            queue.remove_qty(old_qty - new_qty);
        }
    }

    /// Drop levels on the wrong side of the delta's first price: bids
    /// strictly above the new best bid, asks strictly below the new best ask
    fn prune_side(side: &mut SideMap, best_price: &str, book_side: Side) {
        let best = match parse_decimal(best_price) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "skipping prune, unparseable best price");
                return;
            }
        };

        let stale: Vec<String> = side
            .keys()
            .filter(|key| match parse_decimal(key) {
                Ok(level) if book_side.is_bid() => level > best,
                Ok(level) => level < best,
                Err(e) => {
                    warn!(error = %e, "skipping prune of unparseable level key");
                    false
                }
            })
            .cloned()
            .collect();

        for price in stale {
            side.remove(&price);
        }
    }

    /// Sweep every queue on both sides: refresh ages and run maintenance
    fn optimize_all(&mut self) {
        for queue in self.bids.values().chain(self.asks.values()) {
            let mut queue = queue.write();
            queue.update_age();
            queue.optimize();
        }
        self.last_optimization_ms = now_ms();
        info!(
            bid_levels = self.bids.len(),
            ask_levels = self.asks.len(),
            "optimized all queues"
        );
    }

    pub fn set_kmeans_enabled(&mut self, enabled: bool) {
        self.kmeans_enabled = enabled;
    }

    /// Set the cluster count, rejecting values outside `1..=20`
    pub fn set_num_clusters(&mut self, clusters: usize) -> Result<()> {
        if clusters == 0 || clusters > MAX_CLUSTERS {
            return Err(L3BookError::Configuration(clusters));
        }
        self.num_clusters = clusters;
        Ok(())
    }

    pub fn clustering_info(&self) -> (bool, usize) {
        (self.kmeans_enabled, self.num_clusters)
    }

    pub fn kmeans_enabled(&self) -> bool {
        self.kmeans_enabled
    }

    pub fn num_clusters(&self) -> usize {
        self.num_clusters
    }

    pub fn precision(&self) -> &PrecisionInfo {
        &self.precision
    }

    pub fn set_precision(&mut self, precision: PrecisionInfo) {
        self.precision = precision;
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn last_update_id(&self) -> u64 {
        self.last_update_id
    }

    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    /// Aggregate quantity currently at a price level, if present
    pub fn level_qty(&self, side: Side, price: &str) -> Option<Decimal> {
        let map = if side.is_bid() { &self.bids } else { &self.asks };
        map.get(price).map(|queue| queue.read().total_qty())
    }

    /// Individual order quantities at a price level, if present
    pub fn level_orders(&self, side: Side, price: &str) -> Option<Vec<Decimal>> {
        let map = if side.is_bid() { &self.bids } else { &self.asks };
        map.get(price).map(|queue| queue.read().qtys())
    }
}
