//! Serializable top-N view of the reconstructed book

use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;

use super::book::{L3Book, SideMap};
use super::cluster::{cluster_side, ClusteredOrder};
use super::colors;
use super::now_ms;
use super::queue::{OrderInfo, QueueMetrics};
use super::Side;
use crate::precision::PrecisionInfo;

/// One price level in the published snapshot
#[derive(Debug, Clone, Serialize)]
pub struct L3Level {
    pub price: Decimal,
    pub total_size: Decimal,
    pub order_count: usize,
    pub max_order: Decimal,
    pub avg_order: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orders: Option<Vec<Decimal>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clustered_orders: Option<Vec<ClusteredOrder>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_metrics: Option<QueueMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_details: Option<Vec<OrderInfo>>,
}

/// Full published book state
#[derive(Debug, Clone, Serialize)]
pub struct L3Snapshot {
    pub bids: Vec<L3Level>,
    pub asks: Vec<L3Level>,
    pub timestamp: i64,
    pub symbol: String,
    pub kmeans_mode: bool,
    pub num_clusters: usize,
    pub precision: PrecisionInfo,
}

impl L3Book {
    /// Build the top-N view of both sides
    ///
    /// Output is deterministic for a fixed book state and configuration,
    /// apart from the timestamp.
    pub fn build_snapshot(&self, top_levels: usize) -> L3Snapshot {
        let bid_prices = sorted_prices(&self.bids, Side::Bid);
        let ask_prices = sorted_prices(&self.asks, Side::Ask);

        let (clustered_bids, clustered_asks) = if self.kmeans_enabled() {
            (
                Some(cluster_side(
                    &self.bids,
                    &self.bid_clusterer,
                    self.num_clusters(),
                )),
                Some(cluster_side(
                    &self.asks,
                    &self.ask_clusterer,
                    self.num_clusters(),
                )),
            )
        } else {
            (None, None)
        };

        let (max_bid, second_max_bid) = side_max_orders(&self.bids);
        let (max_ask, second_max_ask) = side_max_orders(&self.asks);

        let bids = bid_prices
            .iter()
            .take(top_levels)
            .map(|price| {
                build_level(
                    &self.bids,
                    price,
                    Side::Bid,
                    clustered_bids.as_ref(),
                    max_bid,
                    second_max_bid,
                )
            })
            .collect();

        let asks = ask_prices
            .iter()
            .take(top_levels)
            .map(|price| {
                build_level(
                    &self.asks,
                    price,
                    Side::Ask,
                    clustered_asks.as_ref(),
                    max_ask,
                    second_max_ask,
                )
            })
            .collect();

        L3Snapshot {
            bids,
            asks,
            timestamp: now_ms(),
            symbol: self.symbol().to_string(),
            kmeans_mode: self.kmeans_enabled(),
            num_clusters: self.num_clusters(),
            precision: self.precision().clone(),
        }
    }
}

/// Price keys sorted by parsed value: bids descending, asks ascending
fn sorted_prices(side: &SideMap, book_side: Side) -> Vec<String> {
    let mut prices: Vec<String> = side.keys().cloned().collect();
    prices.sort_by(|a, b| {
        let pa = Decimal::from_str(a).unwrap_or_default();
        let pb = Decimal::from_str(b).unwrap_or_default();
        if book_side.is_bid() {
            pb.cmp(&pa)
        } else {
            pa.cmp(&pb)
        }
    });
    prices
}

/// Side-wide largest and strictly smaller second-largest order quantities
fn side_max_orders(side: &SideMap) -> (Decimal, Decimal) {
    let mut max = Decimal::ZERO;
    let mut second = Decimal::ZERO;
    for queue in side.values() {
        for qty in queue.read().qtys() {
            if qty > max {
                second = max;
                max = qty;
            } else if qty > second && qty != max {
                second = qty;
            }
        }
    }
    (max, second)
}

fn build_level(
    side: &SideMap,
    price: &str,
    book_side: Side,
    clustered: Option<&std::collections::HashMap<String, Vec<ClusteredOrder>>>,
    max_order: Decimal,
    second_max: Decimal,
) -> L3Level {
    let Some(queue) = side.get(price) else {
        // Keys come straight from this map; an absent entry means a bug
        // upstream, so emit an empty level rather than panic.
        return empty_level(price);
    };
    let queue = queue.read();

    let orders = queue.qtys();
    let total_size = queue.total_qty();
    let order_count = queue.order_count();
    let max_in_level = orders.iter().copied().max().unwrap_or(Decimal::ZERO);
    let avg_order = if order_count > 0 {
        total_size / Decimal::from(order_count as u64)
    } else {
        Decimal::ZERO
    };

    let (clustered_orders, level_colors) = match clustered {
        Some(map) => match map.get(price) {
            Some(cluster_list) => {
                let level_colors = colors::clustered_order_colors(
                    cluster_list,
                    book_side,
                    max_order,
                    second_max,
                );
                (Some(cluster_list.clone()), Some(level_colors))
            }
            None => (None, None),
        },
        None => (
            None,
            Some(colors::order_colors(
                &orders, book_side, max_order, second_max,
            )),
        ),
    };

    L3Level {
        price: Decimal::from_str(price).unwrap_or_default(),
        total_size,
        order_count,
        max_order: max_in_level,
        avg_order,
        orders: Some(orders),
        clustered_orders,
        colors: level_colors,
        queue_metrics: Some(queue.metrics()),
        order_details: Some(queue.get_orders()),
    }
}

fn empty_level(price: &str) -> L3Level {
    L3Level {
        price: Decimal::from_str(price).unwrap_or_default(),
        total_size: Decimal::ZERO,
        order_count: 0,
        max_order: Decimal::ZERO,
        avg_order: Decimal::ZERO,
        orders: None,
        clustered_orders: None,
        colors: None,
        queue_metrics: None,
        order_details: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::DepthDelta;
    use crate::precision::PrecisionInfo;
    use rust_decimal_macros::dec;

    fn delta(bids: &[(&str, &str)], asks: &[(&str, &str)]) -> DepthDelta {
        DepthDelta {
            bids: bids
                .iter()
                .map(|(p, q)| (p.to_string(), q.to_string()))
                .collect(),
            asks: asks
                .iter()
                .map(|(p, q)| (p.to_string(), q.to_string()))
                .collect(),
            ..DepthDelta::default()
        }
    }

    fn populated_book() -> L3Book {
        let mut book = L3Book::new("ag2510", PrecisionInfo::defaults("ag2510"));
        book.apply_delta(&delta(
            &[("100.0", "5"), ("99.5", "3"), ("99.0", "8")],
            &[("100.5", "2"), ("101.0", "6")],
        ));
        book
    }

    #[test]
    fn test_sides_are_sorted() {
        let snapshot = populated_book().build_snapshot(10);

        let bid_prices: Vec<Decimal> = snapshot.bids.iter().map(|l| l.price).collect();
        assert_eq!(bid_prices, vec![dec!(100.0), dec!(99.5), dec!(99.0)]);

        let ask_prices: Vec<Decimal> = snapshot.asks.iter().map(|l| l.price).collect();
        assert_eq!(ask_prices, vec![dec!(100.5), dec!(101.0)]);
    }

    #[test]
    fn test_top_n_truncates() {
        let snapshot = populated_book().build_snapshot(2);
        assert_eq!(snapshot.bids.len(), 2);
        assert_eq!(snapshot.asks.len(), 2);
    }

    #[test]
    fn test_level_statistics() {
        let mut book = populated_book();
        // Grow 100.0 to orders [5, 4]
        book.apply_delta(&delta(&[("100.0", "9")], &[]));
        let snapshot = book.build_snapshot(10);

        let level = &snapshot.bids[0];
        assert_eq!(level.price, dec!(100.0));
        assert_eq!(level.total_size, dec!(9));
        assert_eq!(level.order_count, 2);
        assert_eq!(level.max_order, dec!(5));
        assert_eq!(level.avg_order, dec!(4.5));
        assert_eq!(level.orders.as_deref(), Some(&[dec!(5), dec!(4)][..]));
        assert!(level.queue_metrics.is_some());
        assert_eq!(level.order_details.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_side_max_highlighting() {
        let snapshot = populated_book().build_snapshot(10);

        // Bid side: max 8 at 99.0, second 5 at 100.0
        let level_99 = snapshot.bids.iter().find(|l| l.price == dec!(99.0)).unwrap();
        let level_100 = snapshot.bids.iter().find(|l| l.price == dec!(100.0)).unwrap();
        assert_eq!(
            level_99.colors.as_ref().unwrap()[0],
            colors::GOLD.to_hex()
        );
        assert_eq!(
            level_100.colors.as_ref().unwrap()[0],
            colors::DARK_GOLD.to_hex()
        );
    }

    #[test]
    fn test_second_max_never_equals_max() {
        let mut book = L3Book::new("ag2510", PrecisionInfo::defaults("ag2510"));
        // Two equal largest orders on one side, one smaller
        book.apply_delta(&delta(&[("100", "7"), ("99", "7"), ("98", "3")], &[]));
        let snapshot = book.build_snapshot(10);

        // Both 7s paint gold, the 3 paints dark gold
        let hexes: Vec<String> = snapshot
            .bids
            .iter()
            .map(|l| l.colors.as_ref().unwrap()[0].clone())
            .collect();
        assert_eq!(hexes[0], colors::GOLD.to_hex());
        assert_eq!(hexes[1], colors::GOLD.to_hex());
        assert_eq!(hexes[2], colors::DARK_GOLD.to_hex());
    }

    #[test]
    fn test_clustering_disabled_omits_clustered_orders() {
        let snapshot = populated_book().build_snapshot(10);
        assert!(!snapshot.kmeans_mode);
        assert!(snapshot.bids[0].clustered_orders.is_none());
        assert!(snapshot.bids[0].colors.is_some());
    }

    #[test]
    fn test_clustering_enabled_attaches_labels() {
        let mut book = populated_book();
        book.set_kmeans_enabled(true);
        book.set_num_clusters(3).unwrap();
        let snapshot = book.build_snapshot(10);

        assert!(snapshot.kmeans_mode);
        assert_eq!(snapshot.num_clusters, 3);
        for level in snapshot.bids.iter().chain(snapshot.asks.iter()) {
            let clustered = level.clustered_orders.as_ref().unwrap();
            assert_eq!(clustered.len(), level.order_count);
            assert!(clustered.iter().all(|c| c.cluster < 3));
        }
    }

    #[test]
    fn test_snapshot_determinism_modulo_timestamp() {
        let book = populated_book();
        let a = book.build_snapshot(10);
        let b = book.build_snapshot(10);

        // Ages inside queue_metrics are measured against the live clock, so
        // strip them along with the snapshot timestamp before comparing.
        let scrub = |snapshot: &L3Snapshot| {
            let mut value = serde_json::to_value(snapshot).unwrap();
            value["timestamp"] = serde_json::Value::Null;
            for side in ["bids", "asks"] {
                for level in value[side].as_array_mut().unwrap() {
                    level["queue_metrics"] = serde_json::Value::Null;
                }
            }
            value
        };
        assert_eq!(scrub(&a), scrub(&b));
    }

    #[test]
    fn test_empty_book_snapshot() {
        let book = L3Book::new("ag2510", PrecisionInfo::defaults("ag2510"));
        let snapshot = book.build_snapshot(10);
        assert!(snapshot.bids.is_empty());
        assert!(snapshot.asks.is_empty());
        assert_eq!(snapshot.symbol, "ag2510");
    }
}
