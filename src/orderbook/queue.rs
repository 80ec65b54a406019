//! Synthetic order queue for a single price level
//!
//! The feed only reports aggregate quantity per price, so the queue holds
//! synthetic orders and reconciles each aggregate change against three
//! plausible per-order causes: an exact cancellation (scanned back to front,
//! since cancels tend to come from recently posted orders), a large fill
//! eating the largest resting order, or a small fill consumed in FIFO
//! priority order.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::now_ms;

/// One synthetic order resting in a queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderInfo {
    /// Synthetic order ID, unique and increasing within its queue
    pub id: u64,
    /// Remaining quantity, always positive
    pub qty: Decimal,
    /// Creation time in epoch milliseconds
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    /// Milliseconds since creation, refreshed on demand
    #[serde(rename = "age")]
    pub age_ms: i64,
    /// Set once any portion has been removed from this order
    pub is_partial: bool,
}

/// Aggregate statistics for one queue
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueMetrics {
    pub total_orders: usize,
    pub total_qty: Decimal,
    pub avg_order_size: Decimal,
    pub max_order_size: Decimal,
    pub min_order_size: Decimal,
    pub avg_age_ms: f64,
    pub oldest_age_ms: i64,
    pub partial_orders: usize,
    pub last_update: i64,
}

/// FIFO queue of synthetic orders at one price level
///
/// Invariants held across every operation: `total_qty` equals the sum of
/// member quantities, and no member has zero quantity.
#[derive(Debug, Clone)]
pub struct OrderQueue {
    /// Orders in FIFO insertion order, front = oldest
    orders: Vec<OrderInfo>,
    /// Cached sum of member quantities
    total_qty: Decimal,
    /// Next synthetic order ID
    next_id: u64,
    /// Price level this queue represents
    price_level: String,
    /// Last mutation timestamp
    last_update_ms: i64,
}

impl OrderQueue {
    pub fn new(price_level: &str) -> Self {
        Self {
            orders: Vec::new(),
            total_qty: Decimal::ZERO,
            next_id: 1,
            price_level: price_level.to_string(),
            last_update_ms: now_ms(),
        }
    }

    /// Append a new synthetic order to the back of the queue
    pub fn add(&mut self, qty: Decimal) {
        let now = now_ms();
        self.orders.push(OrderInfo {
            id: self.next_id,
            qty,
            timestamp_ms: now,
            age_ms: 0,
            is_partial: false,
        });
        self.next_id += 1;
        self.total_qty += qty;
        self.last_update_ms = now;
    }

    /// Remove `diff` from the queue, inferring which orders it came from
    pub fn remove_qty(&mut self, diff: Decimal) {
        if diff <= Decimal::ZERO {
            return;
        }

        // Exact-match cancellation: newest first
        for i in (0..self.orders.len()).rev() {
            if self.orders[i].qty == diff {
                self.total_qty -= diff;
                self.orders.remove(i);
                self.last_update_ms = now_ms();
                return;
            }
        }

        let mut remaining = diff;
        if remaining > self.largest_qty() / Decimal::TWO {
            self.remove_from_largest(&mut remaining);
        } else {
            self.remove_fifo(&mut remaining);
        }

        self.last_update_ms = now_ms();
    }

    /// Consume whole orders from the front; the first order larger than the
    /// remainder absorbs it as a partial fill
    fn remove_fifo(&mut self, remaining: &mut Decimal) {
        let mut i = 0;
        while i < self.orders.len() && *remaining > Decimal::ZERO {
            if self.orders[i].qty <= *remaining {
                *remaining -= self.orders[i].qty;
                self.total_qty -= self.orders[i].qty;
                self.orders.remove(i);
                // Index stays put: the next order shifted into this slot
            } else {
                self.orders[i].qty -= *remaining;
                self.orders[i].is_partial = true;
                self.total_qty -= *remaining;
                *remaining = Decimal::ZERO;
                i += 1;
            }
        }
    }

    /// Consume from the largest resting order first, repeating until the
    /// remainder is gone or the queue empties
    fn remove_from_largest(&mut self, remaining: &mut Decimal) {
        while *remaining > Decimal::ZERO && !self.orders.is_empty() {
            let Some(idx) = self.largest_index() else {
                break;
            };

            if self.orders[idx].qty <= *remaining {
                *remaining -= self.orders[idx].qty;
                self.total_qty -= self.orders[idx].qty;
                self.orders.remove(idx);
            } else {
                self.orders[idx].qty -= *remaining;
                self.orders[idx].is_partial = true;
                self.total_qty -= *remaining;
                *remaining = Decimal::ZERO;
            }
        }
    }

    /// Index of the largest order, first occurrence on ties
    fn largest_index(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, order) in self.orders.iter().enumerate() {
            match best {
                Some(b) if self.orders[b].qty >= order.qty => {}
                _ => best = Some(i),
            }
        }
        best
    }

    fn largest_qty(&self) -> Decimal {
        self.largest_index()
            .map(|i| self.orders[i].qty)
            .unwrap_or(Decimal::ZERO)
    }

    /// Refresh the derived age of every order
    pub fn update_age(&mut self) {
        let now = now_ms();
        for order in &mut self.orders {
            order.age_ms = now - order.timestamp_ms;
        }
    }

    /// Queue maintenance: drop zero-qty orders, recompute the cached total,
    /// and restore timestamp order after heuristic rearrangement
    pub fn optimize(&mut self) {
        self.orders.retain(|order| order.qty > Decimal::ZERO);
        self.total_qty = self.orders.iter().map(|o| o.qty).sum();
        self.orders.sort_by_key(|o| o.timestamp_ms);
        self.last_update_ms = now_ms();
    }

    /// Deep copy of the order sequence
    pub fn get_orders(&self) -> Vec<OrderInfo> {
        self.orders.clone()
    }

    /// Member quantities in queue order, skipping any zero entries
    pub fn qtys(&self) -> Vec<Decimal> {
        self.orders
            .iter()
            .filter(|o| o.qty > Decimal::ZERO)
            .map(|o| o.qty)
            .collect()
    }

    pub fn total_qty(&self) -> Decimal {
        self.total_qty
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn price_level(&self) -> &str {
        &self.price_level
    }

    /// Comprehensive queue statistics
    pub fn metrics(&self) -> QueueMetrics {
        let mut metrics = QueueMetrics {
            total_orders: self.orders.len(),
            total_qty: self.total_qty,
            last_update: self.last_update_ms,
            ..QueueMetrics::default()
        };

        if self.orders.is_empty() {
            return metrics;
        }

        let now = now_ms();
        let mut total_age = 0i64;
        let mut oldest_age = now - self.orders[0].timestamp_ms;
        let mut min_qty = self.orders[0].qty;
        let mut max_qty = self.orders[0].qty;
        let mut partial_count = 0usize;

        for order in &self.orders {
            let age = now - order.timestamp_ms;
            total_age += age;
            oldest_age = oldest_age.max(age);
            min_qty = min_qty.min(order.qty);
            max_qty = max_qty.max(order.qty);
            if order.is_partial {
                partial_count += 1;
            }
        }

        metrics.avg_order_size = self.total_qty / Decimal::from(self.orders.len() as u64);
        metrics.max_order_size = max_qty;
        metrics.min_order_size = min_qty;
        metrics.avg_age_ms = total_age as f64 / self.orders.len() as f64;
        metrics.oldest_age_ms = oldest_age;
        metrics.partial_orders = partial_count;

        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn queue_with(qtys: &[Decimal]) -> OrderQueue {
        let mut queue = OrderQueue::new("100.0");
        for &qty in qtys {
            queue.add(qty);
        }
        queue
    }

    fn assert_total_invariant(queue: &OrderQueue) {
        let sum: Decimal = queue.get_orders().iter().map(|o| o.qty).sum();
        assert_eq!(queue.total_qty(), sum);
        assert!(queue.get_orders().iter().all(|o| o.qty > Decimal::ZERO));
    }

    #[test]
    fn test_add_is_fifo() {
        let queue = queue_with(&[dec!(5), dec!(3)]);
        let orders = queue.get_orders();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].qty, dec!(5));
        assert_eq!(orders[1].qty, dec!(3));
        assert_eq!(orders[0].id, 1);
        assert_eq!(orders[1].id, 2);
        assert_eq!(queue.total_qty(), dec!(8));
        assert_total_invariant(&queue);
    }

    #[test]
    fn test_exact_match_removes_newest_first() {
        // Both orders match the diff; the back-scan must take the newest
        let mut queue = queue_with(&[dec!(3), dec!(5), dec!(3)]);
        queue.remove_qty(dec!(3));
        let orders = queue.get_orders();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].id, 1);
        assert_eq!(orders[1].id, 2);
        assert_eq!(queue.total_qty(), dec!(8));
        assert_total_invariant(&queue);
    }

    #[test]
    fn test_large_fill_hits_largest() {
        // diff=8 > largest(10)/2 -> largest-first, 10 shrinks to 2
        let mut queue = queue_with(&[dec!(2), dec!(10), dec!(3)]);
        queue.remove_qty(dec!(8));
        let orders = queue.get_orders();
        assert_eq!(
            orders.iter().map(|o| o.qty).collect::<Vec<_>>(),
            vec![dec!(2), dec!(2), dec!(3)]
        );
        assert!(orders[1].is_partial);
        assert!(!orders[0].is_partial);
        assert_eq!(queue.total_qty(), dec!(7));
        assert_total_invariant(&queue);
    }

    #[test]
    fn test_small_fill_consumes_front() {
        // diff=2 <= largest(10)/2 -> FIFO, front order absorbs it
        let mut queue = queue_with(&[dec!(4), dec!(10), dec!(3)]);
        queue.remove_qty(dec!(2));
        let orders = queue.get_orders();
        assert_eq!(
            orders.iter().map(|o| o.qty).collect::<Vec<_>>(),
            vec![dec!(2), dec!(10), dec!(3)]
        );
        assert!(orders[0].is_partial);
        assert_eq!(queue.total_qty(), dec!(15));
        assert_total_invariant(&queue);
    }

    #[test]
    fn test_fifo_consumes_whole_orders_then_remainder() {
        let mut queue = queue_with(&[dec!(1), dec!(1), dec!(10)]);
        // diff=3: no exact match, 3 <= 10/2 -> FIFO eats both 1s, 10 -> 9
        queue.remove_qty(dec!(3));
        let orders = queue.get_orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].qty, dec!(9));
        assert!(orders[0].is_partial);
        assert_total_invariant(&queue);
    }

    #[test]
    fn test_largest_first_spans_multiple_orders() {
        let mut queue = queue_with(&[dec!(6), dec!(5), dec!(2)]);
        // diff=9: no exact match, 9 > 6/2 -> removes 6 entirely, then 5 -> 2
        queue.remove_qty(dec!(9));
        let orders = queue.get_orders();
        assert_eq!(
            orders.iter().map(|o| o.qty).collect::<Vec<_>>(),
            vec![dec!(2), dec!(2)]
        );
        assert!(orders[0].is_partial);
        assert_eq!(queue.total_qty(), dec!(4));
        assert_total_invariant(&queue);
    }

    #[test]
    fn test_largest_first_ties_take_first_occurrence() {
        let mut queue = queue_with(&[dec!(7), dec!(7), dec!(1)]);
        // diff=4 > 7/2, no exact match; the first 7 shrinks
        queue.remove_qty(dec!(4));
        let orders = queue.get_orders();
        assert_eq!(orders[0].qty, dec!(3));
        assert!(orders[0].is_partial);
        assert_eq!(orders[1].qty, dec!(7));
        assert!(!orders[1].is_partial);
        assert_total_invariant(&queue);
    }

    #[test]
    fn test_remove_more_than_total_drains_queue() {
        let mut queue = queue_with(&[dec!(2), dec!(3)]);
        queue.remove_qty(dec!(10));
        assert_eq!(queue.order_count(), 0);
        assert_eq!(queue.total_qty(), Decimal::ZERO);
    }

    #[test]
    fn test_remove_nonpositive_is_noop() {
        let mut queue = queue_with(&[dec!(2)]);
        queue.remove_qty(Decimal::ZERO);
        queue.remove_qty(dec!(-1));
        assert_eq!(queue.total_qty(), dec!(2));
        assert_eq!(queue.order_count(), 1);
    }

    #[test]
    fn test_ids_stay_monotonic_after_removals() {
        let mut queue = queue_with(&[dec!(5), dec!(3)]);
        queue.remove_qty(dec!(3));
        queue.add(dec!(4));
        let orders = queue.get_orders();
        assert_eq!(orders[orders.len() - 1].id, 3);
    }

    #[test]
    fn test_optimize_restores_totals_and_order() {
        let mut queue = queue_with(&[dec!(4), dec!(2), dec!(6)]);
        queue.remove_qty(dec!(5));
        queue.optimize();
        assert_total_invariant(&queue);
        let orders = queue.get_orders();
        for pair in orders.windows(2) {
            assert!(pair[0].timestamp_ms <= pair[1].timestamp_ms);
        }
    }

    #[test]
    fn test_metrics() {
        let queue = queue_with(&[dec!(2), dec!(10), dec!(3)]);
        let metrics = queue.metrics();
        assert_eq!(metrics.total_orders, 3);
        assert_eq!(metrics.total_qty, dec!(15));
        assert_eq!(metrics.max_order_size, dec!(10));
        assert_eq!(metrics.min_order_size, dec!(2));
        assert_eq!(metrics.avg_order_size, dec!(5));
        assert_eq!(metrics.partial_orders, 0);
    }

    #[test]
    fn test_metrics_counts_partials() {
        let mut queue = queue_with(&[dec!(4), dec!(10)]);
        queue.remove_qty(dec!(1));
        let metrics = queue.metrics();
        assert_eq!(metrics.partial_orders, 1);
    }

    #[test]
    fn test_empty_metrics() {
        let queue = OrderQueue::new("1.0");
        let metrics = queue.metrics();
        assert_eq!(metrics.total_orders, 0);
        assert_eq!(metrics.total_qty, Decimal::ZERO);
    }
}
