//! Mini-batch K-means over synthetic order sizes
//!
//! Clustering runs in a one-dimensional normalized size space. Centroids
//! persist across fits so the partition drifts smoothly between frames, and
//! every fit reseeds its sampler with the same constant: identical input
//! yields identical labels, which keeps the rendered clusters from
//! flickering.

use std::collections::HashMap;

use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::book::SideMap;

/// Fixed sampler seed, reapplied at the start of every fit
const FIT_SEED: u64 = 42;

const DEFAULT_BATCH_SIZE: usize = 1024;
const DEFAULT_MAX_ITER: usize = 1024;

/// An order quantity with its size-cluster assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteredOrder {
    pub qty: Decimal,
    pub cluster: usize,
}

/// Mini-batch K-means state for one book side
#[derive(Debug, Clone)]
pub struct MiniBatchKMeans {
    num_clusters: usize,
    batch_size: usize,
    max_iter: usize,
    /// Centroid positions in normalized `[0, 1]` size space
    centroids: Vec<f64>,
}

impl MiniBatchKMeans {
    pub fn new(num_clusters: usize) -> Self {
        Self {
            num_clusters,
            batch_size: DEFAULT_BATCH_SIZE,
            max_iter: DEFAULT_MAX_ITER,
            centroids: Vec::new(),
        }
    }

    pub fn num_clusters(&self) -> usize {
        self.num_clusters
    }

    /// Rescale points to `[0, 1]`; left untouched when all values coincide
    fn normalize(points: &[f64]) -> Vec<f64> {
        let min = points.iter().copied().fold(f64::INFINITY, f64::min);
        let max = points.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        if range == 0.0 {
            return points.to_vec();
        }
        points.iter().map(|p| (p - min) / range).collect()
    }

    /// Deterministic initialization: evenly spaced picks from the sorted points
    fn initialize_centroids(&mut self, points: &[f64]) {
        let mut sorted = points.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let step = (sorted.len() / self.num_clusters).max(1);
        self.centroids = (0..self.num_clusters)
            .map(|i| sorted[(i * step).min(sorted.len() - 1)])
            .collect();
    }

    fn closest_centroid(&self, point: f64) -> usize {
        let mut min_dist = f64::INFINITY;
        let mut min_idx = 0;
        for (i, c) in self.centroids.iter().enumerate() {
            let dist = (point - c).abs();
            if dist < min_dist {
                min_dist = dist;
                min_idx = i;
            }
        }
        min_idx
    }

    /// Cluster the given sizes, returning one label per input point
    ///
    /// Labels are size-rank stable: label 0 is the smallest-size cluster,
    /// label `k-1` the largest.
    pub fn fit(&mut self, raw_points: &[f64]) -> Vec<usize> {
        if raw_points.is_empty() {
            return Vec::new();
        }

        let points = Self::normalize(raw_points);

        if self.centroids.len() != self.num_clusters {
            self.initialize_centroids(&points);
        }

        let mut rng = StdRng::seed_from_u64(FIT_SEED);
        let batch_size = self.batch_size.min(points.len());

        for _ in 0..self.max_iter {
            let mut counts = vec![0usize; self.num_clusters];
            let mut sums = vec![0f64; self.num_clusters];

            for _ in 0..batch_size {
                let p = points[rng.gen_range(0..points.len())];
                let closest = self.closest_centroid(p);
                sums[closest] += p;
                counts[closest] += 1;
            }

            for i in 0..self.num_clusters {
                if counts[i] > 0 {
                    let lr = 1.0 / counts[i] as f64;
                    let mean = sums[i] / counts[i] as f64;
                    self.centroids[i] = (1.0 - lr) * self.centroids[i] + lr * mean;
                }
            }
        }

        let labels: Vec<usize> = points.iter().map(|&p| self.closest_centroid(p)).collect();
        self.remap_by_size(labels)
    }

    /// Remap labels so cluster 0 holds the smallest centroid, 1 the next, ...
    fn remap_by_size(&self, labels: Vec<usize>) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.num_clusters).collect();
        order.sort_by(|&a, &b| self.centroids[a].total_cmp(&self.centroids[b]));

        let mut label_map = vec![0usize; self.num_clusters];
        for (new_label, &old_label) in order.iter().enumerate() {
            label_map[old_label] = new_label;
        }

        labels.into_iter().map(|l| label_map[l]).collect()
    }
}

/// Cluster every order on one book side by size
///
/// Points and their per-price grouping are collected in a single pass over
/// the side map, so the returned `(qty, label)` lists stay aligned with the
/// fit input regardless of map iteration order. The side's clusterer is
/// created lazily and rebuilt when the requested cluster count changes;
/// otherwise its centroids carry over from the previous fit.
pub(super) fn cluster_side(
    side: &SideMap,
    clusterer: &Mutex<Option<MiniBatchKMeans>>,
    num_clusters: usize,
) -> HashMap<String, Vec<ClusteredOrder>> {
    let mut points: Vec<f64> = Vec::new();
    let mut grouped: Vec<(String, Vec<Decimal>)> = Vec::new();

    for (price, queue) in side {
        let qtys = queue.read().qtys();
        if qtys.is_empty() {
            continue;
        }
        points.extend(qtys.iter().map(|q| q.to_f64().unwrap_or_default()));
        grouped.push((price.clone(), qtys));
    }

    if points.is_empty() {
        return HashMap::new();
    }

    let mut guard = clusterer.lock();
    let kmeans = guard.get_or_insert_with(|| MiniBatchKMeans::new(num_clusters));
    if kmeans.num_clusters() != num_clusters {
        *kmeans = MiniBatchKMeans::new(num_clusters);
    }
    let labels = kmeans.fit(&points);

    let mut clustered = HashMap::with_capacity(grouped.len());
    let mut label_idx = 0;
    for (price, qtys) in grouped {
        let orders = qtys
            .into_iter()
            .map(|qty| {
                let cluster = labels.get(label_idx).copied().unwrap_or(0);
                label_idx += 1;
                ClusteredOrder { qty, cluster }
            })
            .collect();
        clustered.insert(price, orders);
    }

    clustered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::OrderQueue;
    use parking_lot::RwLock;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[test]
    fn test_labels_are_deterministic_and_size_ranked() {
        let points = [1.0, 1.0, 5.0, 5.0, 20.0, 20.0];

        let mut first = MiniBatchKMeans::new(3);
        let labels_a = first.fit(&points);
        let labels_b = first.fit(&points);

        assert_eq!(labels_a, labels_b);
        // Cluster 0 holds the 1s, cluster 2 the 20s
        assert_eq!(labels_a, vec![0, 0, 1, 1, 2, 2]);
    }

    #[test]
    fn test_labels_within_range() {
        let points: Vec<f64> = (1..=50).map(|i| i as f64).collect();
        let mut kmeans = MiniBatchKMeans::new(4);
        for &label in &kmeans.fit(&points) {
            assert!(label < 4);
        }
    }

    #[test]
    fn test_size_rank_monotone_over_points() {
        // A larger point can never land in a smaller-ranked cluster
        let points = [1.0, 2.0, 3.0, 10.0, 11.0, 50.0];
        let mut kmeans = MiniBatchKMeans::new(3);
        let labels = kmeans.fit(&points);

        let mut sorted: Vec<(f64, usize)> =
            points.iter().copied().zip(labels.iter().copied()).collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
        for pair in sorted.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
    }

    #[test]
    fn test_identical_points_skip_normalization() {
        let mut kmeans = MiniBatchKMeans::new(2);
        let labels = kmeans.fit(&[7.0, 7.0, 7.0]);
        assert_eq!(labels.len(), 3);
        assert!(labels.iter().all(|&l| l < 2));
    }

    #[test]
    fn test_empty_input() {
        let mut kmeans = MiniBatchKMeans::new(3);
        assert!(kmeans.fit(&[]).is_empty());
    }

    #[test]
    fn test_more_clusters_than_points() {
        let mut kmeans = MiniBatchKMeans::new(5);
        let labels = kmeans.fit(&[1.0, 100.0]);
        assert_eq!(labels.len(), 2);
        assert!(labels[0] < labels[1]);
    }

    fn side_with(levels: &[(&str, &[Decimal])]) -> SideMap {
        let mut side = SideMap::new();
        for (price, qtys) in levels {
            let mut queue = OrderQueue::new(price);
            for &qty in *qtys {
                queue.add(qty);
            }
            side.insert(price.to_string(), Arc::new(RwLock::new(queue)));
        }
        side
    }

    #[test]
    fn test_cluster_side_aligns_labels_with_queues() {
        let side = side_with(&[
            ("100.0", &[dec!(1), dec!(20)]),
            ("99.0", &[dec!(1), dec!(5)]),
        ]);
        let clusterer = Mutex::new(None);

        let clustered = cluster_side(&side, &clusterer, 3);

        assert_eq!(clustered.len(), 2);
        let level = &clustered["100.0"];
        assert_eq!(level[0].qty, dec!(1));
        assert_eq!(level[1].qty, dec!(20));
        // Size ranking holds within the level
        assert!(level[0].cluster < level[1].cluster);
    }

    #[test]
    fn test_cluster_side_empty_book() {
        let clusterer = Mutex::new(None);
        assert!(cluster_side(&SideMap::new(), &clusterer, 3).is_empty());
    }

    #[test]
    fn test_cluster_side_rebuilds_on_count_change() {
        let side = side_with(&[("100.0", &[dec!(1), dec!(2), dec!(30)])]);
        let clusterer = Mutex::new(None);

        cluster_side(&side, &clusterer, 3);
        assert_eq!(clusterer.lock().as_ref().map(|k| k.num_clusters()), Some(3));

        cluster_side(&side, &clusterer, 2);
        assert_eq!(clusterer.lock().as_ref().map(|k| k.num_clusters()), Some(2));
    }
}
