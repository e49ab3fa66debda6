//! Bounded sample histograms.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Default number of samples kept per histogram.
pub const DEFAULT_HISTOGRAM_CAPACITY: usize = 1000;

/// Distribution statistics derived from the samples currently held.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// A FIFO-evicting sample buffer.
#[derive(Debug, Clone)]
pub struct Histogram {
    capacity: usize,
    samples: VecDeque<f64>,
}

impl Histogram {
    /// Create an empty histogram. A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity.min(DEFAULT_HISTOGRAM_CAPACITY)),
        }
    }

    /// Append a sample, evicting the oldest one when full.
    pub fn record(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Compute statistics over the current samples, `None` when empty.
    pub fn stats(&self) -> Option<HistogramStats> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();

        Some(HistogramStats {
            count,
            min: sorted[0],
            max: sorted[count - 1],
            avg: sum / count as f64,
            p50: nearest_rank(&sorted, 50.0),
            p95: nearest_rank(&sorted, 95.0),
            p99: nearest_rank(&sorted, 99.0),
        })
    }
}

/// Nearest-rank percentile over an ascending, non-empty slice.
///
/// Index is `floor(p / 100 * n)`, clamped to the last element. No interpolation.
pub fn nearest_rank(sorted: &[f64], percentile: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        n => {
            let index = ((percentile / 100.0) * n as f64) as usize;
            sorted[index.min(n - 1)]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_eviction_drops_oldest() {
        let mut histogram = Histogram::new(DEFAULT_HISTOGRAM_CAPACITY);
        for i in 0..=DEFAULT_HISTOGRAM_CAPACITY {
            histogram.record(i as f64);
        }

        let stats = histogram.stats().unwrap();
        assert_eq!(stats.count, DEFAULT_HISTOGRAM_CAPACITY);
        // Sample 0 was the oldest and has been evicted.
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, DEFAULT_HISTOGRAM_CAPACITY as f64);
    }

    #[test]
    fn test_nearest_rank_percentiles() {
        let mut histogram = Histogram::new(100);
        // Insert out of order; stats sort internally.
        for i in (1..=100).rev() {
            histogram.record(i as f64);
        }

        let stats = histogram.stats().unwrap();
        assert_eq!(stats.p50, 51.0);
        assert_eq!(stats.p95, 96.0);
        assert_eq!(stats.p99, 100.0);
        assert_eq!(stats.avg, 50.5);
    }

    #[test]
    fn test_single_sample_and_empty() {
        let mut histogram = Histogram::new(10);
        assert!(histogram.stats().is_none());

        histogram.record(0.25);
        let stats = histogram.stats().unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.p50, 0.25);
        assert_eq!(stats.p99, 0.25);
    }

    #[test]
    fn test_zero_capacity_keeps_one_sample() {
        let mut histogram = Histogram::new(0);
        histogram.record(1.0);
        histogram.record(2.0);
        assert_eq!(histogram.len(), 1);
        assert_eq!(histogram.stats().unwrap().min, 2.0);
    }
}
