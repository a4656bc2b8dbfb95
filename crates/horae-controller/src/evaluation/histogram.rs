//! Decaying exponential-bucket histogram
//!
//! Bucket `i` has upper bound `0.1 * 1.05^i`, capped at 1000.0. Sample
//! weights decay with a 30 day half-life by scaling each incoming weight by
//! `2^((t - t0) / halfLife)` against a reference timestamp, so old samples
//! fade without rescanning them. The reference shifts forward when the
//! exponent grows large enough to threaten overflow.

use chrono::{DateTime, Utc};

/// Largest representable value, in cores
pub const MAX_VALUE: f64 = 1000.0;
/// Upper bound of the first bucket
pub const FIRST_BUCKET_SIZE: f64 = 0.1;
/// Each bucket is 5% larger than the previous one
pub const BUCKET_SIZE_GROWTH: f64 = 1.05;
/// Minimal weight of any sample, prior to the decaying factor
const MIN_SAMPLE_WEIGHT: f64 = 0.1;
/// Minimal total weight kept in a histogram. Small enough that old samples
/// added with the minimal weight are still kept within the window.
pub const EPSILON: f64 = 0.001 * MIN_SAMPLE_WEIGHT;
/// Time for a sample to lose half of its weight
pub const DECAY_HALF_LIFE_SECONDS: i64 = 30 * 24 * 3600;

/// Past this exponent the reference timestamp shifts and all weights are
/// rescaled, keeping decay factors finite
const MAX_DECAY_EXPONENT: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct DecayingHistogram {
    bucket_weights: Vec<f64>,
    total_weight: f64,
    reference_time: Option<DateTime<Utc>>,
}

fn num_buckets() -> usize {
    ((MAX_VALUE / FIRST_BUCKET_SIZE).ln() / BUCKET_SIZE_GROWTH.ln()).ceil() as usize + 1
}

fn find_bucket(value: f64) -> usize {
    if value <= FIRST_BUCKET_SIZE {
        return 0;
    }
    let bucket = ((value / FIRST_BUCKET_SIZE).ln() / BUCKET_SIZE_GROWTH.ln()).ceil() as usize;
    bucket.min(num_buckets() - 1)
}

fn bucket_upper_bound(bucket: usize) -> f64 {
    (FIRST_BUCKET_SIZE * BUCKET_SIZE_GROWTH.powi(bucket as i32)).min(MAX_VALUE)
}

impl Default for DecayingHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl DecayingHistogram {
    pub fn new() -> Self {
        Self {
            bucket_weights: vec![0.0; num_buckets()],
            total_weight: 0.0,
            reference_time: None,
        }
    }

    fn decay_factor(&mut self, t: DateTime<Utc>) -> f64 {
        let reference = *self.reference_time.get_or_insert(t);
        let exponent = (t - reference).num_seconds() as f64 / DECAY_HALF_LIFE_SECONDS as f64;
        if exponent <= MAX_DECAY_EXPONENT {
            return 2f64.powf(exponent);
        }

        // shift the reference to t and rescale everything accumulated so far
        let rescale = 2f64.powf(-exponent);
        for weight in &mut self.bucket_weights {
            *weight *= rescale;
        }
        self.total_weight *= rescale;
        self.reference_time = Some(t);
        1.0
    }

    /// Add a sample of `value` with the given base weight observed at `t`
    pub fn add_sample(&mut self, value: f64, weight: f64, t: DateTime<Utc>) {
        let decayed = weight * self.decay_factor(t);
        self.bucket_weights[find_bucket(value)] += decayed;
        self.total_weight += decayed;
    }

    /// Upper bound of the smallest bucket whose cumulative weight reaches
    /// `p` of the total weight. Zero for an empty histogram.
    pub fn percentile(&self, p: f64) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let threshold = p * self.total_weight;
        let mut cumulative = 0.0;
        for (bucket, weight) in self.bucket_weights.iter().enumerate() {
            cumulative += weight;
            if cumulative >= threshold {
                return bucket_upper_bound(bucket);
            }
        }
        MAX_VALUE
    }

    pub fn is_empty(&self) -> bool {
        self.total_weight < EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_histogram() {
        let h = DecayingHistogram::new();
        assert!(h.is_empty());
        assert_eq!(h.percentile(0.5), 0.0);
    }

    #[test]
    fn test_tiny_weight_stays_empty() {
        let mut h = DecayingHistogram::new();
        h.add_sample(1.0, EPSILON / 10.0, t0());
        assert!(h.is_empty());
    }

    #[test]
    fn test_percentile_returns_bucket_upper_bound() {
        let mut h = DecayingHistogram::new();
        for _ in 0..10 {
            h.add_sample(2.0, 1.0, t0());
        }
        let p = h.percentile(1.0);
        assert!(p >= 2.0 && p < 2.2, "got {}", p);
    }

    #[test]
    fn test_small_values_land_in_first_bucket() {
        let mut h = DecayingHistogram::new();
        h.add_sample(0.05, 1.0, t0());
        assert_eq!(h.percentile(1.0), FIRST_BUCKET_SIZE);
    }

    #[test]
    fn test_values_cap_at_max() {
        let mut h = DecayingHistogram::new();
        h.add_sample(5000.0, 1.0, t0());
        assert_eq!(h.percentile(1.0), MAX_VALUE);
    }

    #[test]
    fn test_load_weighted_percentile_leans_to_spike() {
        // six samples at 2 cores with weights summing to 7, one spike at 10
        // cores with weight 3: p95 crosses inside the spike's bucket
        let mut h = DecayingHistogram::new();
        for _ in 0..5 {
            h.add_sample(2.0, 1.0, t0());
        }
        h.add_sample(2.0, 2.0, t0());
        h.add_sample(10.0, 3.0, t0());

        let p95 = h.percentile(0.95);
        assert!(p95 > 10.0 && p95 < 11.0, "got {}", p95);

        let p50 = h.percentile(0.5);
        assert!(p50 >= 2.0 && p50 < 2.2, "got {}", p50);
    }

    #[test]
    fn test_newer_samples_outweigh_decayed_ones() {
        let mut h = DecayingHistogram::new();
        let half_life = chrono::Duration::seconds(DECAY_HALF_LIFE_SECONDS);
        h.add_sample(1.0, 1.0, t0());
        h.add_sample(10.0, 1.0, t0() + half_life);

        // the newer sample carries twice the effective weight
        let p = h.percentile(0.5);
        assert!(p > 10.0, "got {}", p);
    }

    #[test]
    fn test_reference_shift_keeps_relative_weights() {
        let mut h = DecayingHistogram::new();
        h.add_sample(1.0, 1.0, t0());
        // far enough in the future to force a reference shift
        let far = t0() + chrono::Duration::seconds(DECAY_HALF_LIFE_SECONDS * 150);
        h.add_sample(10.0, 1.0, far);
        assert!(!h.is_empty());
        let p = h.percentile(0.99);
        assert!(p > 10.0, "got {}", p);
    }
}
