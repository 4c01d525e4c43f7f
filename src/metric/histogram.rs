//! Explicit-bound histograms, as carried by OTLP histogram data points.
//!
//! A `HistogramAccumulator` holds `N` ascending explicit bounds and `N + 1`
//! bucket counts: bucket `0` is `(-inf, bounds[0]]`, bucket `i` is
//! `(bounds[i-1], bounds[i]]` and bucket `N` is the overflow `(bounds[N-1],
//! +inf)`. Accumulators only combine when their bounds agree exactly.

use metric::Error;

/// Count, sum and bucketed counts against a fixed set of explicit bounds.
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramAccumulator {
    count: u64,
    sum: f64,
    bucket_counts: Vec<u64>,
    explicit_bounds: Vec<f64>,
}

impl HistogramAccumulator {
    /// Create a new accumulator
    ///
    /// `bucket_counts` must hold exactly one more entry than `explicit_bounds`
    /// and the bounds must be finite and strictly ascending.
    pub fn new(
        count: u64,
        sum: f64,
        bucket_counts: Vec<u64>,
        explicit_bounds: Vec<f64>,
    ) -> Result<HistogramAccumulator, Error> {
        if bucket_counts.len() != explicit_bounds.len() + 1 {
            return Err(Error::BucketCountMismatch {
                bounds: explicit_bounds.len(),
                buckets: bucket_counts.len(),
            });
        }
        if explicit_bounds.iter().any(|b| !b.is_finite())
            || explicit_bounds.windows(2).any(|w| w[0] >= w[1])
        {
            return Err(Error::BoundsNotAscending);
        }
        Ok(HistogramAccumulator {
            count: count,
            sum: sum,
            bucket_counts: bucket_counts,
            explicit_bounds: explicit_bounds,
        })
    }

    /// Total number of observations.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Sum of all observations.
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Per-bucket observation counts, overflow bucket last.
    pub fn bucket_counts(&self) -> &[u64] {
        &self.bucket_counts
    }

    /// The explicit upper bounds of every bucket but the overflow.
    pub fn explicit_bounds(&self) -> &[f64] {
        &self.explicit_bounds
    }

    /// Arithmetic mean of the observations, `None` when empty.
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }

    /// Merge `other` into self
    ///
    /// Succeeds only when both sides share identical explicit bounds. On a
    /// mismatch self is left untouched and `false` is returned; the caller
    /// decides what becomes of the rejected histogram.
    pub fn merge(&mut self, other: &HistogramAccumulator) -> bool {
        if self.explicit_bounds != other.explicit_bounds {
            return false;
        }
        self.count = self.count.saturating_add(other.count);
        self.sum += other.sum;
        for (mine, theirs) in self.bucket_counts.iter_mut().zip(other.bucket_counts.iter()) {
            *mine = mine.saturating_add(*theirs);
        }
        true
    }

    /// Estimate the value at quantile `q`
    ///
    /// Walks the buckets until the running count reaches `count * q` and
    /// reports that bucket's midpoint. The first bucket has no lower bound so
    /// its upper bound stands in; the overflow bucket has no upper bound so the
    /// last explicit bound stands in. No interpolation inside a bucket is
    /// attempted, error is bounded by bucket width.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if self.count == 0 || self.explicit_bounds.is_empty() {
            return None;
        }
        let bounds = &self.explicit_bounds;
        let last_bound = bounds[bounds.len() - 1];
        let target = self.count as f64 * q;

        let mut running: u64 = 0;
        for (idx, cnt) in self.bucket_counts.iter().enumerate() {
            running = running.saturating_add(*cnt);
            if running as f64 >= target {
                let estimate = if idx == 0 {
                    bounds[0]
                } else if idx >= bounds.len() {
                    last_bound
                } else {
                    (bounds[idx - 1] + bounds[idx]) / 2.0
                };
                return Some(estimate);
            }
        }
        Some(last_bound)
    }
}
