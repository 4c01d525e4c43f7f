//! Buckets are the primary internal storage type.
//!
//! Each series owns an ordered map of fixed-width buckets keyed by their
//! aligned start time. A bucket folds every observation that lands inside it
//! into running statistics and, for histogram metrics, a merged histogram.

use metric::{HistogramAccumulator, TagMap};
use std::collections::BTreeMap;
use std::collections::btree_map;

/// Running statistics for one fixed-width slice of one series.
#[derive(Clone, Debug, PartialEq)]
pub struct Bucket {
    /// Aligned start of the bucket, milliseconds since the epoch.
    pub start_ms: i64,
    /// Number of observations folded in.
    pub count: u64,
    /// Sum of the observations.
    pub sum: f64,
    /// Smallest observation, `None` until the first arrives.
    pub min: Option<f64>,
    /// Largest observation, `None` until the first arrives.
    pub max: Option<f64>,
    /// Most recently arrived observation.
    pub last: Option<f64>,
    /// Store-wide arrival sequence of the observation behind `last`. Lets a
    /// window spanning several buckets find the latest arrival among them.
    pub arrival: u64,
    /// Merged histogram, histogram metrics only.
    pub histogram: Option<HistogramAccumulator>,
}

impl Bucket {
    /// Create an empty bucket starting at `start_ms`.
    pub fn new(start_ms: i64) -> Bucket {
        Bucket {
            start_ms: start_ms,
            count: 0,
            sum: 0.0,
            min: None,
            max: None,
            last: None,
            arrival: 0,
            histogram: None,
        }
    }

    /// Fold a single numeric observation into the bucket
    ///
    /// `last` follows arrival order, not timestamp order.
    pub fn add_value(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.observe_extremes(value, value);
        self.last = Some(value);
    }

    /// Fold a histogram into the bucket
    ///
    /// The bucket's count and sum grow by the histogram's own count and sum and
    /// `last` becomes the histogram's mean. `min` and `max` take the supplied
    /// extremes, or the mean where the producer reported none. If the bucket
    /// already holds a histogram with different explicit bounds the incoming
    /// histogram is discarded, nothing about the bucket changes and `false` is
    /// returned.
    pub fn add_histogram(
        &mut self,
        histogram: &HistogramAccumulator,
        min: Option<f64>,
        max: Option<f64>,
    ) -> bool {
        match self.histogram {
            Some(ref mut existing) => if !existing.merge(histogram) {
                return false;
            },
            None => self.histogram = Some(histogram.clone()),
        }
        let mean = histogram.mean().unwrap_or(0.0);
        self.count = self.count.saturating_add(histogram.count());
        self.sum += histogram.sum();
        self.observe_extremes(min.unwrap_or(mean), max.unwrap_or(mean));
        self.last = Some(mean);
        true
    }

    fn observe_extremes(&mut self, lo: f64, hi: f64) {
        self.min = Some(self.min.map_or(lo, |m| m.min(lo)));
        self.max = Some(self.max.map_or(hi, |m| m.max(hi)));
    }
}

/// The buckets of one `(metric name, canonical labels)` pair.
#[derive(Clone, Debug)]
pub struct Series {
    metric_name: String,
    labels: TagMap,
    buckets: BTreeMap<i64, Bucket>,
}

impl Series {
    /// Create a series with no buckets.
    pub fn new(metric_name: String, labels: TagMap) -> Series {
        Series {
            metric_name: metric_name,
            labels: labels,
            buckets: BTreeMap::new(),
        }
    }

    /// The metric this series belongs to.
    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    /// The canonical labels of this series.
    pub fn labels(&self) -> &TagMap {
        &self.labels
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// True when eviction has emptied the series.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Get the bucket starting at `start_ms`, creating it if need be.
    pub fn bucket_mut(&mut self, start_ms: i64) -> &mut Bucket {
        self.buckets
            .entry(start_ms)
            .or_insert_with(|| Bucket::new(start_ms))
    }

    /// Look up the bucket starting at `start_ms`.
    pub fn bucket(&self, start_ms: i64) -> Option<&Bucket> {
        self.buckets.get(&start_ms)
    }

    /// Iterate buckets whose start lies in `[from_ms, to_ms)`, oldest first.
    pub fn range(&self, from_ms: i64, to_ms: i64) -> btree_map::Range<i64, Bucket> {
        if to_ms <= from_ms {
            // BTreeMap panics on inverted ranges
            return self.buckets.range(from_ms..from_ms);
        }
        self.buckets.range(from_ms..to_ms)
    }

    /// Drop every bucket starting before `cutoff_ms`, returning how many went.
    pub fn evict(&mut self, cutoff_ms: i64) -> usize {
        let kept = self.buckets.split_off(&cutoff_ms);
        let evicted = self.buckets.len();
        self.buckets = kept;
        evicted
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use quickcheck::{QuickCheck, TestResult};

    fn hist(counts: Vec<u64>, sum: f64) -> HistogramAccumulator {
        let count = counts.iter().sum();
        HistogramAccumulator::new(count, sum, counts, vec![10.0, 20.0, 30.0]).unwrap()
    }

    #[test]
    fn test_add_value_stats() {
        let mut bucket = Bucket::new(0);
        for v in &[10.0, 30.0, 20.0] {
            bucket.add_value(*v);
        }
        assert_eq!(3, bucket.count);
        assert_eq!(60.0, bucket.sum);
        assert_eq!(Some(10.0), bucket.min);
        assert_eq!(Some(30.0), bucket.max);
        // arrival order, not magnitude
        assert_eq!(Some(20.0), bucket.last);
        assert_eq!(None, bucket.histogram);
    }

    #[test]
    fn test_add_histogram_uses_histogram_count() {
        let mut bucket = Bucket::new(0);
        assert!(bucket.add_histogram(&hist(vec![1, 2, 1, 0], 60.0), None, None));
        assert_eq!(4, bucket.count);
        assert_eq!(60.0, bucket.sum);
        assert_eq!(Some(15.0), bucket.last);
        assert_eq!(Some(15.0), bucket.min);

        assert!(bucket.add_histogram(&hist(vec![0, 0, 0, 1], 45.0), Some(45.0), Some(45.0)));
        assert_eq!(5, bucket.count);
        assert_eq!(Some(45.0), bucket.last);
        assert_eq!(Some(45.0), bucket.max);
        assert_eq!(
            &[1, 2, 1, 1],
            bucket.histogram.as_ref().unwrap().bucket_counts()
        );
    }

    #[test]
    fn test_add_histogram_bound_mismatch_is_discarded() {
        let mut bucket = Bucket::new(0);
        assert!(bucket.add_histogram(&hist(vec![1, 0, 0, 0], 5.0), None, None));
        let before = bucket.clone();

        let other = HistogramAccumulator::new(1, 7.0, vec![1, 0], vec![50.0]).unwrap();
        assert!(!bucket.add_histogram(&other, None, None));
        assert_eq!(before, bucket);
    }

    #[test]
    fn test_series_evict_cutoff_is_exclusive() {
        let mut series = Series::new("m".into(), TagMap::default());
        for start in &[0, 5_000, 10_000, 15_000] {
            series.bucket_mut(*start).add_value(1.0);
        }
        assert_eq!(2, series.evict(10_000));
        assert_eq!(2, series.len());
        assert!(series.bucket(5_000).is_none());
        assert!(series.bucket(10_000).is_some());

        assert_eq!(2, series.evict(100_000));
        assert!(series.is_empty());
    }

    #[test]
    fn test_series_range() {
        let mut series = Series::new("m".into(), TagMap::default());
        for start in &[0, 5_000, 10_000] {
            series.bucket_mut(*start).add_value(1.0);
        }
        let starts: Vec<i64> = series.range(0, 10_000).map(|(k, _)| *k).collect();
        assert_eq!(vec![0, 5_000], starts);
        assert_eq!(0, series.range(10_000, 0).count());
    }

    #[test]
    fn test_eviction_never_keeps_stale_buckets() {
        fn inner(starts: Vec<i32>, cutoff: i32) -> TestResult {
            let mut series = Series::new("m".into(), TagMap::default());
            for s in &starts {
                series.bucket_mut(i64::from(*s)).add_value(1.0);
            }
            let before = series.len();
            let evicted = series.evict(i64::from(cutoff));
            assert_eq!(before, evicted + series.len());
            for (start, _) in series.range(i64::from(::std::i32::MIN), i64::from(::std::i32::MAX) + 1) {
                assert!(*start >= i64::from(cutoff));
            }
            TestResult::passed()
        }
        QuickCheck::new()
            .tests(500)
            .quickcheck(inner as fn(Vec<i32>, i32) -> TestResult);
    }
}
