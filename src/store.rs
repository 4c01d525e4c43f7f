//! The time series store
//!
//! `Store` owns every series, their buckets and the metric catalog. It is
//! created once with a fixed retention window and bucket width and mutated by
//! each `ingest`. Nothing here is shared or synchronized; callers that serve
//! requests from several threads wrap the store in a lock and hold it for the
//! whole of each call.

use buckets::Series;
use metric::{self, MetricRecord, SeriesKey};
use std::collections::{BTreeMap, BTreeSet};
use time;

/// One entry of the metric catalog listing.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricListing {
    /// The metric name.
    pub metric: String,
    /// Every label key ever observed for the metric, sorted.
    pub labels: Vec<String>,
}

/// In-memory, windowed time series storage.
#[derive(Debug)]
pub struct Store {
    window_ms: i64,
    bucket_size_ms: i64,
    series: BTreeMap<SeriesKey, Series>,
    catalog: BTreeMap<String, BTreeSet<String>>,
    arrivals: u64,
}

impl Store {
    /// Create an empty store
    ///
    /// `window_ms` is the retention window, `bucket_size_ms` the width of every
    /// bucket. A non-positive bucket width is clamped to one millisecond.
    pub fn new(window_ms: i64, bucket_size_ms: i64) -> Store {
        Store {
            window_ms: window_ms.max(0),
            bucket_size_ms: bucket_size_ms.max(1),
            series: BTreeMap::new(),
            catalog: BTreeMap::new(),
            arrivals: 0,
        }
    }

    /// The retention window in milliseconds.
    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    /// The bucket width in milliseconds.
    pub fn bucket_size_ms(&self) -> i64 {
        self.bucket_size_ms
    }

    /// Number of series ever created. Series emptied by eviction still count.
    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    /// Number of live buckets across all series.
    pub fn bucket_count(&self) -> usize {
        self.series.values().map(|s| s.len()).sum()
    }

    /// Ingest a batch of records
    ///
    /// Each record lands in the bucket its timestamp aligns to, `now_ms` when
    /// it carries none. Records that cannot be stored are dropped without
    /// error: an empty metric name, a value that is not a finite number, an
    /// empty histogram, or a histogram whose bounds disagree with the one
    /// already in its bucket. Eviction runs once the batch is applied.
    ///
    /// Returns the number of records stored.
    pub fn ingest<I>(&mut self, records: I, now_ms: i64) -> usize
    where
        I: IntoIterator<Item = MetricRecord>,
    {
        let mut accepted = 0;
        for record in records {
            if self.insert(&record, now_ms) {
                accepted += 1;
            }
        }
        let evicted = self.evict(now_ms);
        trace!(
            "ingest accepted {} records, evicted {} buckets, {} series live",
            accepted,
            evicted,
            self.series.len()
        );
        accepted
    }

    fn insert(&mut self, record: &MetricRecord, now_ms: i64) -> bool {
        if record.metric_name.is_empty() {
            debug!("dropping record without a metric name");
            return false;
        }
        if let Some(ref h) = record.histogram {
            if h.count() == 0 {
                debug!("dropping empty histogram for {}", record.metric_name);
                return false;
            }
            if !h.sum().is_finite() {
                debug!(
                    "dropping histogram with sum {} for {}",
                    h.sum(),
                    record.metric_name
                );
                return false;
            }
        }
        if !record.value.is_finite() {
            debug!(
                "dropping non-numeric value {} for {}",
                record.value, record.metric_name
            );
            return false;
        }

        let timestamp_ms = record.timestamp_ms.unwrap_or(now_ms);
        let start_ms = time::align(timestamp_ms, self.bucket_size_ms);
        let tags = record.tags();
        let key = metric::series_key(&record.metric_name, &tags);
        let arrival = self.arrivals + 1;

        let stored = {
            let series = self.series
                .entry(key)
                .or_insert_with(|| Series::new(record.metric_name.clone(), tags.clone()));
            let bucket = series.bucket_mut(start_ms);
            let stored = match record.histogram {
                Some(ref h) => bucket.add_histogram(h, record.min, record.max),
                None => {
                    bucket.add_value(record.value);
                    true
                }
            };
            if stored {
                bucket.arrival = arrival;
            }
            stored
        };
        if !stored {
            debug!(
                "histogram bounds mismatch for {}{{{}}} at {}, discarding",
                record.metric_name, tags, start_ms
            );
            return false;
        }
        self.arrivals = arrival;

        let known = self.catalog
            .entry(record.metric_name.clone())
            .or_insert_with(BTreeSet::new);
        for key in tags.keys() {
            if !known.contains(key) {
                known.insert(key.clone());
            }
        }
        true
    }

    /// Drop every bucket older than the retention window
    ///
    /// Buckets starting before `now_ms - window_ms` go. Series left without
    /// buckets are kept. Returns the number of buckets evicted.
    pub fn evict(&mut self, now_ms: i64) -> usize {
        let cutoff_ms = now_ms.saturating_sub(self.window_ms);
        self.series
            .values_mut()
            .map(|series| series.evict(cutoff_ms))
            .sum()
    }

    /// List every metric seen and the label keys observed for it.
    pub fn list_metrics(&self) -> Vec<MetricListing> {
        self.catalog
            .iter()
            .map(|(name, keys)| MetricListing {
                metric: name.clone(),
                labels: keys.iter().cloned().collect(),
            })
            .collect()
    }

    /// Iterate the series of one metric, in series key order.
    pub fn series_of<'a>(&'a self, metric_name: &'a str) -> impl Iterator<Item = &'a Series> + 'a {
        self.series
            .values()
            .filter(move |series| series.metric_name() == metric_name)
    }
}
