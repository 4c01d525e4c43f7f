//! Range queries over the store
//!
//! A query names one metric, a time range and a step. Every series of the
//! metric is cut into step-wide windows aligned to multiples of the step, the
//! buckets inside each window are folded together and the requested
//! aggregation is applied. Series are never merged with one another, even when
//! their grouped labels coincide.

use buckets::{Bucket, Series};
use metric::HistogramAccumulator;
use std::collections::BTreeMap;
use store::Store;
use time;

/// How the buckets of a window collapse into one value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Aggregation {
    /// Mean of all observations.
    Avg,
    /// Sum of all observations.
    Sum,
    /// Smallest observation.
    Min,
    /// Largest observation.
    Max,
    /// Number of observations.
    Count,
    /// Most recent observation.
    Last,
    /// Histogram quantile estimate, needs a merged histogram.
    Quantile(f64),
}

impl Default for Aggregation {
    fn default() -> Aggregation {
        Aggregation::Avg
    }
}

impl Aggregation {
    /// Interpret an aggregation name
    ///
    /// Unknown names mean `Avg`. The quantile aliases `p25`, `p50`, `p90` and
    /// `p99` map to their quantiles; any other `p<digits>` alias is treated as
    /// the median.
    pub fn from_name(name: &str) -> Aggregation {
        match name.trim() {
            "avg" => Aggregation::Avg,
            "sum" => Aggregation::Sum,
            "min" => Aggregation::Min,
            "max" => Aggregation::Max,
            "count" => Aggregation::Count,
            "last" => Aggregation::Last,
            "p25" => Aggregation::Quantile(0.25),
            "p50" => Aggregation::Quantile(0.50),
            "p90" => Aggregation::Quantile(0.90),
            "p99" => Aggregation::Quantile(0.99),
            other => {
                let digits = other.trim_start_matches('p');
                if other.starts_with('p') && !digits.is_empty()
                    && digits.chars().all(|c| c.is_ascii_digit())
                {
                    Aggregation::Quantile(0.50)
                } else {
                    Aggregation::Avg
                }
            }
        }
    }

    fn apply(&self, window: &Window) -> Option<f64> {
        if window.count == 0 {
            return None;
        }
        let value = match *self {
            Aggregation::Avg => Some(window.sum / window.count as f64),
            Aggregation::Sum => Some(window.sum),
            Aggregation::Min => window.min,
            Aggregation::Max => window.max,
            Aggregation::Count => Some(window.count as f64),
            Aggregation::Last => window.last,
            Aggregation::Quantile(q) => window.histogram.as_ref().and_then(|h| h.quantile(q)),
        };
        value.filter(|v| v.is_finite())
    }
}

/// The parameters of a range query, as they arrive from a caller
///
/// Time and step parameters stay raw strings. Anything that fails to parse
/// falls back to a default rather than failing the query.
#[derive(Clone, Debug, PartialEq)]
pub struct SeriesQuery {
    /// The metric to query.
    pub metric: String,
    /// Range start, epoch milliseconds or ISO-8601. Defaults to `now - window`.
    pub start: Option<String>,
    /// Range end, epoch milliseconds or ISO-8601. Defaults to `now`.
    pub end: Option<String>,
    /// Window width in milliseconds. Defaults to the store's bucket width.
    pub step: Option<String>,
    /// Label keys to keep in each output series.
    pub group_by: Vec<String>,
    /// Aggregation name, see `Aggregation::from_name`.
    pub agg: Option<String>,
    /// Omit windows without data instead of reporting them as null.
    pub compact: bool,
}

impl SeriesQuery {
    /// A query over `metric` with every other parameter defaulted.
    pub fn new<S>(metric: S) -> SeriesQuery
    where
        S: Into<String>,
    {
        SeriesQuery {
            metric: metric.into(),
            start: None,
            end: None,
            step: None,
            group_by: Vec::new(),
            agg: None,
            compact: true,
        }
    }

    /// Set the range start.
    pub fn start<S: Into<String>>(mut self, start: S) -> SeriesQuery {
        self.start = Some(start.into());
        self
    }

    /// Set the range end.
    pub fn end<S: Into<String>>(mut self, end: S) -> SeriesQuery {
        self.end = Some(end.into());
        self
    }

    /// Set the step.
    pub fn step<S: Into<String>>(mut self, step: S) -> SeriesQuery {
        self.step = Some(step.into());
        self
    }

    /// Set the group-by label keys.
    pub fn group_by<S: Into<String>>(mut self, keys: Vec<S>) -> SeriesQuery {
        self.group_by = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Set the aggregation name.
    pub fn agg<S: Into<String>>(mut self, agg: S) -> SeriesQuery {
        self.agg = Some(agg.into());
        self
    }

    /// Set compaction.
    pub fn compact(mut self, compact: bool) -> SeriesQuery {
        self.compact = compact;
        self
    }
}

/// One output point.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Point {
    /// Window start, ISO-8601.
    pub ts: String,
    /// The aggregated value, null when the window holds no usable data.
    pub value: Option<f64>,
}

/// The points of one underlying series.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SeriesResult {
    /// The series labels projected onto the group-by keys.
    pub labels: BTreeMap<String, String>,
    /// Points in time order.
    pub points: Vec<Point>,
}

/// The answer to a `SeriesQuery`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    /// The queried metric.
    pub metric: String,
    /// Effective range start, ISO-8601.
    pub start: String,
    /// Effective range end, ISO-8601.
    pub end: String,
    /// Effective step in milliseconds.
    pub step_ms: i64,
    /// One entry per matching series.
    pub series: Vec<SeriesResult>,
}

/// Buckets of one window folded together.
#[derive(Debug, Default)]
struct Window {
    count: u64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    last: Option<f64>,
    arrival: u64,
    histogram: Option<HistogramAccumulator>,
}

impl Window {
    fn absorb(&mut self, bucket: &Bucket) {
        if bucket.count == 0 {
            return;
        }
        self.count = self.count.saturating_add(bucket.count);
        self.sum += bucket.sum;
        if let Some(lo) = bucket.min {
            self.min = Some(self.min.map_or(lo, |m| m.min(lo)));
        }
        if let Some(hi) = bucket.max {
            self.max = Some(self.max.map_or(hi, |m| m.max(hi)));
        }
        // buckets are folded in time order, `last` follows arrival order
        if bucket.last.is_some() && (self.last.is_none() || bucket.arrival >= self.arrival) {
            self.last = bucket.last;
            self.arrival = bucket.arrival;
        }
        if let Some(ref incoming) = bucket.histogram {
            let merged = match self.histogram {
                Some(ref mut h) => h.merge(incoming),
                None => {
                    self.histogram = Some(incoming.clone());
                    true
                }
            };
            if !merged {
                trace!(
                    "window histogram bounds mismatch at {}, bucket histogram skipped",
                    bucket.start_ms
                );
            }
        }
    }
}

fn resolve_step(raw: Option<&String>, fallback: i64) -> i64 {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|s| s.is_finite() && *s >= 1.0 && *s < 9.0e15)
        .map(|s| s.floor() as i64)
        .unwrap_or(fallback)
}

fn window_points(
    series: &Series,
    first_ms: i64,
    end_ms: i64,
    step_ms: i64,
    agg: Aggregation,
    compact: bool,
) -> Vec<Point> {
    if end_ms < first_ms {
        return Vec::new();
    }
    let last_window_ms = time::align(end_ms, step_ms);
    let mut windows: BTreeMap<i64, Window> = BTreeMap::new();
    for (start_ms, bucket) in series.range(first_ms, last_window_ms.saturating_add(step_ms)) {
        windows
            .entry(time::align(*start_ms, step_ms))
            .or_insert_with(Window::default)
            .absorb(bucket);
    }

    let mut points = Vec::new();
    if compact {
        for (ts, window) in &windows {
            if let Some(value) = agg.apply(window) {
                points.push(Point {
                    ts: time::format_instant(*ts),
                    value: Some(value),
                });
            }
        }
    } else {
        let mut ts = first_ms;
        while ts <= end_ms {
            points.push(Point {
                ts: time::format_instant(ts),
                value: windows.get(&ts).and_then(|w| agg.apply(w)),
            });
            ts = match ts.checked_add(step_ms) {
                Some(next) => next,
                None => break,
            };
        }
    }
    points
}

impl Store {
    /// Answer a range query
    ///
    /// The range defaults to the retention window ending at `now_ms` and the
    /// step to the bucket width. Windows run from `floor(start / step) * step`
    /// through `end`, each covering `[ts, ts + step)`.
    pub fn query_series(&self, query: &SeriesQuery, now_ms: i64) -> QueryResult {
        let start_ms = query
            .start
            .as_ref()
            .and_then(|s| time::parse_instant(s))
            .unwrap_or_else(|| now_ms.saturating_sub(self.window_ms()));
        let end_ms = query
            .end
            .as_ref()
            .and_then(|s| time::parse_instant(s))
            .unwrap_or(now_ms);
        let step_ms = resolve_step(query.step.as_ref(), self.bucket_size_ms());
        let agg = query
            .agg
            .as_ref()
            .map(|a| Aggregation::from_name(a))
            .unwrap_or_default();
        let first_ms = time::align(start_ms, step_ms);

        let series = self.series_of(&query.metric)
            .map(|series| SeriesResult {
                labels: series.labels().project(&query.group_by),
                points: window_points(series, first_ms, end_ms, step_ms, agg, query.compact),
            })
            .collect();

        QueryResult {
            metric: query.metric.clone(),
            start: time::format_instant(start_ms),
            end: time::format_instant(end_ms),
            step_ms: step_ms,
            series: series,
        }
    }
}
