//! Normalized metric observations and the label machinery that turns them into
//! series identities.

use std::collections::BTreeMap;
use std::error;
use std::fmt;

mod histogram;
mod tagmap;

pub use self::histogram::HistogramAccumulator;

/// The canonical label set of a series: sorted keys, stringified values.
pub type TagMap = self::tagmap::TagMap<String, String>;

/// Attribute mapping as it arrives from a producer, before canonicalization.
pub type Attributes = BTreeMap<String, LabelValue>;

/// Uniquely identifies one series: metric name plus canonical labels.
pub type SeriesKey = String;

/// Errors raised while building metric values.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A histogram needs exactly one more bucket than it has explicit bounds.
    BucketCountMismatch {
        /// Number of explicit bounds supplied.
        bounds: usize,
        /// Number of bucket counts supplied.
        buckets: usize,
    },
    /// Explicit bounds must be finite and strictly ascending.
    BoundsNotAscending,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::BucketCountMismatch { bounds, buckets } => write!(
                f,
                "histogram has {} explicit bounds but {} bucket counts",
                bounds, buckets
            ),
            Error::BoundsNotAscending => {
                f.write_str("histogram explicit bounds are not strictly ascending")
            }
        }
    }
}

impl error::Error for Error {}

/// A scalar attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum LabelValue {
    /// A string value.
    Str(String),
    /// A signed integer value.
    Int(i64),
    /// A floating point value.
    Double(f64),
    /// A boolean value.
    Bool(bool),
}

/// Stringification used for canonical labels. Whole doubles drop their
/// fractional part, `2.0` renders `2`.
impl fmt::Display for LabelValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            LabelValue::Str(ref s) => f.write_str(s),
            LabelValue::Int(i) => write!(f, "{}", i),
            LabelValue::Bool(b) => write!(f, "{}", b),
            LabelValue::Double(d) => {
                if d.is_nan() {
                    f.write_str("NaN")
                } else if d.is_infinite() {
                    f.write_str(if d > 0.0 { "Infinity" } else { "-Infinity" })
                } else if d == 0.0 {
                    f.write_str("0")
                } else {
                    write!(f, "{}", d)
                }
            }
        }
    }
}

impl<'a> From<&'a str> for LabelValue {
    fn from(s: &'a str) -> LabelValue {
        LabelValue::Str(s.to_string())
    }
}

impl From<String> for LabelValue {
    fn from(s: String) -> LabelValue {
        LabelValue::Str(s)
    }
}

impl From<i64> for LabelValue {
    fn from(i: i64) -> LabelValue {
        LabelValue::Int(i)
    }
}

impl From<f64> for LabelValue {
    fn from(d: f64) -> LabelValue {
        LabelValue::Double(d)
    }
}

impl From<bool> for LabelValue {
    fn from(b: bool) -> LabelValue {
        LabelValue::Bool(b)
    }
}

/// Canonicalize an attribute mapping into a label set.
pub fn canonicalize(attributes: &Attributes) -> TagMap {
    let mut tags = TagMap::default();
    for (k, v) in attributes {
        tags.insert(k.clone(), v.to_string());
    }
    tags
}

/// Derive the series key for a metric name and canonical label set.
pub fn series_key(metric_name: &str, tags: &TagMap) -> SeriesKey {
    format!("{}::{}", metric_name, tags)
}

/// The OTLP instrument a record was produced from.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Instantaneous measurement.
    Gauge,
    /// Counter-like accumulation.
    Sum,
    /// Bucketed distribution.
    Histogram,
}

/// One normalized observation.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricRecord {
    /// Name of the metric this observation belongs to.
    pub metric_name: String,
    /// Instrument kind.
    pub kind: MetricKind,
    /// The numeric value. For histograms this is the precomputed mean.
    pub value: f64,
    /// The bucketed distribution, histogram records only.
    pub histogram: Option<HistogramAccumulator>,
    /// Smallest observation reported alongside a histogram, if any.
    pub min: Option<f64>,
    /// Largest observation reported alongside a histogram, if any.
    pub max: Option<f64>,
    /// Milliseconds since the epoch. `None` means "the time of ingestion".
    pub timestamp_ms: Option<i64>,
    /// Data point attributes. These distinguish series.
    pub attributes: Attributes,
    /// Resource attributes. Carried along, never part of series identity.
    pub resource_attributes: Attributes,
}

impl MetricRecord {
    /// Make a gauge record with the given name and value
    ///
    /// The record has no timestamp and no attributes. Use the builder methods
    /// to fill those in.
    pub fn new<S>(name: S, value: f64) -> MetricRecord
    where
        S: Into<String>,
    {
        MetricRecord {
            metric_name: name.into(),
            kind: MetricKind::Gauge,
            value: value,
            histogram: None,
            min: None,
            max: None,
            timestamp_ms: None,
            attributes: Attributes::new(),
            resource_attributes: Attributes::new(),
        }
    }

    /// Mark the record as a gauge.
    pub fn gauge(mut self) -> MetricRecord {
        self.kind = MetricKind::Gauge;
        self
    }

    /// Mark the record as a sum.
    pub fn sum(mut self) -> MetricRecord {
        self.kind = MetricKind::Sum;
        self
    }

    /// Attach a histogram
    ///
    /// The record becomes a histogram record and its value the histogram's
    /// mean, zero if the histogram is empty.
    pub fn histogram(mut self, histogram: HistogramAccumulator) -> MetricRecord {
        self.kind = MetricKind::Histogram;
        self.value = histogram.mean().unwrap_or(0.0);
        self.histogram = Some(histogram);
        self
    }

    /// Set the observed extremes of a histogram record.
    pub fn extremes(mut self, min: Option<f64>, max: Option<f64>) -> MetricRecord {
        self.min = min;
        self.max = max;
        self
    }

    /// Set the timestamp, milliseconds since the epoch.
    pub fn time(mut self, timestamp_ms: i64) -> MetricRecord {
        self.timestamp_ms = Some(timestamp_ms);
        self
    }

    /// Overlay a data point attribute, replacing any previous value.
    pub fn overlay_tag<K, V>(mut self, key: K, val: V) -> MetricRecord
    where
        K: Into<String>,
        V: Into<LabelValue>,
    {
        self.attributes.insert(key.into(), val.into());
        self
    }

    /// Overlay a resource attribute, replacing any previous value.
    pub fn overlay_resource_tag<K, V>(mut self, key: K, val: V) -> MetricRecord
    where
        K: Into<String>,
        V: Into<LabelValue>,
    {
        self.resource_attributes.insert(key.into(), val.into());
        self
    }

    /// The canonical label set of this record's series.
    pub fn tags(&self) -> TagMap {
        canonicalize(&self.attributes)
    }
}
