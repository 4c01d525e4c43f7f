//! OTLP/HTTP JSON metrics export decoding.
//!
//! The export body is decoded into lenient serde models, then every data
//! point is normalized into a `MetricRecord`. A body that is not JSON, or not
//! shaped like an export request at all, fails as a whole. Individual data
//! points that cannot be understood are skipped and the rest of the body
//! still goes through.
//!
//! OTLP's JSON mapping encodes 64-bit integers as strings, so every numeric
//! field here accepts either a JSON number or a string holding one.

use metric::{Attributes, HistogramAccumulator, LabelValue, MetricRecord};
use serde_json::{self, Value};
use std::error;
use std::fmt;

/// Top level OTLP metrics export body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportMetricsServiceRequest {
    /// Metrics grouped by the resource that produced them.
    pub resource_metrics: Vec<ResourceMetrics>,
}

/// Metrics of one resource.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceMetrics {
    /// The producing resource.
    pub resource: Option<Resource>,
    /// Metrics grouped by instrumentation scope.
    pub scope_metrics: Vec<ScopeMetrics>,
}

/// A producing resource.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Resource {
    /// Resource attributes, `service.name` and friends.
    pub attributes: Vec<KeyValue>,
}

/// Metrics of one instrumentation scope.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScopeMetrics {
    /// The metrics.
    pub metrics: Vec<Metric>,
}

/// One metric and its data points.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Metric {
    /// The metric name. Nameless metrics are skipped.
    pub name: Option<String>,
    /// Gauge data.
    pub gauge: Option<NumberData>,
    /// Sum data.
    pub sum: Option<NumberData>,
    /// Explicit-bucket histogram data.
    pub histogram: Option<HistogramData>,
}

/// Data points of a gauge or sum.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NumberData {
    /// The data points.
    pub data_points: Vec<NumberDataPoint>,
}

/// A gauge or sum data point.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NumberDataPoint {
    /// Observation time, nanoseconds since the epoch.
    pub time_unix_nano: Option<Value>,
    /// Floating point value.
    pub as_double: Option<Value>,
    /// Integer value.
    pub as_int: Option<Value>,
    /// Untyped value, accepted from producers that skip the OTLP oneof.
    pub value: Option<Value>,
    /// Data point attributes.
    pub attributes: Vec<KeyValue>,
}

/// Data points of a histogram.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistogramData {
    /// The data points.
    pub data_points: Vec<HistogramDataPoint>,
}

/// An explicit-bucket histogram data point.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistogramDataPoint {
    /// Observation time, nanoseconds since the epoch.
    pub time_unix_nano: Option<Value>,
    /// Number of observations.
    pub count: Option<Value>,
    /// Sum of observations.
    pub sum: Option<Value>,
    /// Per-bucket counts, one more than there are bounds.
    pub bucket_counts: Option<Value>,
    /// Ascending bucket upper bounds.
    pub explicit_bounds: Option<Value>,
    /// Smallest observation, optional.
    pub min: Option<Value>,
    /// Largest observation, optional.
    pub max: Option<Value>,
    /// Data point attributes.
    pub attributes: Vec<KeyValue>,
}

/// An attribute.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyValue {
    /// Attribute key. Keyless attributes are dropped.
    pub key: Option<String>,
    /// Attribute value.
    pub value: Option<AnyValue>,
}

/// The scalar arms of OTLP's `AnyValue`. Arrays and key/value lists are not
/// usable as labels and are dropped.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnyValue {
    /// String arm.
    pub string_value: Option<String>,
    /// Integer arm.
    pub int_value: Option<Value>,
    /// Double arm.
    pub double_value: Option<Value>,
    /// Boolean arm.
    pub bool_value: Option<bool>,
}

/// A data point, tagged by the instrument it came from.
#[derive(Debug, Clone, Copy)]
pub enum DataPoint<'a> {
    /// A gauge point.
    Gauge(&'a NumberDataPoint),
    /// A sum point.
    Sum(&'a NumberDataPoint),
    /// A histogram point.
    Histogram(&'a HistogramDataPoint),
}

impl Metric {
    /// Every data point of the metric, whichever instruments it carries.
    pub fn data_points(&self) -> Vec<DataPoint> {
        let mut points = Vec::new();
        if let Some(ref gauge) = self.gauge {
            points.extend(gauge.data_points.iter().map(DataPoint::Gauge));
        }
        if let Some(ref sum) = self.sum {
            points.extend(sum.data_points.iter().map(DataPoint::Sum));
        }
        if let Some(ref histogram) = self.histogram {
            points.extend(histogram.data_points.iter().map(DataPoint::Histogram));
        }
        points
    }
}

/// Failure to decode an export body.
#[derive(Debug)]
pub enum Error {
    /// The body is not a JSON export request.
    Json(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Json(ref e) => write!(f, "invalid OTLP JSON body: {}", e),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Json(ref e) => Some(e),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::Json(e)
    }
}

/// Decode an OTLP/HTTP JSON export body into metric records.
pub fn parse_metrics(body: &[u8]) -> Result<Vec<MetricRecord>, Error> {
    let request: ExportMetricsServiceRequest = serde_json::from_slice(body)?;
    Ok(normalize(&request))
}

/// Flatten an export request into metric records, skipping unusable points.
pub fn normalize(request: &ExportMetricsServiceRequest) -> Vec<MetricRecord> {
    let mut records = Vec::new();
    for resource_metrics in &request.resource_metrics {
        let resource_attributes = match resource_metrics.resource {
            Some(ref resource) => attributes(&resource.attributes),
            None => Attributes::new(),
        };
        for scope in &resource_metrics.scope_metrics {
            for metric in &scope.metrics {
                let name = match metric.name {
                    Some(ref name) if !name.is_empty() => name,
                    _ => {
                        trace!("skipping metric without a name");
                        continue;
                    }
                };
                for point in metric.data_points() {
                    match decode_point(name, point, &resource_attributes) {
                        Some(record) => records.push(record),
                        None => trace!("skipping undecodable data point of {}", name),
                    }
                }
            }
        }
    }
    records
}

/// Normalize one data point
///
/// `None` means the point is skipped: no usable value, no bucket counts, an
/// empty histogram or a histogram of inconsistent shape. A value field that is
/// present but not numeric decodes to NaN and is left for the store to drop.
pub fn decode_point(
    metric_name: &str,
    point: DataPoint,
    resource_attributes: &Attributes,
) -> Option<MetricRecord> {
    match point {
        DataPoint::Gauge(dp) => decode_number(metric_name, dp, resource_attributes)
            .map(|r| r.gauge()),
        DataPoint::Sum(dp) => decode_number(metric_name, dp, resource_attributes)
            .map(|r| r.sum()),
        DataPoint::Histogram(dp) => decode_histogram(metric_name, dp, resource_attributes),
    }
}

fn decode_number(
    metric_name: &str,
    dp: &NumberDataPoint,
    resource_attributes: &Attributes,
) -> Option<MetricRecord> {
    let raw = dp.as_double
        .as_ref()
        .or_else(|| dp.as_int.as_ref())
        .or_else(|| dp.value.as_ref())?;
    let value = number(raw).unwrap_or(::std::f64::NAN);
    let mut record = MetricRecord::new(metric_name, value);
    record.timestamp_ms = dp.time_unix_nano.as_ref().and_then(nanos_to_millis);
    record.attributes = attributes(&dp.attributes);
    record.resource_attributes = resource_attributes.clone();
    Some(record)
}

fn decode_histogram(
    metric_name: &str,
    dp: &HistogramDataPoint,
    resource_attributes: &Attributes,
) -> Option<MetricRecord> {
    let raw_counts = dp.bucket_counts.as_ref().and_then(|v| v.as_array())?;
    let count = dp.count.as_ref().and_then(count_of).unwrap_or(0);
    if count == 0 {
        return None;
    }
    let sum = dp.sum.as_ref().and_then(number).unwrap_or(0.0);
    let mut bucket_counts = Vec::with_capacity(raw_counts.len());
    for raw in raw_counts {
        bucket_counts.push(count_of(raw)?);
    }
    let mut explicit_bounds = Vec::new();
    if let Some(raw_bounds) = dp.explicit_bounds.as_ref().and_then(|v| v.as_array()) {
        for raw in raw_bounds {
            explicit_bounds.push(number(raw)?);
        }
    }
    let histogram = match HistogramAccumulator::new(count, sum, bucket_counts, explicit_bounds) {
        Ok(h) => h,
        Err(e) => {
            debug!("skipping histogram point of {}: {}", metric_name, e);
            return None;
        }
    };

    let mut record = MetricRecord::new(metric_name, 0.0)
        .histogram(histogram)
        .extremes(
            dp.min.as_ref().and_then(number),
            dp.max.as_ref().and_then(number),
        );
    record.timestamp_ms = dp.time_unix_nano.as_ref().and_then(nanos_to_millis);
    record.attributes = attributes(&dp.attributes);
    record.resource_attributes = resource_attributes.clone();
    Some(record)
}

/// Collect the usable scalar attributes.
pub fn attributes(kvs: &[KeyValue]) -> Attributes {
    let mut out = Attributes::new();
    for kv in kvs {
        let key = match kv.key {
            Some(ref key) if !key.is_empty() => key,
            _ => continue,
        };
        if let Some(val) = kv.value.as_ref().and_then(label_value) {
            out.insert(key.clone(), val);
        }
    }
    out
}

fn label_value(any: &AnyValue) -> Option<LabelValue> {
    if let Some(ref s) = any.string_value {
        return Some(LabelValue::Str(s.clone()));
    }
    if let Some(ref raw) = any.int_value {
        let as_int = match *raw {
            Value::Number(ref n) => n.as_i64(),
            Value::String(ref s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        return as_int
            .map(LabelValue::Int)
            .or_else(|| number(raw).map(LabelValue::Double));
    }
    if let Some(ref raw) = any.double_value {
        return number(raw).map(LabelValue::Double);
    }
    any.bool_value.map(LabelValue::Bool)
}

/// Read a JSON number, or a string holding one.
fn number(raw: &Value) -> Option<f64> {
    match *raw {
        Value::Number(ref n) => n.as_f64(),
        Value::String(ref s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Read a non-negative integral count.
fn count_of(raw: &Value) -> Option<u64> {
    if let Value::Number(ref n) = *raw {
        if let Some(c) = n.as_u64() {
            return Some(c);
        }
    }
    if let Value::String(ref s) = *raw {
        if let Ok(c) = s.trim().parse::<u64>() {
            return Some(c);
        }
    }
    number(raw)
        .filter(|c| c.is_finite() && *c >= 0.0 && *c < 1.8e19)
        .map(|c| c.floor() as u64)
}

/// Convert `timeUnixNano` to epoch milliseconds
///
/// Absent, zero or non-numeric timestamps are `None`.
fn nanos_to_millis(raw: &Value) -> Option<i64> {
    let exact = match *raw {
        Value::Number(ref n) => n.as_u64().map(i128::from).or_else(|| n.as_i64().map(i128::from)),
        Value::String(ref s) => s.trim().parse::<i128>().ok(),
        _ => None,
    };
    let millis = match exact {
        Some(nanos) => nanos.div_euclid(1_000_000),
        None => {
            let nanos = number(raw)?;
            if !nanos.is_finite() {
                return None;
            }
            (nanos / 1.0e6).floor() as i128
        }
    };
    if millis == 0 || millis > i128::from(::std::i64::MAX) || millis < i128::from(::std::i64::MIN) {
        return None;
    }
    Some(millis as i64)
}
