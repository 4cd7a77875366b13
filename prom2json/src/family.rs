//! JSON shape of a decoded metric family.
//!
//! All numbers are rendered as strings. Object keys (labels, quantiles, bucket bounds) are
//! sorted, so the output for a given input is stable.
use std::collections::BTreeMap;

use serde::Serialize;

use crate::proto::{LabelPair, Metric, MetricFamily, MetricType};

/// A metric family ready to be serialized.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Family {
    /// Family name.
    pub name: String,
    /// Help text, empty when the family has none.
    pub help: String,
    /// Upper-case type name, e.g. `COUNTER`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Samples of the family, in decode order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<Sample>,
}

/// One sample of a family. The shape depends on the family type.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Sample {
    /// Counter, gauge or untyped sample.
    Value(ValueSample),
    /// Summary sample.
    Summary(SummarySample),
    /// Histogram or gauge histogram sample.
    Histogram(HistogramSample),
}

/// Counter, gauge or untyped sample.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValueSample {
    /// Label set.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Timestamp in milliseconds since the epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<String>,
    /// Sample value.
    pub value: String,
}

/// Summary sample.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SummarySample {
    /// Label set.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Timestamp in milliseconds since the epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<String>,
    /// Quantile to value.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub quantiles: BTreeMap<String, String>,
    /// Number of observations.
    pub count: String,
    /// Sum of observations.
    pub sum: String,
}

/// Histogram sample.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistogramSample {
    /// Label set.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Timestamp in milliseconds since the epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<String>,
    /// Upper bound to cumulative count.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub buckets: BTreeMap<String, String>,
    /// Number of observations.
    pub count: String,
    /// Sum of observations.
    pub sum: String,
}

impl From<MetricFamily> for Family {
    fn from(family: MetricFamily) -> Self {
        let metric_type = family.metric_type();
        let kind = match metric_type {
            Ok(metric_type) => metric_type.as_str().to_owned(),
            Err(raw) => raw.to_string(),
        };

        let metrics = family
            .metric
            .into_iter()
            .map(|metric| match metric_type {
                Ok(MetricType::Summary) => Sample::Summary(summary_sample(metric)),
                Ok(metric_type) if metric_type.is_histogram() => {
                    Sample::Histogram(histogram_sample(metric))
                }
                _ => Sample::Value(value_sample(metric)),
            })
            .collect();

        Family {
            name: family.name.unwrap_or_default(),
            help: family.help.unwrap_or_default(),
            kind,
            metrics,
        }
    }
}

fn value_sample(metric: Metric) -> ValueSample {
    let value = metric
        .gauge
        .and_then(|gauge| gauge.value)
        .or_else(|| metric.counter.and_then(|counter| counter.value))
        .or_else(|| metric.untyped.and_then(|untyped| untyped.value))
        .unwrap_or_default();

    ValueSample {
        labels: labels(metric.label),
        timestamp_ms: metric.timestamp_ms.map(|ts| ts.to_string()),
        value: format_float(value),
    }
}

fn summary_sample(metric: Metric) -> SummarySample {
    let summary = metric.summary.unwrap_or_default();
    let quantiles = summary
        .quantile
        .iter()
        .map(|q| {
            (format_float(q.quantile.unwrap_or_default()), format_float(q.value.unwrap_or_default()))
        })
        .collect();

    SummarySample {
        labels: labels(metric.label),
        timestamp_ms: metric.timestamp_ms.map(|ts| ts.to_string()),
        quantiles,
        count: summary.sample_count.unwrap_or_default().to_string(),
        sum: format_float(summary.sample_sum.unwrap_or_default()),
    }
}

fn histogram_sample(metric: Metric) -> HistogramSample {
    let histogram = metric.histogram.unwrap_or_default();
    let buckets = histogram
        .bucket
        .iter()
        .map(|bucket| {
            let count = count_string(bucket.cumulative_count, bucket.cumulative_count_float);
            (format_float(bucket.upper_bound.unwrap_or_default()), count)
        })
        .collect();

    HistogramSample {
        labels: labels(metric.label),
        timestamp_ms: metric.timestamp_ms.map(|ts| ts.to_string()),
        buckets,
        count: count_string(histogram.sample_count, histogram.sample_count_float),
        sum: format_float(histogram.sample_sum.unwrap_or_default()),
    }
}

fn labels(pairs: Vec<LabelPair>) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|pair| (pair.name.unwrap_or_default(), pair.value.unwrap_or_default()))
        .collect()
}

/// Integer counts win over float counts, which only float histograms set.
fn count_string(count: Option<u64>, count_float: Option<f64>) -> String {
    match (count, count_float) {
        (None, Some(count)) => format_float(count),
        (count, _) => count.unwrap_or_default().to_string(),
    }
}

/// Formats a float with the shortest representation that round-trips.
///
/// Exponent notation (`1e+06`, `2.5e-05`) is used when the decimal exponent is below -4 or at
/// least 6. Infinities render as `+Inf` and `-Inf`.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_owned();
    }

    let scientific = format!("{value:e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return value.to_string();
    };
    let exponent: i32 = exponent.parse().unwrap_or_default();
    if (-4..6).contains(&exponent) {
        value.to_string()
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
    }
}
