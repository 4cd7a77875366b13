//! Prometheus client data model (`io.prometheus.client`).
//!
//! Only the fields that end up in the JSON output are declared here. Native histogram spans,
//! exemplars and created timestamps are skipped on decode like any other unknown field.
#![allow(missing_docs)]

/// Metric type of a family.
///
/// .proto:
/// ```protobuf
/// enum MetricType {
///   COUNTER         = 0;
///   GAUGE           = 1;
///   SUMMARY         = 2;
///   UNTYPED         = 3;
///   HISTOGRAM       = 4;
///   GAUGE_HISTOGRAM = 5;
/// }
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MetricType {
    Counter = 0,
    Gauge = 1,
    Summary = 2,
    Untyped = 3,
    Histogram = 4,
    GaugeHistogram = 5,
}

impl MetricType {
    /// Name of the type as it appears in the `.proto` definition.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "COUNTER",
            MetricType::Gauge => "GAUGE",
            MetricType::Summary => "SUMMARY",
            MetricType::Untyped => "UNTYPED",
            MetricType::Histogram => "HISTOGRAM",
            MetricType::GaugeHistogram => "GAUGE_HISTOGRAM",
        }
    }

    /// Parses the type keyword of a `# TYPE` line, ignoring case.
    pub fn from_keyword(keyword: &str) -> Option<MetricType> {
        let metric_type = match keyword.to_ascii_lowercase().as_str() {
            "counter" => MetricType::Counter,
            "gauge" => MetricType::Gauge,
            "summary" => MetricType::Summary,
            "untyped" => MetricType::Untyped,
            "histogram" => MetricType::Histogram,
            "gauge_histogram" => MetricType::GaugeHistogram,
            _ => return None,
        };
        Some(metric_type)
    }

    /// Whether samples of this type carry cumulative buckets.
    pub fn is_histogram(&self) -> bool {
        matches!(self, MetricType::Histogram | MetricType::GaugeHistogram)
    }
}

/// .proto:
/// ```protobuf
/// message LabelPair {
///   optional string name  = 1;
///   optional string value = 2;
/// }
/// ```
#[derive(prost::Message, Clone, PartialEq)]
pub struct LabelPair {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

#[derive(prost::Message, Clone, PartialEq)]
pub struct Gauge {
    #[prost(double, optional, tag = "1")]
    pub value: Option<f64>,
}

#[derive(prost::Message, Clone, PartialEq)]
pub struct Counter {
    #[prost(double, optional, tag = "1")]
    pub value: Option<f64>,
}

#[derive(prost::Message, Clone, PartialEq)]
pub struct Quantile {
    #[prost(double, optional, tag = "1")]
    pub quantile: Option<f64>,
    #[prost(double, optional, tag = "2")]
    pub value: Option<f64>,
}

/// .proto:
/// ```protobuf
/// message Summary {
///   optional uint64   sample_count = 1;
///   optional double   sample_sum   = 2;
///   repeated Quantile quantile     = 3;
/// }
/// ```
#[derive(prost::Message, Clone, PartialEq)]
pub struct Summary {
    #[prost(uint64, optional, tag = "1")]
    pub sample_count: Option<u64>,
    #[prost(double, optional, tag = "2")]
    pub sample_sum: Option<f64>,
    #[prost(message, repeated, tag = "3")]
    pub quantile: Vec<Quantile>,
}

#[derive(prost::Message, Clone, PartialEq)]
pub struct Untyped {
    #[prost(double, optional, tag = "1")]
    pub value: Option<f64>,
}

/// .proto:
/// ```protobuf
/// message Histogram {
///   optional uint64 sample_count       = 1;
///   optional double sample_count_float = 4;
///   optional double sample_sum         = 2;
///   repeated Bucket bucket             = 3;
///   // Native histogram fields (5..16) are not modelled.
/// }
/// ```
#[derive(prost::Message, Clone, PartialEq)]
pub struct Histogram {
    #[prost(uint64, optional, tag = "1")]
    pub sample_count: Option<u64>,
    #[prost(double, optional, tag = "4")]
    pub sample_count_float: Option<f64>,
    #[prost(double, optional, tag = "2")]
    pub sample_sum: Option<f64>,
    #[prost(message, repeated, tag = "3")]
    pub bucket: Vec<Bucket>,
}

/// .proto:
/// ```protobuf
/// message Bucket {
///   optional uint64 cumulative_count       = 1;
///   optional double cumulative_count_float = 4;
///   optional double upper_bound            = 2;
/// }
/// ```
#[derive(prost::Message, Clone, PartialEq)]
pub struct Bucket {
    #[prost(uint64, optional, tag = "1")]
    pub cumulative_count: Option<u64>,
    #[prost(double, optional, tag = "4")]
    pub cumulative_count_float: Option<f64>,
    #[prost(double, optional, tag = "2")]
    pub upper_bound: Option<f64>,
}

/// .proto:
/// ```protobuf
/// message Metric {
///   repeated LabelPair label        = 1;
///   optional Gauge     gauge        = 2;
///   optional Counter   counter      = 3;
///   optional Summary   summary      = 4;
///   optional Untyped   untyped      = 5;
///   optional Histogram histogram    = 7;
///   optional int64     timestamp_ms = 6;
/// }
/// ```
#[derive(prost::Message, Clone, PartialEq)]
pub struct Metric {
    #[prost(message, repeated, tag = "1")]
    pub label: Vec<LabelPair>,
    #[prost(message, optional, tag = "2")]
    pub gauge: Option<Gauge>,
    #[prost(message, optional, tag = "3")]
    pub counter: Option<Counter>,
    #[prost(message, optional, tag = "4")]
    pub summary: Option<Summary>,
    #[prost(message, optional, tag = "5")]
    pub untyped: Option<Untyped>,
    #[prost(message, optional, tag = "7")]
    pub histogram: Option<Histogram>,
    #[prost(int64, optional, tag = "6")]
    pub timestamp_ms: Option<i64>,
}

/// .proto:
/// ```protobuf
/// message MetricFamily {
///   optional string     name   = 1;
///   optional string     help   = 2;
///   optional MetricType type   = 3;
///   repeated Metric     metric = 4;
///   optional string     unit   = 5;
/// }
/// ```
#[derive(prost::Message, Clone, PartialEq)]
pub struct MetricFamily {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub help: Option<String>,
    #[prost(enumeration = "MetricType", optional, tag = "3")]
    pub r#type: Option<i32>,
    #[prost(message, repeated, tag = "4")]
    pub metric: Vec<Metric>,
    #[prost(string, optional, tag = "5")]
    pub unit: Option<String>,
}

impl MetricFamily {
    /// Resolves the declared type, handing back the raw value when it is not a known type.
    ///
    /// An unset type means `COUNTER`, the protobuf default.
    pub fn metric_type(&self) -> Result<MetricType, i32> {
        let raw = self.r#type.unwrap_or_default();
        MetricType::try_from(raw).map_err(|_| raw)
    }
}
