#[allow(unused)]
use tracing::{debug, error, info, span, trace, warn, Instrument, Level};

use std::collections::BTreeMap;

use serde_derive::Serialize;

use crate::metadata::MetricType;

/// Point attributes, kept sorted so that identical label sets compare and serialize the same.
pub type Attributes = BTreeMap<String, String>;

/// How a [`MetricFamily`](crate::family::MetricFamily) is assembled and emitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MetricKind {
    Gauge,
    Sum,
    Histogram,
    Summary,
    /// Not representable, every series of the family is dropped.
    None,
}

/// Maps a declared exposition type onto the kind it is built as, and whether it is monotonic.
///
/// Untyped metrics become gauges instead of being dropped, most targets never bother with
/// `# TYPE` lines.  Gauge histograms have no agreed upon representation yet and are dropped.
pub fn classify_type(metric_type: MetricType) -> (MetricKind, bool) {
    match metric_type {
        MetricType::Counter => (MetricKind::Sum, true),
        MetricType::Gauge | MetricType::Unknown => (MetricKind::Gauge, false),
        MetricType::Histogram => (MetricKind::Histogram, true),
        MetricType::Summary => (MetricKind::Summary, true),
        MetricType::Info | MetricType::StateSet => (MetricKind::Sum, false),
        MetricType::GaugeHistogram => (MetricKind::None, false),
    }
}

/// Flags attached to a data point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PointFlags {
    /// The series went stale, the point only marks its disappearance.
    pub no_recorded_value: bool,
}

impl PointFlags {
    pub const NO_RECORDED_VALUE: Self = Self {
        no_recorded_value: true,
    };
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NumberDataPoint {
    pub attributes: Attributes,
    pub start_timestamp_ms: Option<i64>,
    pub timestamp_ms: i64,
    pub value: f64,
    pub flags: PointFlags,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistogramDataPoint {
    pub attributes: Attributes,
    pub start_timestamp_ms: Option<i64>,
    pub timestamp_ms: i64,
    pub count: u64,
    pub sum: Option<f64>,
    /// Upper bounds of every bucket but the last, ascending.  The `+Inf` bound is implied.
    pub explicit_bounds: Vec<f64>,
    /// Cumulative counts, one per explicit bound plus the trailing `+Inf` bucket.
    pub bucket_counts: Vec<u64>,
    pub flags: PointFlags,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValueAtQuantile {
    pub quantile: f64,
    pub value: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SummaryDataPoint {
    pub attributes: Attributes,
    pub start_timestamp_ms: Option<i64>,
    pub timestamp_ms: i64,
    pub count: Option<u64>,
    pub sum: Option<f64>,
    /// Ascending by quantile.
    pub quantile_values: Vec<ValueAtQuantile>,
    pub flags: PointFlags,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum MetricData {
    Gauge(Vec<NumberDataPoint>),
    Sum {
        is_monotonic: bool,
        points: Vec<NumberDataPoint>,
    },
    Histogram(Vec<HistogramDataPoint>),
    Summary(Vec<SummaryDataPoint>),
}

/// One logical metric of a scrape with all of its points.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Metric {
    pub name: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub data: MetricData,
}

impl MetricData {
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Sum { .. } => MetricKind::Sum,
            Self::Histogram(_) => MetricKind::Histogram,
            Self::Summary(_) => MetricKind::Summary,
        }
    }

    pub fn point_count(&self) -> usize {
        match self {
            Self::Gauge(points) => points.len(),
            Self::Sum { points, .. } => points.len(),
            Self::Histogram(points) => points.len(),
            Self::Summary(points) => points.len(),
        }
    }
}
