#[allow(unused)]
use tracing::{debug, error, info, span, trace, warn, Instrument, Level};

use std::{cmp::Ordering, collections::hash_map::Entry};

use itertools::Itertools;

use crate::{
    builder::{BuildError, Result},
    labels::{
        is_stale_marker, Labels, BUCKET_LABEL, INSTANCE_LABEL, JOB_LABEL, METRICS_PATH_LABEL,
        METRIC_NAME_LABEL, QUANTILE_LABEL, SCHEME_LABEL,
    },
    metadata::MetricMetadata,
    model::{
        classify_type, Attributes, HistogramDataPoint, Metric, MetricData, MetricKind,
        NumberDataPoint, PointFlags, SummaryDataPoint, ValueAtQuantile,
    },
    SeriesMap,
};

const SUFFIX_BUCKET: &str = "_bucket";
const SUFFIX_COUNT: &str = "_count";
const SUFFIX_CREATED: &str = "_created";
const SUFFIX_SUM: &str = "_sum";
const SUFFIX_TOTAL: &str = "_total";

// Sample name suffixes that may hide the name of the family a sample belongs to:
//
// Counter: '_total', '_created'
// Summary: '_count', '_sum', '_created', '' (empty)
// Histogram: '_count', '_sum', '_bucket', '_created'
const TRIMMABLE_SUFFIXES: &[&str] = &[
    SUFFIX_BUCKET,
    SUFFIX_COUNT,
    SUFFIX_CREATED,
    SUFFIX_SUM,
    SUFFIX_TOTAL,
];

const HISTOGRAM_SUFFIXES: &[&str] = &[SUFFIX_BUCKET, SUFFIX_COUNT, SUFFIX_CREATED, SUFFIX_SUM];
const SUMMARY_SUFFIXES: &[&str] = &[SUFFIX_COUNT, SUFFIX_CREATED, SUFFIX_SUM];
const COUNTER_SUFFIXES: &[&str] = &[SUFFIX_CREATED];

/// Strips a single type suffix from a sample name: `http_latency_bucket` → `http_latency`.
pub fn normalize_metric_name(metric_name: &str) -> &str {
    TRIMMABLE_SUFFIXES
        .iter()
        .find_map(|suffix| metric_name.strip_suffix(suffix))
        .filter(|trimmed| !trimmed.is_empty())
        .unwrap_or(metric_name)
}

/// Whether a label survives as a point attribute.  Scrape plumbing never does, `le` and
/// `quantile` only when they don't define the boundaries of the metric's own type.
pub fn is_useful_label(kind: MetricKind, label_name: &str) -> bool {
    match label_name {
        METRIC_NAME_LABEL | INSTANCE_LABEL | SCHEME_LABEL | METRICS_PATH_LABEL | JOB_LABEL => {
            false
        }
        BUCKET_LABEL => kind != MetricKind::Histogram,
        QUANTILE_LABEL => kind != MetricKind::Summary,
        _ => true,
    }
}

/// Reads the bucket bound (`le`) of a histogram row or the quantile of a summary row.
pub fn get_boundary(kind: MetricKind, labels: &Labels) -> Result<f64> {
    let (label_name, empty_error) = match kind {
        MetricKind::Histogram => (BUCKET_LABEL, BuildError::EmptyLeLabel),
        MetricKind::Summary => (QUANTILE_LABEL, BuildError::EmptyQuantileLabel),
        _ => Err(BuildError::NoBoundaryLabel)?,
    };

    let value = match labels.get(label_name) {
        Some(value) if !value.is_empty() => value,
        _ => Err(empty_error)?,
    };

    parse_boundary(value).ok_or_else(|| BuildError::BoundaryParse {
        series: labels.metric_name().unwrap_or_default().to_string(),
        value: value.to_string(),
    })
}

// Bucket bounds and quantiles MUST NOT be NaN.
fn parse_boundary(value: &str) -> Option<f64> {
    match value {
        "+Inf" | "+inf" | "Inf" | "inf" => Some(f64::INFINITY),
        "-Inf" | "-inf" => Some(f64::NEG_INFINITY),
        value => value.parse::<f64>().ok().filter(|boundary| !boundary.is_nan()),
    }
}

/// Rows of a family sharing the same identifying labels, which become a single point.
#[derive(Debug)]
struct MetricGroup {
    attributes: Attributes,
    timestamp_ms: i64,
    /// Seconds since the epoch, from a `_created` row.
    created: Option<f64>,
    value: Option<f64>,
    count: Option<f64>,
    sum: Option<f64>,
    /// `(le, cumulative count)` or `(quantile, value)`, in arrival order.
    boundaries: Vec<(f64, f64)>,
}

/// Everything the builder learned about the scrape that shapes the emitted points.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct EmitContext {
    /// Captured start time metric, if that feature is on.
    pub start_time_ms: Option<i64>,
    pub scrape_interval_ms: i64,
}

/// All rows of a single logical metric within one scrape.
#[derive(Debug)]
pub struct MetricFamily {
    name: String,
    kind: MetricKind,
    is_monotonic: bool,
    metadata: MetricMetadata,
    groups: SeriesMap<Attributes, MetricGroup>,
    dropped_timeseries: usize,
}

/// What a single row contributes to its group.
enum Row {
    Value,
    Boundary(f64),
    Count,
    Sum,
    Created,
}

impl MetricGroup {
    fn new(attributes: Attributes, timestamp_ms: i64) -> Self {
        Self {
            attributes,
            timestamp_ms,
            created: None,
            value: None,
            count: None,
            sum: None,
            boundaries: vec![],
        }
    }

    /// Stores a boundary row.  Returns true if an earlier row with the same boundary was
    /// overwritten.
    fn set_boundary(&mut self, boundary: f64, value: f64) -> bool {
        match self
            .boundaries
            .iter_mut()
            .find(|(existing, _)| existing.total_cmp(&boundary) == Ordering::Equal)
        {
            Some(existing) => {
                existing.1 = value;
                true
            }
            None => {
                self.boundaries.push((boundary, value));
                false
            }
        }
    }

    fn sorted_boundaries(&self) -> Vec<(f64, f64)> {
        self.boundaries
            .iter()
            .copied()
            .sorted_by(|a, b| a.0.total_cmp(&b.0))
            .collect()
    }

    fn start_timestamp_ms(&self, context: &EmitContext) -> i64 {
        match (self.created, context.start_time_ms) {
            (Some(created), _) if created > 0. => seconds_to_ms(created),
            (_, Some(start_time_ms)) => start_time_ms,
            _ => self.timestamp_ms.saturating_sub(context.scrape_interval_ms.max(0)),
        }
    }

    fn to_number_point(&self, kind: MetricKind, context: &EmitContext) -> Option<NumberDataPoint> {
        let value = self.value?;

        // Gauges describe an instant and have no start.
        let start_timestamp_ms = match kind {
            MetricKind::Gauge => None,
            _ => Some(self.start_timestamp_ms(context)),
        };

        Some(NumberDataPoint {
            attributes: self.attributes.clone(),
            start_timestamp_ms,
            timestamp_ms: self.timestamp_ms,
            value,
            flags: stale_flags(&[value]),
        })
    }

    fn to_histogram_point(&self, context: &EmitContext) -> Option<HistogramDataPoint> {
        if self.boundaries.is_empty() {
            debug!(attributes=?self.attributes, "histogram without buckets");
            return None;
        }

        let mut buckets = self.sorted_boundaries();
        let inf_bucket = match buckets.last() {
            Some(&(bound, count)) if bound == f64::INFINITY => Some(count),
            _ => None,
        };
        if inf_bucket.is_some() {
            buckets.pop();
        }

        // The +Inf bucket is the total if no _count row was scraped.
        let count = match self.count.or(inf_bucket) {
            Some(count) => count,
            None => {
                debug!(attributes=?self.attributes, "histogram count mismatch, no +Inf bucket and no _count");
                return None;
            }
        };

        let flags = stale_flags(&[count, self.sum.unwrap_or_default()]);
        let explicit_bounds = buckets.iter().map(|(bound, _)| *bound).collect();
        let bucket_counts = buckets
            .iter()
            .map(|(_, count)| *count)
            .chain(std::iter::once(inf_bucket.unwrap_or(count)))
            .map(counter_value)
            .collect();

        Some(HistogramDataPoint {
            attributes: self.attributes.clone(),
            start_timestamp_ms: Some(self.start_timestamp_ms(context)),
            timestamp_ms: self.timestamp_ms,
            count: counter_value(count),
            sum: self.sum.filter(|sum| !is_stale_marker(*sum)),
            explicit_bounds,
            bucket_counts,
            flags,
        })
    }

    fn to_summary_point(&self, context: &EmitContext) -> Option<SummaryDataPoint> {
        if self.boundaries.is_empty() && self.count.is_none() && self.sum.is_none() {
            debug!(attributes=?self.attributes, "summary without quantiles, count or sum");
            return None;
        }

        let quantile_values = self
            .sorted_boundaries()
            .into_iter()
            .map(|(quantile, value)| ValueAtQuantile { quantile, value })
            .collect();

        Some(SummaryDataPoint {
            attributes: self.attributes.clone(),
            start_timestamp_ms: Some(self.start_timestamp_ms(context)),
            timestamp_ms: self.timestamp_ms,
            count: self.count.filter(|c| !is_stale_marker(*c)).map(counter_value),
            sum: self.sum.filter(|sum| !is_stale_marker(*sum)),
            quantile_values,
            flags: stale_flags(&[
                self.count.unwrap_or_default(),
                self.sum.unwrap_or_default(),
            ]),
        })
    }
}

fn stale_flags(values: &[f64]) -> PointFlags {
    if values.iter().any(|value| is_stale_marker(*value)) {
        PointFlags::NO_RECORDED_VALUE
    } else {
        PointFlags::default()
    }
}

// A stale bucket still has to be sent so that consumers learn about it, but the marker cast
// to an integer would be garbage.
fn counter_value(value: f64) -> u64 {
    if is_stale_marker(value) {
        0
    } else {
        value as u64
    }
}

fn seconds_to_ms(seconds: f64) -> i64 {
    (seconds * 1000.).round() as i64
}

impl MetricFamily {
    pub(crate) fn new(name: String, metadata: MetricMetadata) -> Self {
        let (kind, is_monotonic) = classify_type(metadata.metric_type);
        if kind == MetricKind::None {
            debug!(%name, ?metadata, "unsupported metric type, series will be dropped");
        }

        Self {
            name,
            kind,
            is_monotonic,
            metadata,
            groups: SeriesMap::default(),
            dropped_timeseries: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn is_monotonic(&self) -> bool {
        self.is_monotonic
    }

    /// Number of distinct series groups accumulated so far.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// The name a family shares with its suffixed samples.  Counters may be named after their
    /// `_total` sample, their `_created` sample hangs off the bare name.
    fn base_name(&self) -> &str {
        match self.kind {
            MetricKind::Sum if self.is_monotonic => self
                .name
                .strip_suffix(SUFFIX_TOTAL)
                .filter(|base| !base.is_empty())
                .unwrap_or(&self.name),
            _ => &self.name,
        }
    }

    /// Would a sample called `metric_name` be part of this family?
    ///
    /// Only the suffixes the family's own type produces are accepted, so that a gauge which
    /// happens to be called `foo_sum` never ends up inside the histogram `foo`.
    pub fn includes_metric(&self, metric_name: &str) -> bool {
        if metric_name == self.name {
            return true;
        }

        let suffixes = match self.kind {
            MetricKind::Histogram => HISTOGRAM_SUFFIXES,
            MetricKind::Summary => SUMMARY_SUFFIXES,
            MetricKind::Sum if self.is_monotonic => COUNTER_SUFFIXES,
            _ => return false,
        };

        metric_name
            .strip_prefix(self.base_name())
            .map_or(false, |suffix| suffixes.contains(&suffix))
    }

    fn classify_row(&self, metric_name: &str, labels: &Labels) -> Result<Row> {
        let suffix = match metric_name.strip_prefix(self.base_name()) {
            Some(suffix) if metric_name != self.name => suffix,
            _ => "",
        };

        Ok(match (self.kind, suffix) {
            (MetricKind::Histogram | MetricKind::Summary, SUFFIX_SUM) => Row::Sum,
            (MetricKind::Histogram | MetricKind::Summary, SUFFIX_COUNT) => Row::Count,
            (MetricKind::Histogram | MetricKind::Summary | MetricKind::Sum, SUFFIX_CREATED) => {
                Row::Created
            }
            (MetricKind::Histogram | MetricKind::Summary, _) => {
                Row::Boundary(get_boundary(self.kind, labels)?)
            }
            _ => Row::Value,
        })
    }

    /// Folds one row into the group its identifying labels select.
    #[tracing::instrument(level = "trace", skip(self, labels), fields(family = %self.name))]
    pub(crate) fn add(
        &mut self,
        metric_name: &str,
        labels: &Labels,
        timestamp_ms: i64,
        value: f64,
    ) -> Result<()> {
        // Parse before touching the groups so that a bad row leaves no trace.
        let row = match self.classify_row(metric_name, labels) {
            Ok(row) => row,
            Err(e) => {
                debug!(metric_name, %labels, error=%e, "dropping series");
                self.dropped_timeseries += 1;
                Err(e)?
            }
        };

        let attributes: Attributes = labels
            .iter()
            .filter(|label| is_useful_label(self.kind, &label.name))
            .map(|label| (label.name.clone(), label.value.clone()))
            .collect();
        let group = match self.groups.entry(attributes) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let attributes = entry.key().clone();
                entry.insert(MetricGroup::new(attributes, timestamp_ms))
            }
        };

        #[cfg(feature = "consistent_timestamps")]
        {
            if group.timestamp_ms != timestamp_ms {
                debug!(metric_name, %labels, group_timestamp=group.timestamp_ms, timestamp_ms, "inconsistent timestamps");
                self.dropped_timeseries += 1;
                Err(BuildError::InconsistentTimestamps(metric_name.to_string()))?
            }
        }

        // The count and sum are the rows the point is stamped with, bucket and quantile
        // timestamps aren't reliable across target restarts.
        let replaced = match row {
            Row::Value => group.value.replace(value).is_some(),
            Row::Count => {
                group.timestamp_ms = timestamp_ms;
                group.count.replace(value).is_some()
            }
            Row::Sum => {
                group.timestamp_ms = timestamp_ms;
                group.sum.replace(value).is_some()
            }
            Row::Created => group.created.replace(value).is_some(),
            Row::Boundary(boundary) => group.set_boundary(boundary, value),
        };

        if replaced {
            debug!(metric_name, %labels, "duplicate series, keeping the last value");
            self.dropped_timeseries += 1;
        }

        Ok(())
    }

    /// Emits one point per group, in attribute order, as a single [`Metric`].
    ///
    /// Returns the number of points emitted and the number of series dropped, both while
    /// adding and here.  A family without any point appends nothing.
    #[tracing::instrument(level = "debug", skip_all, fields(family = %self.name))]
    pub(crate) fn append_metric(
        &self,
        metrics: &mut Vec<Metric>,
        context: &EmitContext,
    ) -> (usize, usize) {
        let mut dropped = self.dropped_timeseries;
        let groups = self
            .groups
            .iter()
            .sorted_by(|a, b| a.0.cmp(b.0))
            .map(|(_, group)| group);

        let data = match self.kind {
            MetricKind::Gauge => MetricData::Gauge(
                groups
                    .filter_map(|group| group.to_number_point(self.kind, context))
                    .collect(),
            ),
            MetricKind::Sum => MetricData::Sum {
                is_monotonic: self.is_monotonic,
                points: groups
                    .filter_map(|group| group.to_number_point(self.kind, context))
                    .collect(),
            },
            MetricKind::Histogram => MetricData::Histogram(
                groups
                    .filter_map(|group| group.to_histogram_point(context))
                    .collect(),
            ),
            MetricKind::Summary => MetricData::Summary(
                groups
                    .filter_map(|group| group.to_summary_point(context))
                    .collect(),
            ),
            MetricKind::None => {
                return (0, dropped + self.groups.len());
            }
        };

        let emitted = data.point_count();
        dropped += self.groups.len() - emitted;

        if emitted > 0 {
            metrics.push(Metric {
                name: self.name.clone(),
                description: self.metadata.help.clone(),
                unit: self.metadata.unit.clone(),
                data,
            });
        }

        (emitted, dropped)
    }
}
