#[allow(unused)]
use tracing::{debug, error, info, span, trace, warn, Instrument, Level};

use itertools::Itertools;
use regex::Regex;
use serde_derive::{Deserialize, Serialize};

use crate::{
    family::{normalize_metric_name, EmitContext, MetricFamily},
    labels::{is_stale_marker, Labels},
    metadata::{is_internal_metric, metadata_for_metric, MetadataCache, SCRAPE_UP_METRIC_NAME},
    model::Metric,
    SeriesMap,
};

/// Metric whose value is taken as the start time of every cumulative point when no pattern
/// is configured.
pub const START_TIME_METRIC_NAME: &str = "process_start_time_seconds";

#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error("invalid sample: non-unique label names: {0:?}")]
    DuplicateLabels(Vec<String>),

    #[error("metricName not found from labels")]
    MissingName,

    #[error("given metricType has no 'le' or 'quantile' label")]
    NoBoundaryLabel,

    #[error("'le' label on histogram metric is missing or empty")]
    EmptyLeLabel,

    #[error("'quantile' label on summary metric is missing or empty")]
    EmptyQuantileLabel,

    #[error("unparsable boundary {value:?} on series {series}")]
    BoundaryParse { series: String, value: String },

    #[error("inconsistent timestamps on metric points for metric {0}")]
    InconsistentTimestamps(String),

    #[error("there is no data to build")]
    NoData,

    #[error("builder has already been built")]
    AlreadyBuilt,

    #[error("invalid start time metric pattern: {0}")]
    InvalidStartTimeRegex(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, BuildError>;

/// Per scrape knobs of the [`MetricBuilder`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Use the process start time metric as the start of every cumulative point.
    pub use_start_time_metric: bool,
    /// Pattern selecting the start time metric instead of `process_start_time_seconds`.
    pub start_time_metric_regex: Option<String>,
    /// Stands in for the start of cumulative points that carry none of their own.
    pub scrape_interval_ms: i64,
}

impl BuilderConfig {
    pub fn use_start_time_metric(self, use_start_time_metric: bool) -> Self {
        Self {
            use_start_time_metric,
            ..self
        }
    }

    pub fn start_time_metric_regex(self, pattern: impl Into<String>) -> Self {
        Self {
            start_time_metric_regex: Some(pattern.into()),
            ..self
        }
    }

    pub fn scrape_interval_ms(self, scrape_interval_ms: i64) -> Self {
        Self {
            scrape_interval_ms,
            ..self
        }
    }
}

/// Turns the samples of a single scraped page into [`Metric`]s.
///
/// Feed every sample of the page through [`add_data_point`](Self::add_data_point) in scrape
/// order, then call [`build`](Self::build) once.  A builder holds the state of exactly one
/// scrape, use a fresh one for the next.
pub struct MetricBuilder<'a> {
    families: SeriesMap<String, MetricFamily>,
    metadata: &'a dyn MetadataCache,
    use_start_time_metric: bool,
    start_time_regex: Option<Regex>,
    scrape_interval_ms: i64,
    /// Seconds since the epoch.
    start_time: Option<f64>,
    has_data: bool,
    has_internal_metric: bool,
    num_timeseries: usize,
    dropped_timeseries: usize,
    built: bool,
}

impl<'a> MetricBuilder<'a> {
    pub fn new(config: BuilderConfig, metadata: &'a dyn MetadataCache) -> Result<Self> {
        let start_time_regex = match config.start_time_metric_regex.as_deref() {
            Some(pattern) if !pattern.is_empty() => Some(Regex::new(pattern)?),
            _ => None,
        };

        Ok(Self {
            families: SeriesMap::default(),
            metadata,
            use_start_time_metric: config.use_start_time_metric,
            start_time_regex,
            scrape_interval_ms: config.scrape_interval_ms,
            start_time: None,
            has_data: false,
            has_internal_metric: false,
            num_timeseries: 0,
            dropped_timeseries: 0,
            built: false,
        })
    }

    fn match_start_time_metric(&self, metric_name: &str) -> bool {
        match &self.start_time_regex {
            Some(regex) => regex.is_match(metric_name),
            None => metric_name == START_TIME_METRIC_NAME,
        }
    }

    /// Series seen and series dropped so far, not counting what `build` will add.
    pub fn series_counts(&self) -> (usize, usize) {
        (self.num_timeseries, self.dropped_timeseries)
    }

    pub fn family_count(&self) -> usize {
        self.families.len()
    }

    pub fn family(&self, name: &str) -> Option<&MetricFamily> {
        self.families.get(name)
    }

    /// Start time captured from the start time metric, in seconds.
    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    /// Validates one sample and hands it to the family it belongs to.
    ///
    /// A rejected sample never affects the rest of the scrape, callers are free to log the
    /// error and carry on.
    #[tracing::instrument(level = "trace", skip(self, labels), fields(%labels))]
    pub fn add_data_point(&mut self, labels: &Labels, timestamp_ms: i64, value: f64) -> Result<()> {
        if self.built {
            Err(BuildError::AlreadyBuilt)?
        }

        // Prometheus rejects samples with duplicate label names since 2.16.0, so do we.
        let duplicates = labels.duplicate_names();
        if !duplicates.is_empty() {
            debug!(?duplicates, "dropping series with duplicate labels");
            self.num_timeseries += 1;
            self.dropped_timeseries += 1;
            Err(BuildError::DuplicateLabels(duplicates))?
        }

        let metric_name = match labels.metric_name() {
            Some(metric_name) => metric_name,
            None => {
                debug!("dropping series without a metric name");
                self.num_timeseries += 1;
                self.dropped_timeseries += 1;
                Err(BuildError::MissingName)?
            }
        };

        if is_internal_metric(metric_name) {
            self.has_internal_metric = true;

            // up is 1 if the target is healthy, 0 if the scrape failed, or the stale marker
            // once the target went away.
            if metric_name == SCRAPE_UP_METRIC_NAME && value != 1. && !is_stale_marker(value) {
                if value == 0. {
                    warn!(scrape_timestamp = timestamp_ms, target_labels = %labels, "Failed to scrape Prometheus endpoint");
                } else {
                    warn!(value, scrape_timestamp = timestamp_ms, target_labels = %labels, "The 'up' metric contains invalid value");
                }
            }
        } else {
            if self.use_start_time_metric && self.match_start_time_metric(metric_name) {
                // A stale or NaN start time is no start time at all.
                if value.is_finite() {
                    trace!(metric_name, value, "captured start time");
                    self.start_time = Some(value);
                } else {
                    debug!(metric_name, value, "ignoring non-finite start time");
                }
            }

            self.has_data = true;
        }

        let (key, metadata) = match self.joined_family(metric_name) {
            Some(key) => (key, None),
            None => {
                let (metadata, name) = metadata_for_metric(metric_name, self.metadata);
                // The resolved name may belong to a family which refused this sample.
                let key = if self.families.contains_key(&name) {
                    metric_name.to_string()
                } else {
                    name
                };
                (key, Some(metadata))
            }
        };
        trace!(metric_name, family = %key, "routing sample");

        self.families
            .entry(key.clone())
            .or_insert_with(|| MetricFamily::new(key, metadata.unwrap_or_default()))
            .add(metric_name, labels, timestamp_ms, value)
    }

    /// The existing family `metric_name` belongs to, if any.
    fn joined_family(&self, metric_name: &str) -> Option<String> {
        if self.families.contains_key(metric_name) {
            return Some(metric_name.to_string());
        }

        let normalized = normalize_metric_name(metric_name);
        let mut candidates = vec![normalized.to_string()];
        // A counter family is keyed by its `_total` sample, `_created` strips down to the
        // bare name.
        if normalized != metric_name {
            candidates.push(format!("{}_total", normalized));
        }

        candidates.into_iter().find(|candidate| {
            self.families
                .get(candidate)
                .map_or(false, |family| family.includes_metric(metric_name))
        })
    }

    /// Appends every family's points to `metrics`.
    ///
    /// Returns the number of series seen and the number of series dropped during the whole
    /// scrape.  Series that can't be assembled are dropped, only a scrape that produced
    /// nothing at all is an error.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn build(&mut self, metrics: &mut Vec<Metric>) -> Result<(usize, usize)> {
        if self.built {
            Err(BuildError::AlreadyBuilt)?
        }
        self.built = true;

        if !self.has_data {
            if self.has_internal_metric {
                return Ok((0, 0));
            }
            Err(BuildError::NoData)?
        }

        let context = EmitContext {
            start_time_ms: match (self.use_start_time_metric, self.start_time) {
                (true, Some(start_time)) if start_time.is_finite() => {
                    Some((start_time * 1000.).round() as i64)
                }
                _ => None,
            },
            scrape_interval_ms: self.scrape_interval_ms,
        };

        for (name, family) in self.families.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
            let (emitted, dropped) = family.append_metric(metrics, &context);
            trace!(family = %name, emitted, dropped);
            self.num_timeseries += emitted + dropped;
            self.dropped_timeseries += dropped;
        }

        debug!(
            timeseries = self.num_timeseries,
            dropped = self.dropped_timeseries,
            "built scrape"
        );

        Ok((self.num_timeseries, self.dropped_timeseries))
    }
}
