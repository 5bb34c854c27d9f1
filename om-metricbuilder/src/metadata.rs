#[allow(unused)]
use tracing::{debug, error, info, span, trace, warn, Instrument, Level};

use std::str::FromStr;

use serde_derive::{Deserialize, Serialize};

use crate::{family::normalize_metric_name, SeriesMap};

/// Health of the scrape itself, 1 when the target was reachable.
pub const SCRAPE_UP_METRIC_NAME: &str = "up";

/// Metrics the scrape loop synthesizes about itself rather than reads from the target.
const INTERNAL_METRIC_NAMES: &[&str] = &[
    SCRAPE_UP_METRIC_NAME,
    "scrape_duration_seconds",
    "scrape_samples_post_metric_relabeling",
    "scrape_samples_scraped",
    "scrape_series_added",
];

pub fn is_internal_metric(metric_name: &str) -> bool {
    INTERNAL_METRIC_NAMES.contains(&metric_name)
}

/// The type a target declares for a metric family, as written in its `# TYPE` line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    /// Counters measure discrete events.
    Counter,
    /// Gauges are current measurements, such as bytes of memory currently used or the number of items in a queue.
    Gauge,
    /// GaugeHistograms measure current distributions.
    GaugeHistogram,
    /// Histograms measure distributions of discrete events.
    Histogram,
    /// Info metrics expose textual information which SHOULD NOT change during process lifetime.
    Info,
    /// StateSets represent a series of related boolean values, also called a bitset.
    StateSet,
    /// Summaries also measure distributions of discrete events.
    Summary,
    /// No `# TYPE` line, or an explicit `unknown`/`untyped`.
    Unknown,
}

impl Default for MetricType {
    fn default() -> Self {
        Self::Unknown
    }
}

impl FromStr for MetricType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(Self::Counter),
            "gauge" => Ok(Self::Gauge),
            "gaugehistogram" => Ok(Self::GaugeHistogram),
            "histogram" => Ok(Self::Histogram),
            "stateset" => Ok(Self::StateSet),
            "info" => Ok(Self::Info),
            "summary" => Ok(Self::Summary),
            "unknown" | "untyped" => Ok(Self::Unknown),
            _ => Err(()),
        }
    }
}

impl MetricType {
    /// Types whose samples are spread over several suffixed names.
    pub fn is_merged(self) -> bool {
        matches!(
            self,
            Self::Histogram | Self::GaugeHistogram | Self::Summary
        )
    }
}

/// What the target told us about a metric family outside of its samples.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricMetadata {
    pub metric_type: MetricType,
    pub help: Option<String>,
    pub unit: Option<String>,
}

impl MetricMetadata {
    pub fn new(metric_type: MetricType) -> Self {
        Self {
            metric_type,
            ..Self::default()
        }
    }
}

/// Looks up the declared type and help text of a metric.  The scrape layer owns the cache
/// and keeps it current across scrapes; the builder only reads from it.
pub trait MetadataCache: Send + Sync {
    fn metadata(&self, metric_name: &str) -> Option<MetricMetadata>;
}

/// A fixed [`MetadataCache`], typically filled from the descriptors of a single page.
#[derive(Clone, Debug, Default)]
pub struct StaticMetadata {
    entries: SeriesMap<String, MetricMetadata>,
}

impl StaticMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, metric_name: impl Into<String>, metadata: MetricMetadata) {
        self.entries.insert(metric_name.into(), metadata);
    }

    /// Entry for `metric_name`, created as `Unknown` if it isn't there yet.
    pub fn entry(&mut self, metric_name: &str) -> &mut MetricMetadata {
        self.entries.entry(metric_name.to_string()).or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl MetadataCache for StaticMetadata {
    fn metadata(&self, metric_name: &str) -> Option<MetricMetadata> {
        self.entries.get(metric_name).cloned()
    }
}

impl<'a, T: MetadataCache + ?Sized> MetadataCache for &'a T {
    fn metadata(&self, metric_name: &str) -> Option<MetricMetadata> {
        (**self).metadata(metric_name)
    }
}

/// Resolves the metadata for the first sample of a family, and the name the family is
/// going to be known by.
///
/// Histogram and summary rows carry a suffix their metadata doesn't, so when the exact name
/// is unknown the suffix is trimmed and the lookup retried.  Only the merged types take the
/// trimmed name, a counter found that way keeps the sample's name (`requests_total`).
pub(crate) fn metadata_for_metric(
    metric_name: &str,
    cache: &dyn MetadataCache,
) -> (MetricMetadata, String) {
    if is_internal_metric(metric_name) {
        return (MetricMetadata::new(MetricType::Gauge), metric_name.to_string());
    }

    if let Some(metadata) = cache.metadata(metric_name) {
        return (metadata, metric_name.to_string());
    }

    let normalized = normalize_metric_name(metric_name);
    match cache.metadata(normalized) {
        Some(metadata) if metadata.metric_type.is_merged() => (metadata, normalized.to_string()),
        Some(metadata) => (metadata, metric_name.to_string()),
        None => (MetricMetadata::default(), metric_name.to_string()),
    }
}
