//! `om-metricbuilder` reassembles the flat samples of a scraped Prometheus page into typed
//! metrics.
//!
//! Histogram buckets and summary quantiles travel as separate rows; they come back out as
//! one point per series.

#[allow(unused)]
use tracing::{debug, error, info, span, trace, warn, Instrument, Level};

/// Routes samples to their families and drives the build.
pub mod builder;

/// Per metric family accumulation of rows into points.
pub mod family;

pub mod labels;

/// Declared metric types and the cache they are looked up in.
pub mod metadata;

/// The metrics a build produces.
pub mod model;

/// Reads a text exposition page into samples and metadata.
pub mod reader;


pub use builder::{BuildError, BuilderConfig, MetricBuilder};
pub use labels::Labels;
pub use metadata::{MetadataCache, MetricMetadata, MetricType, StaticMetadata};
pub use model::{Metric, MetricData, MetricKind};
pub use reader::{ExpositionFormat, ScrapePage};

#[cfg(feature = "hash_fnv")]
pub(crate) type SeriesMap<K, V> = fnv::FnvHashMap<K, V>;

#[cfg(not(feature = "hash_fnv"))]
pub(crate) type SeriesMap<K, V> = std::collections::HashMap<K, V>;

/// Indicates that an error occurred while turning an exposition document into metrics
#[derive(thiserror::Error, Debug)]
pub enum OmError {
    #[error(transparent)]
    Build(#[from] builder::BuildError),

    #[error(transparent)]
    Read(#[from] reader::ReadError),
}

/// The metrics of a page along with the series accounting of its build.
#[derive(Debug, Default)]
pub struct BuildOutput {
    pub metrics: Vec<Metric>,
    pub timeseries: usize,
    pub dropped_timeseries: usize,
}

/// Reads an exposition document and builds it as a single scrape.
///
/// Samples without a timestamp of their own are stamped with `default_timestamp_ms`.
/// Samples the builder rejects are logged and counted, they don't fail the page.
pub fn build_page(
    data: &str,
    format: ExpositionFormat,
    default_timestamp_ms: i64,
    config: BuilderConfig,
) -> Result<BuildOutput, OmError> {
    let page = reader::read_page(data, format, default_timestamp_ms)?;
    let mut builder = MetricBuilder::new(config, &page.metadata)?;

    for sample in page.samples.iter() {
        if let Err(e) = builder.add_data_point(&sample.labels, sample.timestamp_ms, sample.value) {
            debug!(labels=%sample.labels, error=%e, "sample rejected");
        }
    }

    let mut metrics = vec![];
    let (timeseries, dropped_timeseries) = builder.build(&mut metrics)?;

    Ok(BuildOutput {
        metrics,
        timeseries,
        dropped_timeseries,
    })
}
