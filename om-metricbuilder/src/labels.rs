#[allow(unused)]
use tracing::{debug, error, info, span, trace, warn, Instrument, Level};

use std::fmt;

use itertools::Itertools;
use serde_derive::Serialize;

/// Label carrying the sample's metric name.
pub const METRIC_NAME_LABEL: &str = "__name__";
/// Histogram bucket upper bound.
pub const BUCKET_LABEL: &str = "le";
/// Summary quantile.
pub const QUANTILE_LABEL: &str = "quantile";

pub const INSTANCE_LABEL: &str = "instance";
pub const JOB_LABEL: &str = "job";
pub const SCHEME_LABEL: &str = "__scheme__";
pub const METRICS_PATH_LABEL: &str = "__metrics_path__";

// Prometheus writes this exact NaN payload when a series disappears between scrapes.  It
// never compares equal to itself, so it has to be matched on its bit pattern.
const STALE_MARKER_BITS: u64 = 0x7ff0_0000_0000_0002;

/// The stale marker sentinel as a float.
pub const fn stale_marker() -> f64 {
    f64::from_bits(STALE_MARKER_BITS)
}

/// Is this value the stale marker, as opposed to an ordinary NaN?
pub fn is_stale_marker(value: f64) -> bool {
    value.to_bits() == STALE_MARKER_BITS
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

/// The label set of a single sample, in the order the scrape layer handed it over.
///
/// Names are expected to be unique but this is not enforced on construction, the builder
/// rejects offending samples instead.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Labels(Vec<Label>);

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push(Label::new(name, value));
    }

    /// The value of the first label called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|label| label.name == name)
            .map(|label| label.value.as_str())
    }

    pub fn metric_name(&self) -> Option<&str> {
        self.get(METRIC_NAME_LABEL).filter(|name| !name.is_empty())
    }

    /// Every label name that occurs more than once, sorted.
    pub fn duplicate_names(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|label| label.name.as_str())
            .duplicates()
            .sorted()
            .map(String::from)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<N, V> FromIterator<(N, V)> for Labels
where
    N: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| Label::new(name, value))
                .collect(),
        )
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.0
                .iter()
                .map(|label| format!("{}={:?}", label.name, label.value))
                .join(", ")
        )
    }
}
