#[allow(unused)]
use tracing::{debug, error, info, span, trace, warn, Instrument, Level};

use std::{borrow::Cow, str::FromStr};

use lazy_static::lazy_static;
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alphanumeric1, char, space0, space1},
    combinator::{eof, map, map_res, opt, rest, value},
    multi::separated_list0,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use regex::{Captures, Regex};

use crate::{
    labels::{Labels, METRIC_NAME_LABEL},
    metadata::{MetricType, StaticMetadata},
};

mod grammar;
use grammar::*;

lazy_static! {
    // Pattern used to check for escape characters
    static ref UNESCAPE_RE: Regex = Regex::new(r#"(\\[n"\\])"#).unwrap();
}

/// Which text format a page is written in.  They only differ in the unit of timestamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpositionFormat {
    /// Prometheus text format 0.0.4, timestamps in milliseconds.
    Prometheus,
    /// OpenMetrics text format, timestamps in (fractional) seconds.
    OpenMetrics,
}

impl Default for ExpositionFormat {
    fn default() -> Self {
        Self::Prometheus
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ReadError {
    #[error("line {line}: malformed line {text:?}")]
    Syntax { line: usize, text: String },

    #[error("line {0}: noise after eof")]
    Eof(usize),
}

pub type Result<T> = std::result::Result<T, ReadError>;

/// A sample as the builder consumes it, with the metric name folded into the labels.
#[derive(Clone, Debug, PartialEq)]
pub struct ScrapedSample {
    pub labels: Labels,
    pub timestamp_ms: i64,
    pub value: f64,
}

/// Everything read off one exposition page.
#[derive(Debug, Default)]
pub struct ScrapePage {
    /// Collected from the `# TYPE`, `# HELP` and `# UNIT` descriptors.
    pub metadata: StaticMetadata,
    /// In page order.
    pub samples: Vec<ScrapedSample>,
}

#[derive(Clone, Debug, PartialEq)]
enum Line<'a> {
    Type {
        metric_name: &'a str,
        metric_type: MetricType,
    },
    Help {
        metric_name: &'a str,
        help_text: Option<&'a str>,
    },
    Unit {
        metric_name: &'a str,
        unit: Option<&'a str>,
    },
    Sample {
        metric_name: &'a str,
        labels: Vec<(&'a str, Option<&'a str>)>,
        value: f64,
        timestamp: Option<f64>,
    },
    Eof,
    Comment,
    Empty,
}

impl<'a> Line<'a> {
    /// `# TYPE`, `# HELP`, `# UNIT` and `# EOF`
    fn nom_descriptor(input: &'a str) -> IResult<&'a str, Self> {
        preceded(
            pair(char('#'), space1),
            alt((
                map(
                    tuple((
                        tag("TYPE"),
                        space1,
                        metric_name1,
                        space1,
                        map_res(alphanumeric1, MetricType::from_str),
                        space0,
                        eof,
                    )),
                    |(_, _, metric_name, _, metric_type, _, _)| Self::Type {
                        metric_name,
                        metric_type,
                    },
                ),
                map(
                    tuple((
                        tag("HELP"),
                        space1,
                        metric_name1,
                        opt(preceded(char(' '), rest)),
                    )),
                    |(_, _, metric_name, help_text)| Self::Help {
                        metric_name,
                        help_text: help_text.filter(|text: &&str| !text.is_empty()),
                    },
                ),
                map(
                    tuple((
                        tag("UNIT"),
                        space1,
                        metric_name1,
                        opt(preceded(space1, metric_name1)),
                        space0,
                        eof,
                    )),
                    |(_, _, metric_name, unit, _, _)| Self::Unit { metric_name, unit },
                ),
                value(Self::Eof, terminated(tag("EOF"), eof)),
            )),
        )(input)
    }

    /// ```abnf
    /// sample = metricname [labels] SP number [SP timestamp] [exemplar] LF
    /// ```
    fn nom_sample(input: &'a str) -> IResult<&'a str, Self> {
        let (input, metric_name) = metric_name1(input)?;
        let (input, labels) = opt(delimited(
            pair(char('{'), space0),
            terminated(
                separated_list0(tuple((space0, char(','), space0)), label),
                opt(pair(space0, char(','))),
            ),
            pair(space0, char('}')),
        ))(input)?;
        let (input, value) = preceded(space1, floatlike)(input)?;
        let (input, timestamp) = opt(preceded(space1, timestamp))(input)?;
        // Exemplars don't take part in the build.
        let (input, _) = opt(preceded(tuple((space1, char('#'))), rest))(input)?;
        let (input, _) = terminated(space0, eof)(input)?;

        Ok((
            input,
            Self::Sample {
                metric_name,
                labels: labels.unwrap_or_default(),
                value,
                timestamp,
            },
        ))
    }

    fn nom(input: &'a str) -> IResult<&'a str, Self> {
        alt((
            Self::nom_descriptor,
            value(Self::Comment, preceded(char('#'), rest)),
            value(Self::Empty, terminated(space0, eof)),
            Self::nom_sample,
        ))(input)
    }
}

fn unescape_string(input: &str) -> Cow<'_, str> {
    UNESCAPE_RE.replace_all(input, |caps: &Captures| match &caps[0] {
        r"\n" => "\n".to_string(),
        r#"\""# => r#"""#.to_string(),
        r"\\" => r"\".to_string(),
        c => c.to_string(),
    })
}

fn timestamp_ms(format: ExpositionFormat, timestamp: f64) -> i64 {
    match format {
        ExpositionFormat::Prometheus => timestamp as i64,
        ExpositionFormat::OpenMetrics => (timestamp * 1000.).round() as i64,
    }
}

/// Reads every line of an exposition page.
///
/// Label sets are taken as written, duplicate names included, it is up to the builder to
/// reject them.
#[tracing::instrument(skip(input))]
pub fn read_page(
    input: &str,
    format: ExpositionFormat,
    default_timestamp_ms: i64,
) -> Result<ScrapePage> {
    let mut page = ScrapePage::default();
    let mut has_eof = false;

    for (index, text) in input.lines().enumerate() {
        let line_number = index + 1;
        let line = match Line::nom(text) {
            Ok((_, line)) => line,
            Err(e) => {
                debug!(line_number, text, error=%e, "malformed line");
                Err(ReadError::Syntax {
                    line: line_number,
                    text: text.to_string(),
                })?
            }
        };

        if has_eof && line != Line::Empty {
            Err(ReadError::Eof(line_number))?
        }

        match line {
            Line::Type {
                metric_name,
                metric_type,
            } => page.metadata.entry(metric_name).metric_type = metric_type,
            Line::Help {
                metric_name,
                help_text,
            } => {
                page.metadata.entry(metric_name).help =
                    help_text.map(|text| unescape_string(text).into_owned())
            }
            Line::Unit { metric_name, unit } => {
                page.metadata.entry(metric_name).unit = unit.map(String::from)
            }
            Line::Sample {
                metric_name,
                labels,
                value,
                timestamp,
            } => {
                let mut label_set = Labels::new();
                label_set.push(METRIC_NAME_LABEL, metric_name);
                for (name, label_value) in labels {
                    label_set.push(name, unescape_string(label_value.unwrap_or_default()));
                }

                trace!(%label_set, value, ?timestamp);
                page.samples.push(ScrapedSample {
                    labels: label_set,
                    timestamp_ms: timestamp
                        .map(|ts| timestamp_ms(format, ts))
                        .unwrap_or(default_timestamp_ms),
                    value,
                });
            }
            Line::Eof => has_eof = true,
            Line::Comment | Line::Empty => {}
        }
    }

    Ok(page)
}
