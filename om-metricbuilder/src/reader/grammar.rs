#[allow(unused)]
use tracing::{debug, error, info, span, trace, warn, Instrument, Level};

use nom::{
    branch::alt,
    bytes::complete::{escaped, tag, tag_no_case, take_while},
    character::complete::{anychar, char, satisfy, space0},
    combinator::{opt, peek, value},
    sequence::{delimited, preceded, tuple},
    IResult,
};

/// ```abnf
/// ; Any unicode character, except newline, double quote, and backslash
/// normal-char = %x00-09 / %x0B-21 / %x23-5B / %x5D-D7FF / %xE000-10FFFF
/// ```
fn is_normal_char(c: char) -> bool {
    !matches!(c, '\n' | '"' | '\\')
}

/// A run of one or more characters that need no escaping
fn normal_char1(input: &str) -> IResult<&str, &str> {
    nom::InputTakeAtPosition::split_at_position1_complete(
        &input,
        |item| !is_normal_char(item),
        nom::error::ErrorKind::AlphaNumeric,
    )
}

/// The raw (still escaped) body of a quoted label value or help text.
pub(super) fn escaped_string1(input: &str) -> IResult<&str, &str> {
    escaped(normal_char1, '\\', anychar)(input)
}

/// ```abnf
/// metricname = metricname-initial-char 0*metricname-char
///
/// metricname-char = metricname-initial-char / DIGIT
/// metricname-initial-char = ALPHA / "_" / ":"
/// ```
pub(super) fn metric_name1(input: &str) -> IResult<&str, &str> {
    peek(satisfy(|c| c.is_ascii_alphabetic() || c == '_' || c == ':'))(input)?;

    take_while(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == ':')(input)
}

/// ```abnf
/// label-name = label-name-initial-char *label-name-char
///
/// label-name-char = label-name-initial-char / DIGIT
/// label-name-initial-char = ALPHA / "_"
/// ```
pub(super) fn label_name1(input: &str) -> IResult<&str, &str> {
    peek(satisfy(|c| c.is_ascii_alphabetic() || c == '_'))(input)?;

    take_while(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

/// `name="value"`, the value still escaped.  An empty value comes back as `None`.
pub(super) fn label(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    let (input, (name, _, _, _, value)) = tuple((
        label_name1,
        space0,
        char('='),
        space0,
        delimited(char('"'), opt(escaped_string1), char('"')),
    ))(input)?;

    Ok((input, (name, value)))
}

/// A sample value, including the spellings of the special values.
pub(super) fn floatlike(input: &str) -> IResult<&str, f64> {
    alt((
        value(f64::NAN, tag_no_case("NaN")),
        value(
            f64::NEG_INFINITY,
            preceded(tag("-"), alt((tag_no_case("Infinity"), tag_no_case("Inf")))),
        ),
        value(
            f64::INFINITY,
            preceded(
                opt(tag("+")),
                alt((tag_no_case("Infinity"), tag_no_case("Inf"))),
            ),
        ),
        nom::number::complete::double,
    ))(input)
}

/// A finite timestamp, no special values allowed.
pub(super) fn timestamp(input: &str) -> IResult<&str, f64> {
    let (rest, ts) = nom::number::complete::double(input)?;
    if ts.is_finite() {
        Ok((rest, ts))
    } else {
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Float,
        )))
    }
}
