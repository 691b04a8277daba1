//! Temporal Expressions
//!
//! Parses the three time forms accepted in a query range:
//!
//! ```text
//! now()                  the current instant
//! -20h5m3s               a signed duration relative to now
//! 2019-08-28T22:00:00Z   an absolute UTC timestamp
//! ```
//!
//! Range durations accept an optional sign followed by one or more
//! `<decimal><unit>` groups, where the decimal may carry a fraction and the
//! unit is one of `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A bare `0` is
//! also accepted. This is wider than a Flux duration literal, which allows
//! neither fractions nor a leading `+`.
//!
//! Aggregate windows are rendered verbatim into the script, so they are held
//! to the Flux form: unsigned integer groups only (see [`window_duration`]).
//!
//! Absolute timestamps must match `YYYY-MM-DDThh:mm:ssZ` exactly, with every
//! field zero-padded to its full width.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while_m_n},
    character::complete::{char, digit0},
    combinator::{all_consuming, map_res, opt, value},
    multi::many1,
    sequence::{pair, preceded, tuple},
    IResult,
};

use crate::query::error::{QueryError, QueryResult};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

/// Literal for the current instant
pub const NOW_LITERAL: &str = "now()";

/// Layout of absolute timestamps (`YYYY-MM-DDThh:mm:ssZ`)
pub const UTC_LAYOUT: &str = "%Y-%m-%dT%H:%M:%SZ";

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SECOND: u128 = 1_000_000_000;

// Fraction digits past this point are below nanosecond resolution for every unit.
const MAX_FRACTION_DIGITS: usize = 18;

/// A parsed, not yet resolved, time expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeExpr {
    /// `now()`
    Now,
    /// Offset from now
    Relative(Duration),
    /// Fixed UTC instant
    Absolute(DateTime<Utc>),
}

impl TimeExpr {
    /// Parse text into one of the three forms, trying them in order
    pub fn parse(text: &str) -> QueryResult<Self> {
        if text == NOW_LITERAL {
            return Ok(Self::Now);
        }
        if let Ok(d) = parse_duration(text) {
            return Ok(Self::Relative(d));
        }
        if let Some(t) = parse_utc_timestamp(text) {
            return Ok(Self::Absolute(t));
        }
        Err(QueryError::MalformedTime(text.to_string()))
    }

    /// Anchor the expression at `now` without checking its direction
    pub fn at(&self, now: DateTime<Utc>) -> QueryResult<DateTime<Utc>> {
        match self {
            Self::Now => Ok(now),
            Self::Relative(d) => now
                .checked_add_signed(*d)
                .ok_or_else(|| QueryError::MalformedTime(format!("{} out of range", d))),
            Self::Absolute(t) => Ok(*t),
        }
    }
}

/// Resolve a time expression to an instant that is not in the future
///
/// `now()` always resolves to `now`. Relative and absolute forms must land
/// strictly before `now`, otherwise [`QueryError::FutureTime`] is returned.
pub fn resolve(text: &str, now: DateTime<Utc>) -> QueryResult<DateTime<Utc>> {
    let expr = TimeExpr::parse(text)?;
    let instant = expr.at(now)?;

    match expr {
        TimeExpr::Now => Ok(instant),
        _ if instant < now => Ok(instant),
        _ => Err(QueryError::FutureTime(text.to_string())),
    }
}

/// Parse a duration literal that must be strictly positive
pub fn positive_duration(text: &str) -> QueryResult<Duration> {
    let d = parse_duration(text)?;
    if d > Duration::zero() {
        Ok(d)
    } else {
        Err(QueryError::NonPositiveDuration(text.to_string()))
    }
}

/// Parse a window duration: strictly positive, integer groups, no sign
///
/// Fractions and a leading `+` are [`QueryError::MalformedTime`], since the
/// text is copied into the script as a Flux duration literal.
pub fn window_duration(text: &str) -> QueryResult<Duration> {
    if text.starts_with('+') || text.contains('.') {
        return Err(QueryError::MalformedTime(text.to_string()));
    }
    positive_duration(text)
}

/// Parse an absolute UTC timestamp in [`UTC_LAYOUT`]
///
/// Only the exact zero-padded shape is accepted; out-of-range fields
/// (month 13, second 60, ...) yield `None`.
pub fn parse_utc_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let (_, (year, _, month, _, day, _, hour, _, minute, _, second, _)) = all_consuming(tuple((
        four_digits,
        char('-'),
        two_digits,
        char('-'),
        two_digits,
        char('T'),
        two_digits,
        char(':'),
        two_digits,
        char(':'),
        two_digits,
        char('Z'),
    )))(text)
    .ok()?;

    let date = NaiveDate::from_ymd_opt(year as i32, month, day)?;
    let time = NaiveTime::from_hms_opt(hour, minute, second)?;
    Some(date.and_time(time).and_utc())
}

/// Render an instant in [`UTC_LAYOUT`]
pub fn format_utc(instant: DateTime<Utc>) -> String {
    instant.format(UTC_LAYOUT).to_string()
}

/// Parse a signed duration literal such as `-20h5m3s` or `1.5h`
pub fn parse_duration(text: &str) -> QueryResult<Duration> {
    let malformed = || QueryError::MalformedTime(text.to_string());

    let (rest, negative) = match parse_sign(text) {
        Ok(parsed) => parsed,
        Err(_) => return Err(malformed()),
    };

    if rest == "0" {
        return Ok(Duration::zero());
    }

    let (_, components) = all_consuming(many1(parse_component))(rest).map_err(|_| malformed())?;

    let mut total: u128 = 0;
    for component in &components {
        let nanos = component.nanos().ok_or_else(malformed)?;
        total = total.checked_add(nanos).ok_or_else(malformed)?;
    }

    let signed = if negative {
        -(total as i128)
    } else {
        total as i128
    };
    let nanos = i64::try_from(signed).map_err(|_| malformed())?;

    Ok(Duration::nanoseconds(nanos))
}

/// One `<decimal><unit>` group of a duration literal
#[derive(Debug, Clone, Copy)]
struct Component<'a> {
    whole: &'a str,
    fraction: &'a str,
    unit: u128,
}

impl Component<'_> {
    /// Nanoseconds represented by this group, `None` on overflow
    fn nanos(&self) -> Option<u128> {
        let whole: u128 = if self.whole.is_empty() {
            0
        } else {
            self.whole.parse::<u64>().ok()? as u128
        };
        let mut nanos = whole.checked_mul(self.unit)?;

        let digits = &self.fraction[..self.fraction.len().min(MAX_FRACTION_DIGITS)];
        if !digits.is_empty() {
            let numerator: u128 = digits.parse().ok()?;
            let scale = 10u128.pow(digits.len() as u32);
            nanos = nanos.checked_add(numerator * self.unit / scale)?;
        }

        if nanos > i64::MAX as u128 + 1 {
            return None;
        }
        Some(nanos)
    }
}

/// Parse the optional leading sign, returning `true` for negative
fn parse_sign(input: &str) -> IResult<&str, bool> {
    let (input, sign) = opt(alt((char('-'), char('+'))))(input)?;
    Ok((input, sign == Some('-')))
}

/// Parse a single `<decimal><unit>` group
fn parse_component(input: &str) -> IResult<&str, Component<'_>> {
    let (rest, (whole, fraction)) = pair(digit0, opt(preceded(char('.'), digit0)))(input)?;
    let fraction = fraction.unwrap_or("");

    if whole.is_empty() && fraction.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Digit,
        )));
    }

    let (rest, unit) = parse_unit(rest)?;
    Ok((rest, Component { whole, fraction, unit }))
}

fn four_digits(input: &str) -> IResult<&str, u32> {
    map_res(take_while_m_n(4, 4, |c: char| c.is_ascii_digit()), |s: &str| {
        s.parse::<u32>()
    })(input)
}

fn two_digits(input: &str) -> IResult<&str, u32> {
    map_res(take_while_m_n(2, 2, |c: char| c.is_ascii_digit()), |s: &str| {
        s.parse::<u32>()
    })(input)
}

/// Parse a unit suffix into its length in nanoseconds
fn parse_unit(input: &str) -> IResult<&str, u128> {
    alt((
        value(1, tag("ns")),
        value(NANOS_PER_MICRO, alt((tag("us"), tag("µs"), tag("μs")))),
        value(NANOS_PER_MILLI, tag("ms")),
        value(NANOS_PER_SECOND, tag("s")),
        value(60 * NANOS_PER_SECOND, tag("m")),
        value(3600 * NANOS_PER_SECOND, tag("h")),
    ))(input)
}
