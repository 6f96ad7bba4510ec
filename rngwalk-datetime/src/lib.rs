//! Lexical parsing of the date, time and duration datatypes defined in
//! [XML Schema Part 2: Datatypes Second Edition](https://www.w3.org/TR/2004/REC-xmlschema-2-20041028/#isoformats).
//!
//! Every type implements [`FromStr`] and [`Display`](std::fmt::Display). Parsing checks both
//! the lexical form and the calendar: months are within `1..=12`, days fit their month
//! (leap years included), `24:00:00` is the only time with hour 24 and timezones stay
//! within `±14:00`.
//!
//! This crate does not implement the value space ordering of these types.

use std::{num::ParseIntError, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSegment {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    TimeZone,
    Duration,
}

impl std::fmt::Display for ErrorSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Year => write!(f, "year"),
            Self::Month => write!(f, "month"),
            Self::Day => write!(f, "day"),
            Self::Hour => write!(f, "hour"),
            Self::Minute => write!(f, "minute"),
            Self::Second => write!(f, "second"),
            Self::TimeZone => write!(f, "timezone"),
            Self::Duration => write!(f, "duration"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    NotEnoughDigits,
    FailedToParseInt(ParseIntError),
    TooLarge,
    TooSmall,
    InvalidFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateTimeError {
    segment: ErrorSegment,
    kind: ErrorKind,
}

impl DateTimeError {
    pub fn segment(&self) -> ErrorSegment {
        self.segment
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl std::fmt::Display for DateTimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ErrorKind::*;

        match self.kind {
            NotEnoughDigits => write!(f, "Not enough digits in the {}.", self.segment),
            FailedToParseInt(ref err) => {
                write!(f, "Failed to parse {} because '{err}'.", self.segment)
            }
            TooLarge => write!(f, "The {} is too large.", self.segment),
            TooSmall => write!(f, "The {} is too small.", self.segment),
            InvalidFormat => write!(f, "The format of {} is invalid.", self.segment),
        }
    }
}

impl std::error::Error for DateTimeError {}

macro_rules! datetime_error {
    ( $segment:ident, $kind:expr ) => {{
        #[allow(unused_imports)]
        use ErrorKind::*;
        use ErrorSegment::*;
        DateTimeError {
            segment: $segment,
            kind: $kind,
        }
    }};
}

/// Parse a field made of exactly `width` ASCII digits.
fn parse_fixed(s: &str, width: usize, segment: ErrorSegment) -> Result<u8, DateTimeError> {
    if s.len() < width {
        return Err(DateTimeError {
            segment,
            kind: ErrorKind::NotEnoughDigits,
        });
    }
    if s.len() != width || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DateTimeError {
            segment,
            kind: ErrorKind::InvalidFormat,
        });
    }
    s.parse().map_err(|err| DateTimeError {
        segment,
        kind: ErrorKind::FailedToParseInt(err),
    })
}

/// Split a trailing timezone (`Z` or `(+|-)hh:mm`) off `s`.
fn split_timezone(s: &str) -> Result<(&str, Option<TimeZone>), DateTimeError> {
    if let Some(body) = s.strip_suffix('Z') {
        return Ok((body, Some(TimeZone(0, 0))));
    }
    let bytes = s.as_bytes();
    if bytes.len() >= 6 {
        let at = bytes.len() - 6;
        if matches!(bytes[at], b'+' | b'-') && bytes[at + 3] == b':' {
            return Ok((&s[..at], Some(s[at..].parse()?)));
        }
    }
    Ok((s, None))
}

fn is_leap_year(year: i128) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

/// The number of days in `month`. If `year` is unknown, February has 29 days.
fn days_in_month(year: Option<i128>, month: u8) -> u8 {
    match month {
        2 => {
            if year.is_none_or(is_leap_year) {
                29
            } else {
                28
            }
        }
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct NaiveYear(i128);

impl std::fmt::Display for NaiveYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 < 0 {
            write!(f, "-{:04}", self.0.unsigned_abs())
        } else {
            write!(f, "{:04}", self.0)
        }
    }
}

impl FromStr for NaiveYear {
    type Err = DateTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('-').unwrap_or(s);
        if digits.len() < 4 {
            return Err(datetime_error!(Year, NotEnoughDigits));
        }
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(datetime_error!(Year, InvalidFormat));
        }
        // more than four digits may not start with a zero
        if digits.len() > 4 && digits.starts_with('0') {
            return Err(datetime_error!(Year, InvalidFormat));
        }

        s.parse()
            .map(Self)
            .map_err(|err| datetime_error!(Year, FailedToParseInt(err)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeZone(i8, u8);

impl TimeZone {
    /// The offset from UTC in minutes.
    pub fn offset_minutes(&self) -> i32 {
        let minutes = self.0.unsigned_abs() as i32 * 60 + self.1 as i32;
        if self.0 < 0 { -minutes } else { minutes }
    }
}

impl std::fmt::Display for TimeZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 == 0 && self.1 == 0 {
            write!(f, "Z")
        } else {
            write!(f, "{:+03}:{:02}", self.0, self.1)
        }
    }
}

impl FromStr for TimeZone {
    type Err = DateTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "Z" {
            return Ok(Self(0, 0));
        }

        let (hour, minute) = s
            .split_once(':')
            .ok_or(datetime_error!(TimeZone, InvalidFormat))?;
        if !hour.starts_with(['+', '-']) || hour.len() != 3 || minute.len() != 2 {
            return Err(datetime_error!(TimeZone, InvalidFormat));
        }
        let negative = hour.starts_with('-');
        let hour = parse_fixed(&hour[1..], 2, ErrorSegment::TimeZone)?;
        let minute = parse_fixed(minute, 2, ErrorSegment::TimeZone)?;

        if minute >= 60 {
            return Err(datetime_error!(TimeZone, TooLarge));
        }
        if hour > 14 || (hour == 14 && minute != 0) {
            return Err(if negative {
                datetime_error!(TimeZone, TooSmall)
            } else {
                datetime_error!(TimeZone, TooLarge)
            });
        }

        let hour = hour as i8;
        Ok(Self(if negative { -hour } else { hour }, minute))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct NaiveDate {
    year: NaiveYear,
    month: u8,
    day: u8,
}

impl std::fmt::Display for NaiveDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl FromStr for NaiveDate {
    type Err = DateTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = split_year(s)?;
        let (month, day) = month
            .split_once('-')
            .ok_or(datetime_error!(Day, InvalidFormat))?;
        let year = year.parse::<NaiveYear>()?;
        let month = parse_month(month)?;
        let day = parse_day(day, Some(year.0), Some(month))?;
        Ok(Self { year, month, day })
    }
}

/// Split `-?yyyy-rest` into the year and `rest`.
fn split_year(s: &str) -> Result<(&str, &str), DateTimeError> {
    let base = s.starts_with('-') as usize;
    let sep = s[base..]
        .find('-')
        .ok_or(datetime_error!(Month, InvalidFormat))?;
    Ok((&s[..base + sep], &s[base + sep + 1..]))
}

fn parse_month(s: &str) -> Result<u8, DateTimeError> {
    let month = parse_fixed(s, 2, ErrorSegment::Month)?;
    match month {
        0 => Err(datetime_error!(Month, TooSmall)),
        13.. => Err(datetime_error!(Month, TooLarge)),
        month => Ok(month),
    }
}

fn parse_day(s: &str, year: Option<i128>, month: Option<u8>) -> Result<u8, DateTimeError> {
    let day = parse_fixed(s, 2, ErrorSegment::Day)?;
    let max = month.map_or(31, |month| days_in_month(year, month));
    if day == 0 {
        Err(datetime_error!(Day, TooSmall))
    } else if day > max {
        Err(datetime_error!(Day, TooLarge))
    } else {
        Ok(day)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct NaiveTime {
    hour: u8,
    minute: u8,
    second: u8,
    /// Digits following the decimal point of the seconds, if any.
    fraction: Option<Box<str>>,
}

impl std::fmt::Display for NaiveTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)?;
        if let Some(fraction) = self.fraction.as_deref() {
            write!(f, ".{fraction}")?;
        }
        Ok(())
    }
}

impl FromStr for NaiveTime {
    type Err = DateTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.splitn(3, ':');
        let hour = fields
            .next()
            .ok_or(datetime_error!(Hour, InvalidFormat))?;
        let minute = fields
            .next()
            .ok_or(datetime_error!(Minute, InvalidFormat))?;
        let second = fields
            .next()
            .ok_or(datetime_error!(Second, InvalidFormat))?;

        let hour = parse_fixed(hour, 2, ErrorSegment::Hour)?;
        let minute = parse_fixed(minute, 2, ErrorSegment::Minute)?;
        let (second, fraction) = match second.split_once('.') {
            Some((second, fraction)) => {
                if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(datetime_error!(Second, InvalidFormat));
                }
                (second, Some(Box::<str>::from(fraction)))
            }
            None => (second, None),
        };
        let second = parse_fixed(second, 2, ErrorSegment::Second)?;

        if minute > 59 {
            return Err(datetime_error!(Minute, TooLarge));
        }
        if second > 59 {
            return Err(datetime_error!(Second, TooLarge));
        }
        if hour > 24
            || (hour == 24
                && (minute != 0
                    || second != 0
                    || fraction.as_deref().is_some_and(|f| f.bytes().any(|b| b != b'0'))))
        {
            return Err(datetime_error!(Hour, TooLarge));
        }

        Ok(Self {
            hour,
            minute,
            second,
            fraction,
        })
    }
}

fn write_timezone(
    f: &mut std::fmt::Formatter<'_>,
    tz: Option<&TimeZone>,
) -> std::fmt::Result {
    if let Some(tz) = tz {
        write!(f, "{tz}")?;
    }
    Ok(())
}

/// `xsd:dateTime`: `-?yyyy-mm-ddThh:mm:ss(.s+)?(zzzzzz)?`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateTime {
    date: NaiveDate,
    time: NaiveTime,
    tz: Option<TimeZone>,
}

impl std::fmt::Display for DateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}T{}", self.date, self.time)?;
        write_timezone(f, self.tz.as_ref())
    }
}

impl FromStr for DateTime {
    type Err = DateTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (body, tz) = split_timezone(s)?;
        let (date, time) = body
            .split_once('T')
            .ok_or(datetime_error!(Hour, InvalidFormat))?;
        Ok(Self {
            date: date.parse()?,
            time: time.parse()?,
            tz,
        })
    }
}

/// `xsd:time`: `hh:mm:ss(.s+)?(zzzzzz)?`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Time {
    time: NaiveTime,
    tz: Option<TimeZone>,
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.time)?;
        write_timezone(f, self.tz.as_ref())
    }
}

impl FromStr for Time {
    type Err = DateTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (body, tz) = split_timezone(s)?;
        Ok(Self {
            time: body.parse()?,
            tz,
        })
    }
}

/// `xsd:date`: `-?yyyy-mm-dd(zzzzzz)?`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Date {
    date: NaiveDate,
    tz: Option<TimeZone>,
}

impl std::fmt::Display for Date {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.date)?;
        write_timezone(f, self.tz.as_ref())
    }
}

impl FromStr for Date {
    type Err = DateTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (body, tz) = split_timezone(s)?;
        Ok(Self {
            date: body.parse()?,
            tz,
        })
    }
}

/// `xsd:gYearMonth`: `-?yyyy-mm(zzzzzz)?`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GYearMonth {
    year: NaiveYear,
    month: u8,
    tz: Option<TimeZone>,
}

impl std::fmt::Display for GYearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)?;
        write_timezone(f, self.tz.as_ref())
    }
}

impl FromStr for GYearMonth {
    type Err = DateTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (body, tz) = split_timezone(s)?;
        let (year, month) = split_year(body)?;
        Ok(Self {
            year: year.parse()?,
            month: parse_month(month)?,
            tz,
        })
    }
}

/// `xsd:gYear`: `-?yyyy(zzzzzz)?`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GYear {
    year: NaiveYear,
    tz: Option<TimeZone>,
}

impl std::fmt::Display for GYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.year)?;
        write_timezone(f, self.tz.as_ref())
    }
}

impl FromStr for GYear {
    type Err = DateTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, tz) = split_timezone(s)?;
        Ok(Self {
            year: year.parse()?,
            tz,
        })
    }
}

/// `xsd:gMonthDay`: `--mm-dd(zzzzzz)?`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GMonthDay {
    month: u8,
    day: u8,
    tz: Option<TimeZone>,
}

impl std::fmt::Display for GMonthDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "--{:02}-{:02}", self.month, self.day)?;
        write_timezone(f, self.tz.as_ref())
    }
}

impl FromStr for GMonthDay {
    type Err = DateTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (body, tz) = split_timezone(s)?;
        let (month, day) = body
            .strip_prefix("--")
            .and_then(|rest| rest.split_once('-'))
            .ok_or(datetime_error!(Month, InvalidFormat))?;
        let month = parse_month(month)?;
        Ok(Self {
            month,
            day: parse_day(day, None, Some(month))?,
            tz,
        })
    }
}

/// `xsd:gDay`: `---dd(zzzzzz)?`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GDay {
    day: u8,
    tz: Option<TimeZone>,
}

impl std::fmt::Display for GDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "---{:02}", self.day)?;
        write_timezone(f, self.tz.as_ref())
    }
}

impl FromStr for GDay {
    type Err = DateTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (body, tz) = split_timezone(s)?;
        let day = body
            .strip_prefix("---")
            .ok_or(datetime_error!(Day, InvalidFormat))?;
        Ok(Self {
            day: parse_day(day, None, None)?,
            tz,
        })
    }
}

/// `xsd:gMonth`: `--mm(zzzzzz)?`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GMonth {
    month: u8,
    tz: Option<TimeZone>,
}

impl std::fmt::Display for GMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "--{:02}", self.month)?;
        write_timezone(f, self.tz.as_ref())
    }
}

impl FromStr for GMonth {
    type Err = DateTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (body, tz) = split_timezone(s)?;
        let month = body
            .strip_prefix("--")
            .ok_or(datetime_error!(Month, InvalidFormat))?;
        Ok(Self {
            month: parse_month(month)?,
            tz,
        })
    }
}

/// `xsd:duration`: `-?PnYnMnDTnHnMnS`
///
/// At least one component must be present, and `T` must be followed by at least one
/// time component. Only the seconds may carry a fraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Duration {
    negative: bool,
    years: Option<u64>,
    months: Option<u64>,
    days: Option<u64>,
    hours: Option<u64>,
    minutes: Option<u64>,
    seconds: Option<Box<str>>,
}

impl std::fmt::Display for Duration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        write!(f, "P")?;
        for (value, designator) in [(self.years, 'Y'), (self.months, 'M'), (self.days, 'D')] {
            if let Some(value) = value {
                write!(f, "{value}{designator}")?;
            }
        }
        if self.hours.is_some() || self.minutes.is_some() || self.seconds.is_some() {
            write!(f, "T")?;
            for (value, designator) in [(self.hours, 'H'), (self.minutes, 'M')] {
                if let Some(value) = value {
                    write!(f, "{value}{designator}")?;
                }
            }
            if let Some(seconds) = self.seconds.as_deref() {
                write!(f, "{seconds}S")?;
            }
        }
        Ok(())
    }
}

impl FromStr for Duration {
    type Err = DateTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (negative, rest) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let rest = rest
            .strip_prefix('P')
            .ok_or(datetime_error!(Duration, InvalidFormat))?;
        let (date, time) = match rest.split_once('T') {
            Some((date, time)) => {
                if time.is_empty() {
                    return Err(datetime_error!(Duration, InvalidFormat));
                }
                (date, Some(time))
            }
            None => (rest, None),
        };

        let mut duration = Self {
            negative,
            years: None,
            months: None,
            days: None,
            hours: None,
            minutes: None,
            seconds: None,
        };

        // Components must appear in this order, each at most once.
        let mut expected = ['Y', 'M', 'D'].as_slice();
        for (value, designator) in components(date)? {
            let pos = expected
                .iter()
                .position(|&d| d == designator)
                .ok_or(datetime_error!(Duration, InvalidFormat))?;
            expected = &expected[pos + 1..];
            let value = parse_component(value)?;
            match designator {
                'Y' => duration.years = Some(value),
                'M' => duration.months = Some(value),
                _ => duration.days = Some(value),
            }
        }

        if let Some(time) = time {
            let mut expected = ['H', 'M', 'S'].as_slice();
            for (value, designator) in components(time)? {
                let pos = expected
                    .iter()
                    .position(|&d| d == designator)
                    .ok_or(datetime_error!(Duration, InvalidFormat))?;
                expected = &expected[pos + 1..];
                match designator {
                    'H' => duration.hours = Some(parse_component(value)?),
                    'M' => duration.minutes = Some(parse_component(value)?),
                    _ => {
                        let (int, fraction) = value.split_once('.').unwrap_or((value, "0"));
                        if int.is_empty()
                            || fraction.is_empty()
                            || !int.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit())
                        {
                            return Err(datetime_error!(Duration, InvalidFormat));
                        }
                        duration.seconds = Some(value.into());
                    }
                }
            }
        }

        if duration.years.is_none()
            && duration.months.is_none()
            && duration.days.is_none()
            && duration.hours.is_none()
            && duration.minutes.is_none()
            && duration.seconds.is_none()
        {
            return Err(datetime_error!(Duration, NotEnoughDigits));
        }
        Ok(duration)
    }
}

/// Split `nYnMnD` style text into `(n, designator)` pairs.
fn components(s: &str) -> Result<Vec<(&str, char)>, DateTimeError> {
    let mut ret = vec![];
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if c.is_ascii_alphabetic() {
            if i == start {
                return Err(datetime_error!(Duration, NotEnoughDigits));
            }
            ret.push((&s[start..i], c));
            start = i + 1;
        }
    }
    if start != s.len() {
        return Err(datetime_error!(Duration, InvalidFormat));
    }
    Ok(ret)
}

fn parse_component(s: &str) -> Result<u64, DateTimeError> {
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(datetime_error!(Duration, InvalidFormat));
    }
    s.parse()
        .map_err(|err| datetime_error!(Duration, FailedToParseInt(err)))
}
