//! Date and time narrow types.
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::classify::{Describer, Fit, Narrow};
use crate::descriptor::{Rejection, TypeDescriptor};
use crate::error::ClassifyError;

pub(crate) fn parse_datetime(text: &str) -> Result<DateTime<FixedOffset>, Rejection> {
    DateTime::parse_from_rfc3339(text)
        .map_err(|error| Rejection::new(format!("{text:?} is not an RFC 3339 date-time: {error}")))
}

/// `YYYY-MM-DD`; a full date-time is accepted and truncated to its date.
pub(crate) fn parse_date(text: &str) -> Result<NaiveDate, Rejection> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| parse_datetime(text).map(|dt| dt.date_naive()))
        .map_err(|_| Rejection::new(format!("{text:?} is not a date")))
}

pub(crate) fn from_unix_seconds(seconds: i64) -> Result<DateTime<Utc>, Rejection> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| Rejection::new(format!("{seconds} is outside the supported time range")))
}

impl Narrow for DateTime<FixedOffset> {
    type Source = String;

    fn narrow(source: String) -> Result<Self, Rejection> {
        parse_datetime(&source)
    }

    fn widen(&self) -> String {
        self.to_rfc3339()
    }
}

impl Fit for DateTime<FixedOffset> {
    fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
        cx.narrow::<Self>()
    }
}

impl Narrow for DateTime<Utc> {
    type Source = String;

    fn narrow(source: String) -> Result<Self, Rejection> {
        parse_datetime(&source).map(|dt| dt.with_timezone(&Utc))
    }

    fn widen(&self) -> String {
        self.to_rfc3339()
    }
}

impl Fit for DateTime<Utc> {
    fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
        cx.narrow::<Self>()
    }
}

impl Narrow for NaiveDate {
    type Source = String;

    fn narrow(source: String) -> Result<Self, Rejection> {
        parse_date(&source)
    }

    fn widen(&self) -> String {
        self.format("%Y-%m-%d").to_string()
    }
}

impl Fit for NaiveDate {
    fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
        cx.narrow::<Self>()
    }
}

/// A point in time given as Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub DateTime<Utc>);

impl Narrow for Timestamp {
    type Source = i64;

    fn narrow(source: i64) -> Result<Self, Rejection> {
        from_unix_seconds(source).map(Timestamp)
    }

    fn widen(&self) -> i64 {
        self.0.timestamp()
    }
}

impl Fit for Timestamp {
    fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
        cx.narrow::<Self>()
    }
}
