use crate::error::{CoreError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

const GRID_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");
const ISO_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]");
const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const ISO_INPUT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute][optional [:[second]]][optional [.[subsecond]]]"
);
const SPACED_INPUT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute][optional [:[second]]][optional [.[subsecond]]]"
);

/// Timestamp as stored for tracker records. Values are UTC wall-clock time
/// without an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AnalyticsDateTime(pub PrimitiveDateTime);

impl AnalyticsDateTime {
    pub fn new(datetime: PrimitiveDateTime) -> Self {
        Self(datetime)
    }

    pub fn from_date(date: Date) -> Self {
        Self(PrimitiveDateTime::new(date, Time::MIDNIGHT))
    }

    pub fn inner(&self) -> &PrimitiveDateTime {
        &self.0
    }

    pub fn date(&self) -> Date {
        self.0.date()
    }

    /// `yyyy-MM-dd HH:mm:ss.SSS`, the representation used for grid cells.
    pub fn to_grid_string(&self) -> Result<String> {
        Ok(self.0.format(GRID_FORMAT)?)
    }

    /// `yyyy-MM-ddTHH:mm:ss.SSS`, used for period boundaries in metadata.
    pub fn to_iso_string(&self) -> Result<String> {
        Ok(self.0.format(ISO_FORMAT)?)
    }

    pub fn to_date_string(&self) -> Result<String> {
        Ok(self.0.date().format(DATE_FORMAT)?)
    }
}

/// Parses a calendar date in `yyyy-MM-dd` form.
pub fn parse_date(s: &str) -> Result<Date> {
    Date::parse(s.trim(), DATE_FORMAT)
        .map_err(|e| CoreError::invalid_date_time(format!("Failed to parse date '{s}': {e}")))
}

pub fn format_date(date: Date) -> Result<String> {
    Ok(date.format(DATE_FORMAT)?)
}

impl fmt::Display for AnalyticsDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = self.0.format(ISO_FORMAT).map_err(|_| fmt::Error)?;
        write!(f, "{formatted}")
    }
}

impl FromStr for AnalyticsDateTime {
    type Err = CoreError;

    /// Accepts `yyyy-MM-dd`, `yyyy-MM-ddTHH:mm[:ss[.SSS]]` and the same with a
    /// space separator. A trailing `Z` is ignored.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_end_matches('Z');
        if trimmed.len() == 10 {
            return parse_date(trimmed).map(Self::from_date);
        }
        PrimitiveDateTime::parse(trimmed, ISO_INPUT)
            .or_else(|_| PrimitiveDateTime::parse(trimmed, SPACED_INPUT))
            .map(Self)
            .map_err(|e| {
                CoreError::invalid_date_time(format!("Failed to parse date/time '{s}': {e}"))
            })
    }
}

impl Serialize for AnalyticsDateTime {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let formatted = self.0.format(ISO_FORMAT).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&formatted)
    }
}

impl<'de> Deserialize<'de> for AnalyticsDateTime {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        AnalyticsDateTime::from_str(&s).map_err(serde::de::Error::custom)
    }
}

pub fn now_utc() -> AnalyticsDateTime {
    let now = OffsetDateTime::now_utc();
    AnalyticsDateTime(PrimitiveDateTime::new(now.date(), now.time()))
}
