//! Approximate dates known only to a coarse granularity.
//!
//! A [`FuzzyDate`] implies a half-open range of instants. Its approximate
//! instant is the calendar midpoint of that range and always lies inside it,
//! so ordering by approximate instant agrees with chronological order for any
//! two dates whose ranges do not overlap.
//!
//! | Granularity | Range                      | Approximate instant      |
//! |-------------|----------------------------|--------------------------|
//! | day         | the calendar day           | 12:00 that day           |
//! | month       | the full month             | the 15th, 00:00          |
//! | season      | three months from start    | 15th of the middle month |
//! | year        | the full year              | 1 July, 00:00            |
//! | decade      | ten years from a boundary  | 1 January of year five   |
//!
//! Season boundaries come from [`SeasonStarts`], which is configuration.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::TimeRange;
use crate::error::ErrorCode;

const MIN_YEAR: i32 = 1;
const MAX_YEAR: i32 = 9999;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a fuzzy date is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateError {
    #[error("unrecognized date {0:?}")]
    Malformed(String),

    #[error("year {0} is outside 1..=9999")]
    YearOutOfRange(i32),

    #[error("month {0} is outside 1..=12")]
    MonthOutOfRange(u32),

    #[error("{year:04}-{month:02}-{day:02} is not a calendar day")]
    InvalidDay { year: i32, month: u32, day: u32 },

    #[error("decade must start on a multiple of ten, got {0}")]
    DecadeBoundary(i32),

    #[error("unknown season {0:?}")]
    UnknownSeason(String),
}

impl DateError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::InvalidDate
    }
}

// ---------------------------------------------------------------------------
// Granularity and seasons
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Month,
    Season,
    Year,
    Decade,
}

impl Granularity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Month => "month",
            Self::Season => "season",
            Self::Year => "year",
            Self::Decade => "decade",
        }
    }

    /// Weight in `(0, 1]` expressing how sharply the date pins an instant.
    ///
    /// Used for centroid weighting and cluster confidence.
    #[must_use]
    pub const fn certainty(self) -> f64 {
        match self {
            Self::Day => 1.0,
            Self::Month => 0.6,
            Self::Season => 0.45,
            Self::Year => 0.25,
            Self::Decade => 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Season {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Winter => "winter",
            Self::Spring => "spring",
            Self::Summer => "summer",
            Self::Autumn => "autumn",
        }
    }
}

impl FromStr for Season {
    type Err = DateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "winter" => Ok(Self::Winter),
            "spring" => Ok(Self::Spring),
            "summer" => Ok(Self::Summer),
            "autumn" | "fall" => Ok(Self::Autumn),
            _ => Err(DateError::UnknownSeason(s.to_string())),
        }
    }
}

/// First month (1-12) of each season's three-month block.
///
/// A block whose start month is October or later spills into the next
/// calendar year, so `winter 2020` with the default mapping covers
/// December 2020 through February 2021.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeasonStarts {
    #[serde(default = "default_winter")]
    pub winter: u32,
    #[serde(default = "default_spring")]
    pub spring: u32,
    #[serde(default = "default_summer")]
    pub summer: u32,
    #[serde(default = "default_autumn")]
    pub autumn: u32,
}

impl Default for SeasonStarts {
    fn default() -> Self {
        Self {
            winter: default_winter(),
            spring: default_spring(),
            summer: default_summer(),
            autumn: default_autumn(),
        }
    }
}

impl SeasonStarts {
    #[must_use]
    pub const fn start_month(&self, season: Season) -> u32 {
        match season {
            Season::Winter => self.winter,
            Season::Spring => self.spring,
            Season::Summer => self.summer,
            Season::Autumn => self.autumn,
        }
    }

    /// Reject start months outside 1..=12.
    ///
    /// # Errors
    ///
    /// Returns [`DateError::MonthOutOfRange`] for the first bad month.
    pub fn validate(&self) -> Result<(), DateError> {
        for month in [self.winter, self.spring, self.summer, self.autumn] {
            if !(1..=12).contains(&month) {
                return Err(DateError::MonthOutOfRange(month));
            }
        }
        Ok(())
    }
}

const fn default_winter() -> u32 {
    12
}

const fn default_spring() -> u32 {
    3
}

const fn default_summer() -> u32 {
    6
}

const fn default_autumn() -> u32 {
    9
}

// ---------------------------------------------------------------------------
// FuzzyDate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Anchor {
    Day(NaiveDate),
    Month { year: i32, month: u32 },
    Season { year: i32, season: Season },
    Year(i32),
    Decade(i32),
}

/// A date known only to a coarse granularity.
///
/// Fields are validated at construction; an invalid `FuzzyDate` cannot be
/// built. Serializes as its canonical string form (`2020-07-15`, `2020-07`,
/// `summer 2020`, `2020`, `1990s`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FuzzyDate(Anchor);

impl FuzzyDate {
    /// # Errors
    ///
    /// Fails when the year is out of range or the day does not exist.
    pub fn day(year: i32, month: u32, day: u32) -> Result<Self, DateError> {
        check_year(year)?;
        check_month(month)?;
        NaiveDate::from_ymd_opt(year, month, day)
            .map(|date| Self(Anchor::Day(date)))
            .ok_or(DateError::InvalidDay { year, month, day })
    }

    /// # Errors
    ///
    /// Fails when the year or month is out of range.
    pub fn month(year: i32, month: u32) -> Result<Self, DateError> {
        check_year(year)?;
        check_month(month)?;
        Ok(Self(Anchor::Month { year, month }))
    }

    /// # Errors
    ///
    /// Fails when the year is out of range.
    pub fn season(year: i32, season: Season) -> Result<Self, DateError> {
        check_year(year)?;
        Ok(Self(Anchor::Season { year, season }))
    }

    /// # Errors
    ///
    /// Fails when the year is out of range.
    pub fn year(year: i32) -> Result<Self, DateError> {
        check_year(year)?;
        Ok(Self(Anchor::Year(year)))
    }

    /// A decade anchored at `start_year`, which must be a multiple of ten.
    ///
    /// # Errors
    ///
    /// Fails when the start year is out of range or not on a boundary.
    pub fn decade(start_year: i32) -> Result<Self, DateError> {
        check_year(start_year)?;
        if start_year % 10 != 0 {
            return Err(DateError::DecadeBoundary(start_year));
        }
        Ok(Self(Anchor::Decade(start_year)))
    }

    #[must_use]
    pub const fn granularity(&self) -> Granularity {
        match self.0 {
            Anchor::Day(_) => Granularity::Day,
            Anchor::Month { .. } => Granularity::Month,
            Anchor::Season { .. } => Granularity::Season,
            Anchor::Year(_) => Granularity::Year,
            Anchor::Decade(_) => Granularity::Decade,
        }
    }

    /// The `[earliest, latest)` range implied by this date.
    ///
    /// # Errors
    ///
    /// Fails only when `seasons` carries an invalid start month.
    pub fn comparison_range(&self, seasons: &SeasonStarts) -> Result<TimeRange, DateError> {
        let (start, end) = match self.0 {
            Anchor::Day(date) => {
                let next = date
                    .succ_opt()
                    .ok_or(DateError::YearOutOfRange(date.year()))?;
                (date, next)
            }
            Anchor::Month { year, month } => {
                let start = month_start(year, month)?;
                (start, add_months(year, month, 1)?)
            }
            Anchor::Season { year, season } => {
                let month = seasons.start_month(season);
                check_month(month)?;
                (month_start(year, month)?, add_months(year, month, 3)?)
            }
            Anchor::Year(year) => (month_start(year, 1)?, month_start(year + 1, 1)?),
            Anchor::Decade(year) => (month_start(year, 1)?, month_start(year + 10, 1)?),
        };
        Ok(TimeRange::new(midnight(start), midnight(end)))
    }

    /// Deterministic calendar midpoint of [`FuzzyDate::comparison_range`].
    ///
    /// # Errors
    ///
    /// Fails only when `seasons` carries an invalid start month.
    pub fn approximate_instant(&self, seasons: &SeasonStarts) -> Result<DateTime<Utc>, DateError> {
        let instant = match self.0 {
            Anchor::Day(date) => date.and_time(NaiveTime::MIN).and_utc() + chrono::Duration::hours(12),
            Anchor::Month { year, month } => midnight(day_of(year, month, 15)?),
            Anchor::Season { year, season } => {
                let month = seasons.start_month(season);
                check_month(month)?;
                let middle = add_months(year, month, 1)?;
                midnight(day_of(middle.year(), middle.month(), 15)?)
            }
            Anchor::Year(year) => midnight(day_of(year, 7, 1)?),
            Anchor::Decade(year) => midnight(day_of(year + 5, 1, 1)?),
        };
        Ok(instant)
    }
}

impl fmt::Display for FuzzyDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Anchor::Day(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Anchor::Month { year, month } => write!(f, "{year:04}-{month:02}"),
            Anchor::Season { year, season } => write!(f, "{} {year:04}", season.as_str()),
            Anchor::Year(year) => write!(f, "{year:04}"),
            Anchor::Decade(year) => write!(f, "{year:04}s"),
        }
    }
}

impl FromStr for FuzzyDate {
    type Err = DateError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let s = raw.trim();
        let malformed = || DateError::Malformed(raw.to_string());

        if let Some((season, year)) = s.split_once(char::is_whitespace) {
            let year = parse_year(year.trim()).ok_or_else(malformed)?;
            return Self::season(year, season.parse()?);
        }

        if let Some(decade) = s.strip_suffix('s') {
            let year = parse_year(decade).ok_or_else(malformed)?;
            return Self::decade(year);
        }

        let parts: Vec<&str> = s.split('-').collect();
        match parts.as_slice() {
            [year] => Self::year(parse_year(year).ok_or_else(malformed)?),
            [year, month] => Self::month(
                parse_year(year).ok_or_else(malformed)?,
                parse_field(month).ok_or_else(malformed)?,
            ),
            [year, month, day] => Self::day(
                parse_year(year).ok_or_else(malformed)?,
                parse_field(month).ok_or_else(malformed)?,
                parse_field(day).ok_or_else(malformed)?,
            ),
            _ => Err(malformed()),
        }
    }
}

impl TryFrom<String> for FuzzyDate {
    type Error = DateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FuzzyDate> for String {
    fn from(value: FuzzyDate) -> Self {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_year(s: &str) -> Option<i32> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn parse_field(s: &str) -> Option<u32> {
    if s.is_empty() || s.len() > 2 || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

const fn check_year(year: i32) -> Result<(), DateError> {
    if year < MIN_YEAR || year > MAX_YEAR {
        return Err(DateError::YearOutOfRange(year));
    }
    Ok(())
}

const fn check_month(month: u32) -> Result<(), DateError> {
    if month < 1 || month > 12 {
        return Err(DateError::MonthOutOfRange(month));
    }
    Ok(())
}

fn day_of(year: i32, month: u32, day: u32) -> Result<NaiveDate, DateError> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or(DateError::InvalidDay { year, month, day })
}

fn month_start(year: i32, month: u32) -> Result<NaiveDate, DateError> {
    day_of(year, month, 1)
}

/// First day of the month `offset` months after `year-month`.
fn add_months(year: i32, month: u32, offset: u32) -> Result<NaiveDate, DateError> {
    let zero_based = month - 1 + offset;
    let carry = i32::try_from(zero_based / 12).map_err(|_| DateError::MonthOutOfRange(month))?;
    month_start(year + carry, zero_based % 12 + 1)
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}
