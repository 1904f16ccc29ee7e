//! Core domain model for the Wordle stats tracker.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Guess count recorded for a puzzle the player did not finish.
pub const DNF_GUESSES: u8 = 7;
/// Highest guess count that still counts as a solve.
pub const MAX_SOLVE_GUESSES: u8 = 6;

/// Date of puzzle #0 (June 19, 2021). Every puzzle date is derived from it.
pub fn puzzle_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 6, 19).expect("epoch is a valid calendar date")
}

/// `epoch + number days`, or `None` past the end of the calendar.
pub fn date_for_puzzle(number: u32) -> Option<NaiveDate> {
    puzzle_epoch().checked_add_days(Days::new(u64::from(number)))
}

/// Inverse of [`date_for_puzzle`]; dates before the epoch have no puzzle.
pub fn puzzle_number_for_date(date: NaiveDate) -> Option<u32> {
    let days = date.signed_duration_since(puzzle_epoch()).num_days();
    u32::try_from(days).ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("guess count {0} is outside 1..=7")]
    GuessesOutOfRange(i64),
    #[error("week {week} does not exist in ISO year {year}")]
    InvalidWeek { year: i32, week: u32 },
    #[error("month {month} is outside 1..=12 (year {year})")]
    InvalidMonth { year: i32, month: u32 },
    #[error("year {0} is outside the supported calendar")]
    InvalidYear(i32),
    #[error("cannot parse period scope from {0:?}")]
    UnparseablePeriod(String),
}

/// Error taxonomy shared by every ingestion stage.
///
/// Only [`IngestError::ImmutabilityViolation`] is fatal; the other kinds are
/// skipped, counted, and reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("malformed input at {location}: {detail}")]
    MalformedInput { location: String, detail: String },
    #[error("duplicate key {key}: {detail}")]
    DuplicateKey { key: String, detail: String },
    #[error("no puzzle exists for {date}")]
    MissingReference { date: NaiveDate },
    #[error("score for player {player_id} on puzzle #{puzzle_number} is immutable")]
    ImmutabilityViolation { player_id: Uuid, puzzle_number: u32 },
}

impl IngestError {
    pub fn malformed(location: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MalformedInput {
            location: location.into(),
            detail: detail.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ImmutabilityViolation { .. })
    }
}

/// Outcome of an idempotent create: either a fresh record or the one already stored.
#[derive(Debug, Clone, PartialEq)]
pub enum Upsert<T> {
    Created(T),
    AlreadyExisted(T),
}

impl<T> Upsert<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    pub fn record(&self) -> &T {
        match self {
            Self::Created(value) | Self::AlreadyExisted(value) => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Created(value) | Self::AlreadyExisted(value) => value,
        }
    }
}

/// A guess count in `1..=7`, where 7 means "did not finish".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Guesses(u8);

impl Guesses {
    pub const DNF: Guesses = Guesses(DNF_GUESSES);

    pub fn new(value: i64) -> Result<Self, ValueError> {
        match u8::try_from(value) {
            Ok(v @ 1..=DNF_GUESSES) => Ok(Self(v)),
            _ => Err(ValueError::GuessesOutOfRange(value)),
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_solve(self) -> bool {
        self.0 <= MAX_SOLVE_GUESSES
    }
}

impl TryFrom<u8> for Guesses {
    type Error = ValueError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(i64::from(value))
    }
}

impl From<Guesses> for u8 {
    fn from(value: Guesses) -> Self {
        value.0
    }
}

impl fmt::Display for Guesses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_solve() {
            write!(f, "{}", self.0)
        } else {
            f.write_str("DNF")
        }
    }
}

/// A tracked player. Created lazily the first time a name shows up in an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: Uuid,
    pub name: String,
    pub contact: String,
    pub created_at: DateTime<Utc>,
}

/// One day's puzzle. `number` and `date` are both unique and in 1:1 correspondence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Puzzle {
    pub number: u32,
    pub date: NaiveDate,
    pub word: String,
}

impl Puzzle {
    /// Builds the canonical puzzle for `number`, deriving its date from the epoch.
    pub fn numbered(number: u32, word: &str) -> Option<Self> {
        Some(Self {
            number,
            date: date_for_puzzle(number)?,
            word: word.trim().to_ascii_uppercase(),
        })
    }
}

/// Identity of a score: at most one exists per pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScoreKey {
    pub player_id: Uuid,
    pub puzzle_number: u32,
}

/// One player's immutable result on one puzzle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub id: Uuid,
    pub player_id: Uuid,
    pub puzzle_number: u32,
    pub guesses: Guesses,
    pub created_at: DateTime<Utc>,
}

impl Score {
    pub fn key(&self) -> ScoreKey {
        ScoreKey {
            player_id: self.player_id,
            puzzle_number: self.puzzle_number,
        }
    }
}

/// A score joined with the date of its puzzle, the shape aggregation reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatedScore {
    pub score: Score,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Week,
    Month,
    Year,
    AllTime,
}

impl PeriodType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
            Self::AllTime => "all_time",
        }
    }
}

/// Half-open `[start, end)` date window; a missing bound is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date < end)
    }
}

/// Aggregation window. Weeks are ISO-8601 weeks keyed by their ISO week-year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "period_type", rename_all = "snake_case")]
pub enum Period {
    Week { year: i32, week: u32 },
    Month { year: i32, month: u32 },
    Year { year: i32 },
    AllTime,
}

impl Period {
    pub fn week(year: i32, week: u32) -> Result<Self, ValueError> {
        NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
            .map(|_| Self::Week { year, week })
            .ok_or(ValueError::InvalidWeek { year, week })
    }

    pub fn month(year: i32, month: u32) -> Result<Self, ValueError> {
        let period = Self::Month { year, month };
        period.date_range().map(|_| period)
    }

    /// Both bounds of the year's window must be representable dates.
    pub fn year(year: i32) -> Result<Self, ValueError> {
        let period = Self::Year { year };
        period.date_range().map(|_| period)
    }

    /// The week, month, year and all-time scopes a date falls into.
    pub fn containing(date: NaiveDate) -> [Period; 4] {
        let iso = date.iso_week();
        [
            Self::Week {
                year: iso.year(),
                week: iso.week(),
            },
            Self::Month {
                year: date.year(),
                month: date.month(),
            },
            Self::Year { year: date.year() },
            Self::AllTime,
        ]
    }

    pub fn period_type(&self) -> PeriodType {
        match self {
            Self::Week { .. } => PeriodType::Week,
            Self::Month { .. } => PeriodType::Month,
            Self::Year { .. } => PeriodType::Year,
            Self::AllTime => PeriodType::AllTime,
        }
    }

    pub fn period_year(&self) -> Option<i32> {
        match self {
            Self::Week { year, .. } | Self::Month { year, .. } | Self::Year { year } => Some(*year),
            Self::AllTime => None,
        }
    }

    pub fn period_value(&self) -> Option<u32> {
        match self {
            Self::Week { week, .. } => Some(*week),
            Self::Month { month, .. } => Some(*month),
            Self::Year { .. } | Self::AllTime => None,
        }
    }

    pub fn date_range(&self) -> Result<DateRange, ValueError> {
        let (start, end) = match *self {
            Self::Week { year, week } => {
                let start = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
                    .ok_or(ValueError::InvalidWeek { year, week })?;
                let end = start
                    .checked_add_days(Days::new(7))
                    .ok_or(ValueError::InvalidWeek { year, week })?;
                (start, end)
            }
            Self::Month { year, month } => {
                let invalid = ValueError::InvalidMonth { year, month };
                let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or(invalid.clone())?;
                let end = if month == 12 {
                    new_year_after(year)
                } else {
                    NaiveDate::from_ymd_opt(year, month + 1, 1)
                }
                .ok_or(invalid)?;
                (start, end)
            }
            Self::Year { year } => {
                let start = NaiveDate::from_ymd_opt(year, 1, 1).ok_or(ValueError::InvalidYear(year))?;
                let end = new_year_after(year).ok_or(ValueError::InvalidYear(year))?;
                (start, end)
            }
            Self::AllTime => return Ok(DateRange::unbounded()),
        };
        Ok(DateRange {
            start: Some(start),
            end: Some(end),
        })
    }
}

/// January 1st of the following year, if it exists.
fn new_year_after(year: i32) -> Option<NaiveDate> {
    year.checked_add(1)
        .and_then(|next| NaiveDate::from_ymd_opt(next, 1, 1))
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Week { year, week } => write!(f, "{year}-W{week:02}"),
            Self::Month { year, month } => write!(f, "{year}-{month:02}"),
            Self::Year { year } => write!(f, "{year}"),
            Self::AllTime => f.write_str("all-time"),
        }
    }
}

impl FromStr for Period {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let unparseable = || ValueError::UnparseablePeriod(s.to_string());

        if matches!(
            trimmed.to_ascii_lowercase().as_str(),
            "all-time" | "all_time" | "alltime"
        ) {
            return Ok(Self::AllTime);
        }

        let (year, rest) = match trimmed.split_once('-') {
            Some((year, rest)) => (year, Some(rest)),
            None => (trimmed, None),
        };
        let year: i32 = year.parse().map_err(|_| unparseable())?;

        match rest {
            None => Self::year(year),
            Some(rest) => {
                if let Some(week) = rest.strip_prefix(['W', 'w']) {
                    Self::week(year, week.parse().map_err(|_| unparseable())?)
                } else {
                    Self::month(year, rest.parse().map_err(|_| unparseable())?)
                }
            }
        }
    }
}

/// Cache key: exactly one stats entry exists per player and period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatsKey {
    pub player_id: Uuid,
    pub period: Period,
}

/// Precomputed per-player summary for one period scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsCacheEntry {
    pub id: Uuid,
    pub player_id: Uuid,
    pub period: Period,
    pub games_played: u32,
    pub games_solved: u32,
    pub games_failed: u32,
    pub total_guesses: u32,
    pub average_guesses: Option<f64>,
    pub best_score: Option<Guesses>,
    /// Occurrences per guess count; keys 1..=7 are always present.
    pub distribution: BTreeMap<u8, u32>,
    pub is_winner: bool,
    pub last_computed: DateTime<Utc>,
}

impl StatsCacheEntry {
    pub fn key(&self) -> StatsKey {
        StatsKey {
            player_id: self.player_id,
            period: self.period,
        }
    }
}

/// Histogram with every guess count from 1 to 7 present, zero-filled.
pub fn empty_distribution() -> BTreeMap<u8, u32> {
    (1..=DNF_GUESSES).map(|g| (g, 0)).collect()
}
