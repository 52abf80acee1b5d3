//! Day-granularity SM-2 scheduling
//!
//! Four grades drive every transition:
//! - Again: the card was forgotten; it lapses and comes back tomorrow
//! - Hard: recalled with effort; interval grows slowly and ease drops
//! - Good: normal recall; interval grows by the ease factor
//! - Easy: effortless recall; interval jumps and ease rises
//!
//! Ease lives in [1.3, 3.5]. Intervals are whole days and the due date is
//! advanced by calendar days, so the time of day of the review is kept.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::models::{CardState, CardStatus, MIN_EASE};

/// Highest ease reachable through easy grades
const MAX_EASE: f64 = 3.5;

const AGAIN_EASE_PENALTY: f64 = 0.2;
const HARD_EASE_PENALTY: f64 = 0.15;
const EASY_EASE_BONUS: f64 = 0.15;
const HARD_INTERVAL_FACTOR: f64 = 1.2;
const EASY_INTERVAL_BONUS: f64 = 0.2;

const GRADUATING_INTERVAL: u32 = 1;
const SECOND_INTERVAL: u32 = 6;
const EASY_FIRST_INTERVAL: u32 = 4;

/// Review outcome chosen by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Again,
    Hard,
    Good,
    Easy,
}

impl Grade {
    pub const ALL: [Grade; 4] = [Grade::Again, Grade::Hard, Grade::Good, Grade::Easy];

    /// Map a UI rating (1-4: Again, Hard, Good, Easy) to a grade
    pub fn from_rating(rating: i32) -> Result<Self, InvalidGradeError> {
        match rating {
            1 => Ok(Self::Again),
            2 => Ok(Self::Hard),
            3 => Ok(Self::Good),
            4 => Ok(Self::Easy),
            other => Err(InvalidGradeError(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Again => "again",
            Self::Hard => "hard",
            Self::Good => "good",
            Self::Easy => "easy",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = InvalidGradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "again" => Ok(Self::Again),
            "hard" => Ok(Self::Hard),
            "good" => Ok(Self::Good),
            "easy" => Ok(Self::Easy),
            _ => Err(InvalidGradeError(s.to_string())),
        }
    }
}

/// Raised when untyped input does not name one of the four grades
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid grade: {0:?} (expected again, hard, good or easy)")]
pub struct InvalidGradeError(pub String);

/// Compute the state of a card after it is graded at `now`
///
/// Every right-hand side reads the state before the review. The returned
/// state is always in review status with an interval of at least one day.
pub fn schedule<Tz: TimeZone>(card: &CardState, grade: Grade, now: DateTime<Tz>) -> CardState {
    let mut next = card.clone();

    match grade {
        Grade::Again => {
            next.lapses = card.lapses.saturating_add(1);
            next.reps = 0;
            next.ease = (card.ease - AGAIN_EASE_PENALTY).max(MIN_EASE);
            next.interval = 1;
        }
        Grade::Hard => {
            next.reps = card.reps.saturating_add(1);
            next.ease = (card.ease - HARD_EASE_PENALTY).max(MIN_EASE);
            next.interval = scaled_interval(card.interval.max(1), HARD_INTERVAL_FACTOR);
        }
        Grade::Good => {
            next.reps = card.reps.saturating_add(1);
            next.interval = match card.reps {
                0 => GRADUATING_INTERVAL,
                1 => SECOND_INTERVAL,
                _ => scaled_interval(card.interval, card.ease),
            };
        }
        Grade::Easy => {
            next.reps = card.reps.saturating_add(1);
            next.ease = (card.ease + EASY_EASE_BONUS).min(MAX_EASE);
            next.interval = match card.reps {
                0 => EASY_FIRST_INTERVAL,
                _ => scaled_interval(card.interval, card.ease + EASY_INTERVAL_BONUS),
            };
        }
    }

    next.due = add_days(now, next.interval);
    next.status = CardStatus::Review;
    next
}

/// `max(1, round(interval * factor))`, saturating at `u32::MAX`
fn scaled_interval(interval: u32, factor: f64) -> u32 {
    let scaled = (interval as f64 * factor).round();
    if scaled >= u32::MAX as f64 {
        u32::MAX
    } else {
        (scaled as u32).max(1)
    }
}

/// Advance `now` by whole calendar days in its own time zone
///
/// A wall time repeated by a backward transition resolves to its earlier
/// instant. A wall time skipped by a forward transition falls back to the
/// same number of elapsed days. Only arithmetic overflow saturates.
fn add_days<Tz: TimeZone>(now: DateTime<Tz>, days: u32) -> DateTime<Utc> {
    let Some(target) = now.naive_local().checked_add_days(Days::new(days as u64)) else {
        return DateTime::<Utc>::MAX_UTC;
    };

    match now.timezone().from_local_datetime(&target).earliest() {
        Some(due) => due.with_timezone(&Utc),
        None => now
            .with_timezone(&Utc)
            .checked_add_signed(Duration::days(i64::from(days)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC),
    }
}

/// Intervals each grade would produce, in again, hard, good, easy order
///
/// Used to label grade buttons before the user answers.
pub fn preview_intervals<Tz: TimeZone>(card: &CardState, now: DateTime<Tz>) -> [u32; 4] {
    Grade::ALL.map(|grade| schedule(card, grade, now.clone()).interval)
}

/// Format an interval in days to a human-readable string
pub fn format_interval(days: u32) -> String {
    if days == 0 {
        "now".to_string()
    } else if days < 7 {
        format!("{}d", days)
    } else if days < 30 {
        format!("{}w", days / 7)
    } else if days < 365 {
        format!("{}mo", days / 30)
    } else {
        format!("{}y", days / 365)
    }
}
