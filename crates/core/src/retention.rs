//! Retention schedule arithmetic.
//!
//! Everything in this module is pure: dates in, dates out, no clock access
//! and no I/O. The lifecycle scanner supplies `now` explicitly so sweeps are
//! reproducible in tests.

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::status::DocumentStatus;

/// Years used for the `Permanent` category. Documents in this category are
/// never destroyed; past this nominal horizon they route to transfer.
const PERMANENT_YEARS: u32 = 999;

/// How far ahead of the retention end date a document becomes eligible for
/// archivist review.
const REVIEW_WINDOW_MONTHS: u32 = 6;

/// Statutory retention classification of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionCategory {
    /// Kept indefinitely; transferred to the permanent archive at end of the
    /// nominal horizon rather than destroyed.
    Permanent,
    /// Thirty-year retention.
    #[serde(rename = "30y")]
    Y30,
    /// Ten-year retention.
    #[serde(rename = "10y")]
    Y10,
    /// Five-year retention.
    #[serde(rename = "5y")]
    Y5,
    /// Three-year retention.
    #[serde(rename = "3y")]
    Y3,
}

impl RetentionCategory {
    /// Retention period in years.
    #[must_use]
    pub fn years(self) -> u32 {
        match self {
            Self::Permanent => PERMANENT_YEARS,
            Self::Y30 => 30,
            Self::Y10 => 10,
            Self::Y5 => 5,
            Self::Y3 => 3,
        }
    }

    /// The persisted string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::Y30 => "30y",
            Self::Y10 => "10y",
            Self::Y5 => "5y",
            Self::Y3 => "3y",
        }
    }

    /// Parse a stored category string, falling back to the ten-year default
    /// for anything unrecognized. Legacy rows carry free-form categories, so
    /// this is total rather than fallible.
    #[must_use]
    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "permanent" => Self::Permanent,
            "30y" => Self::Y30,
            "10y" => Self::Y10,
            "5y" => Self::Y5,
            "3y" => Self::Y3,
            _ => Self::Y10,
        }
    }
}

impl std::fmt::Display for RetentionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The disposition bucket a document falls into at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Retention expired, category permanent: transfer to the archive.
    Transfer,
    /// Retention expired, category not permanent: destroy.
    Destroy,
    /// Inside the review window and in active storage: flag for review.
    Review,
    /// No action due.
    None,
}

/// Derived retention dates for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionSchedule {
    /// The date retention ends and disposition becomes due.
    pub end_date: NaiveDate,
    /// The date the review window opens (six months before `end_date`).
    pub review_start: NaiveDate,
}

impl RetentionSchedule {
    /// Compute the schedule for a creation date and category.
    ///
    /// Month arithmetic clamps to the last valid day, so a document created
    /// on Feb 29 ends its retention on Feb 28 of a non-leap year.
    #[must_use]
    pub fn for_document(creation_date: NaiveDate, category: RetentionCategory) -> Self {
        let months = category.years() * 12;
        let end_date = creation_date
            .checked_add_months(Months::new(months))
            .unwrap_or(NaiveDate::MAX);
        let review_start = end_date
            .checked_sub_months(Months::new(REVIEW_WINDOW_MONTHS))
            .unwrap_or(end_date);
        Self {
            end_date,
            review_start,
        }
    }
}

/// Classify a document against its retention schedule.
///
/// Exactly one bucket is returned for any input. The caller (the lifecycle
/// scanner) is responsible for turning the bucket into a status transition.
#[must_use]
pub fn classify(
    status: DocumentStatus,
    category: RetentionCategory,
    creation_date: NaiveDate,
    now: NaiveDate,
) -> Disposition {
    let schedule = RetentionSchedule::for_document(creation_date, category);

    if now >= schedule.end_date {
        if category == RetentionCategory::Permanent {
            Disposition::Transfer
        } else {
            Disposition::Destroy
        }
    } else if now >= schedule.review_start && status == DocumentStatus::ActiveStorage {
        Disposition::Review
    } else {
        Disposition::None
    }
}
