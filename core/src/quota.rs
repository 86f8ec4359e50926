//! Quota usage types for tally.
//!
//! Quota rows are a parallel metering mechanism alongside the credit
//! ledger: one numeric accumulator per user, service, and calendar month.
//! They share no invariant with credit accounts.

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{QuotaRecordId, UserId};

/// A metered service tracked by the quota system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaService {
    /// Metered API calls.
    ApiCall,

    /// Storage volume.
    Storage,

    /// Custom service.
    Custom(String),
}

impl QuotaService {
    /// Get the service name as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ApiCall => "api_call",
            Self::Storage => "storage",
            Self::Custom(name) => name,
        }
    }

    /// Services that get a zero-valued row on initialization.
    pub const TRACKED: [Self; 2] = [Self::ApiCall, Self::Storage];
}

impl fmt::Display for QuotaService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A calendar-month accounting period, rendered `YYYY-MM`.
///
/// Periods are always computed in UTC so that every node in a handler pool
/// agrees on the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    /// The current period in the UTC calendar.
    #[must_use]
    pub fn current() -> Self {
        let now = Utc::now();
        Self {
            year: now.year(),
            month: now.month(),
        }
    }

    /// Build a period from a year and a 1-based month.
    ///
    /// # Errors
    ///
    /// Returns `PeriodError` if `month` is not in `1..=12`.
    pub fn from_ym(year: i32, month: u32) -> Result<Self, PeriodError> {
        if (1..=12).contains(&month) {
            Ok(Self { year, month })
        } else {
            Err(PeriodError::InvalidMonth(month))
        }
    }

    /// The period's year.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// The period's month (1-based).
    #[must_use]
    pub const fn month(&self) -> u32 {
        self.month
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s.split_once('-').ok_or(PeriodError::InvalidFormat)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(PeriodError::InvalidFormat);
        }
        let year: i32 = year.parse().map_err(|_| PeriodError::InvalidFormat)?;
        let month: u32 = month.parse().map_err(|_| PeriodError::InvalidFormat)?;
        Self::from_ym(year, month)
    }
}

impl TryFrom<String> for Period {
    type Error = PeriodError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

/// Errors that can occur when parsing a period.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeriodError {
    /// The input is not `YYYY-MM`.
    #[error("invalid period format, expected YYYY-MM")]
    InvalidFormat,

    /// The month is out of range.
    #[error("invalid month: {0}")]
    InvalidMonth(u32),
}

/// Accumulated usage for one user, service, and period.
///
/// Unique per `(user_id, service, period)`. Rows are created lazily on
/// first increment or eagerly by initialization; a reset zeroes
/// `used_amount` without deleting the row, and a new period implies a new
/// row with no carry-over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaUsageRecord {
    /// Unique record ID.
    pub id: QuotaRecordId,

    /// The user this row meters.
    pub user_id: UserId,

    /// The metered service.
    pub service: QuotaService,

    /// The accounting period.
    pub period: Period,

    /// Usage accumulated within the period. Never negative.
    pub used_amount: i64,

    /// When the row was created.
    pub created_at: chrono::DateTime<Utc>,

    /// When the row was last updated.
    pub updated_at: chrono::DateTime<Utc>,
}

impl QuotaUsageRecord {
    /// Create a fresh row with the given starting amount.
    #[must_use]
    pub fn new(user_id: UserId, service: QuotaService, period: Period, used_amount: i64) -> Self {
        let now = Utc::now();
        Self {
            id: QuotaRecordId::generate(),
            user_id,
            service,
            period,
            used_amount,
            created_at: now,
            updated_at: now,
        }
    }
}
