//! Quota usage tracking service.
//!
//! Usage is recorded as one row per user, service, and calendar month.
//! Rows are created lazily on first use, so a missing row reads as zero
//! usage rather than an error.

use std::sync::Arc;

use tracing::info;

use tally_core::{Period, QuotaService, QuotaUsageRecord, Result, UserId};
use tally_store::Store;

/// Per-user, per-service, per-month usage counters.
pub struct QuotaTracker<S> {
    store: Arc<S>,
}

impl<S> Clone for QuotaTracker<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> QuotaTracker<S> {
    /// Create a tracker over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Add `delta` to the user's usage counter for `service`.
    ///
    /// Uses the current UTC month when `period` is `None`. The row is
    /// created on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn update_usage(
        &self,
        user_id: &UserId,
        service: &QuotaService,
        delta: i64,
        period: Option<Period>,
    ) -> Result<QuotaUsageRecord> {
        let period = period.unwrap_or_else(Period::current);
        let record = self
            .store
            .upsert_quota_usage(user_id, service, period, delta)?;
        Ok(record)
    }

    /// Read one usage counter. `None` means no usage was recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn get_usage_by_service(
        &self,
        user_id: &UserId,
        service: &QuotaService,
        period: Period,
    ) -> Result<Option<QuotaUsageRecord>> {
        Ok(self.store.get_quota_usage(user_id, service, period)?)
    }

    /// All of the user's usage rows for one month.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn get_usage_by_period(
        &self,
        user_id: &UserId,
        period: Period,
    ) -> Result<Vec<QuotaUsageRecord>> {
        Ok(self.store.list_quota_usage(user_id, period)?)
    }

    /// Zero the user's counters for one month, keeping the rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn reset_usage(&self, user_id: &UserId, period: Period) -> Result<()> {
        self.store.reset_quota_usage(user_id, period)?;
        info!(%user_id, %period, "quota usage reset");
        Ok(())
    }

    /// Create zeroed rows for every tracked service, leaving existing rows
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn initialize_for_user(&self, user_id: &UserId, period: Period) -> Result<()> {
        for service in &QuotaService::TRACKED {
            self.store.init_quota_usage(user_id, service, period)?;
        }
        Ok(())
    }
}
