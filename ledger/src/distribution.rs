//! Monthly credit distribution job.
//!
//! Once a month every active user receives a free credit grant and a fresh
//! set of quota rows. The job is safe to re-run: each grant carries a
//! `free_{period}` reference id, so a second pass over the same month skips
//! users who were already granted instead of paying them twice.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use tally_core::{LedgerError, Period, Result, TransactionSource, UserId};
use tally_store::Store;

use crate::credit::CreditLedger;
use crate::quota::QuotaTracker;

/// Outcome of one distribution run.
#[derive(Debug, Clone, Serialize)]
pub struct DistributionReport {
    /// True when no user hit a hard error in either phase.
    pub success: bool,
    /// The month the run covered.
    pub period: Period,
    /// Users considered by the run.
    pub total_users: usize,
    /// Users granted credits this run.
    pub success_count: usize,
    /// Users already granted for this month.
    pub skipped_count: usize,
    /// Users whose grant failed.
    pub error_count: usize,
    /// Grant size per user.
    pub credits_per_user: i64,
    /// Credits actually granted this run.
    pub total_credits_distributed: i64,
    /// Users whose quota rows were refreshed.
    pub quota_update_success_count: usize,
    /// Users whose quota refresh failed.
    pub quota_update_error_count: usize,
    /// Per-user grant failures.
    pub errors: Vec<String>,
    /// Per-user quota refresh failures.
    pub quota_errors: Vec<String>,
}

/// Grants free monthly credits and refreshes quota rows for all users.
pub struct MonthlyDistribution<S> {
    store: Arc<S>,
    ledger: CreditLedger<S>,
    quota: QuotaTracker<S>,
}

impl<S: Store> MonthlyDistribution<S> {
    /// Create a distribution job over the given store.
    pub fn new(store: Arc<S>) -> Self {
        let ledger = CreditLedger::new(Arc::clone(&store));
        let quota = QuotaTracker::new(Arc::clone(&store));
        Self {
            store,
            ledger,
            quota,
        }
    }

    /// The reference id carried by every grant of the given month.
    #[must_use]
    pub fn grant_reference(period: Period) -> String {
        format!("free_{period}")
    }

    /// Run the distribution for one month.
    ///
    /// Phase one grants `credits_per_user` to every user without an
    /// active paid subscription; phase two refreshes quota rows for every
    /// user. A failure for one user is recorded in the report and the
    /// run continues with the next user.
    ///
    /// # Errors
    ///
    /// Returns an error only if the user list itself cannot be read;
    /// per-user failures are reported, not returned.
    pub fn run(&self, period: Period, credits_per_user: i64) -> Result<DistributionReport> {
        let profiles = self.store.list_profiles()?;

        // Phase A covers free-tier users only; a paid subscription already
        // carries its own grant. Phase B refreshes quota rows for everyone.
        let free_users: Vec<UserId> = profiles
            .iter()
            .filter(|p| !p.has_active_subscription())
            .map(|p| p.user_id)
            .collect();
        let all_users: Vec<UserId> = profiles.iter().map(|p| p.user_id).collect();

        info!(%period, total_users = free_users.len(), credits_per_user, "starting monthly distribution");

        let reference_id = Self::grant_reference(period);
        let description = format!("Free monthly credits for {period}");

        let mut report = DistributionReport {
            success: true,
            period,
            total_users: free_users.len(),
            success_count: 0,
            skipped_count: 0,
            error_count: 0,
            credits_per_user,
            total_credits_distributed: 0,
            quota_update_success_count: 0,
            quota_update_error_count: 0,
            errors: Vec::new(),
            quota_errors: Vec::new(),
        };

        for user_id in &free_users {
            match self.ledger.earn(
                user_id,
                credits_per_user,
                TransactionSource::Subscription,
                Some(description.clone()),
                Some(reference_id.clone()),
            ) {
                Ok(_) => {
                    report.success_count += 1;
                    report.total_credits_distributed += credits_per_user;
                }
                Err(LedgerError::DuplicateReference { .. }) => {
                    report.skipped_count += 1;
                }
                Err(e) => {
                    warn!(%user_id, error = %e, "monthly grant failed");
                    report.error_count += 1;
                    report.errors.push(format!("{user_id}: {e}"));
                }
            }
        }

        for user_id in &all_users {
            match self.quota.initialize_for_user(user_id, period) {
                Ok(()) => report.quota_update_success_count += 1,
                Err(e) => {
                    warn!(%user_id, error = %e, "quota refresh failed");
                    report.quota_update_error_count += 1;
                    report.quota_errors.push(format!("{user_id}: {e}"));
                }
            }
        }

        report.success = report.error_count == 0 && report.quota_update_error_count == 0;

        info!(
            %period,
            granted = report.success_count,
            skipped = report.skipped_count,
            failed = report.error_count,
            "monthly distribution finished"
        );

        Ok(report)
    }
}
