//! Signup account bootstrap.
//!
//! Runs when a user first signs in: creates the credit account, grants the
//! one-time signup bonus, and seeds quota rows for the current month. The
//! grant carries a `signup_{user_id}` reference, so the whole flow is
//! idempotent no matter how many times signup fires for the same user.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use tally_core::{
    CreditAccount, LedgerError, Period, Result, TransactionSource, UserId,
};
use tally_store::Store;

use crate::credit::CreditLedger;
use crate::quota::QuotaTracker;

/// Transient-failure retries per bootstrap call.
const MAX_ATTEMPTS: u32 = 3;
/// Backoff unit between attempts, scaled linearly by attempt number.
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Result of a bootstrap call.
#[derive(Debug, Clone)]
pub struct BootstrapOutcome {
    /// The account after bootstrap.
    pub account: CreditAccount,
    /// Signup credits granted by this call (zero on repeat calls).
    pub signup_credits_granted: i64,
    /// Whether this call created the account.
    pub is_new_account: bool,
}

/// Idempotent signup initialization service.
pub struct AccountBootstrap<S> {
    ledger: CreditLedger<S>,
    quota: QuotaTracker<S>,
    signup_bonus: i64,
}

impl<S: Store> AccountBootstrap<S> {
    /// Create a bootstrap service granting `signup_bonus` credits to new
    /// accounts.
    pub fn new(store: Arc<S>, signup_bonus: i64) -> Self {
        Self {
            ledger: CreditLedger::new(Arc::clone(&store)),
            quota: QuotaTracker::new(store),
            signup_bonus,
        }
    }

    /// The reference id carried by a user's signup grant.
    #[must_use]
    pub fn signup_reference(user_id: &UserId) -> String {
        format!("signup_{user_id}")
    }

    /// Ensure the user has an account, a signup grant, and quota rows.
    ///
    /// Transient store failures are retried up to [`MAX_ATTEMPTS`] times
    /// with linear backoff. Quota seeding is best-effort: a failure there
    /// is logged but does not fail the signup.
    ///
    /// # Errors
    ///
    /// Returns the last error if every attempt fails.
    pub async fn run(&self, user_id: &UserId) -> Result<BootstrapOutcome> {
        let mut last_error = None;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt(user_id) {
                Ok(outcome) => {
                    if let Err(e) = self.quota.initialize_for_user(user_id, Period::current()) {
                        warn!(%user_id, error = %e, "quota seeding failed during bootstrap");
                    }
                    return Ok(outcome);
                }
                // Only infrastructure failures are worth retrying.
                Err(e @ LedgerError::Store(_)) => {
                    warn!(%user_id, attempt, error = %e, "bootstrap attempt failed");
                    last_error = Some(e);
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            LedgerError::Store("bootstrap failed without a recorded error".to_owned())
        }))
    }

    fn attempt(&self, user_id: &UserId) -> Result<BootstrapOutcome> {
        let account = self.ledger.get_or_create_account(user_id)?;

        // An account is new when it has no transactions yet. If the history
        // read itself fails, fall back to the lifetime totals.
        let is_new = match self.ledger.get_transaction_history(user_id, 1, 0) {
            Ok((transactions, _)) => transactions.is_empty(),
            Err(e) => {
                warn!(%user_id, error = %e, "history read failed, falling back to totals");
                account.total_earned == 0 && account.total_spent == 0
            }
        };

        if !is_new {
            return Ok(BootstrapOutcome {
                account,
                signup_credits_granted: 0,
                is_new_account: false,
            });
        }

        match self.ledger.earn(
            user_id,
            self.signup_bonus,
            TransactionSource::Bonus,
            Some("Signup bonus".to_owned()),
            Some(Self::signup_reference(user_id)),
        ) {
            Ok(_) => {
                info!(%user_id, amount = self.signup_bonus, "signup bonus granted");
                let account = self.ledger.get_account(user_id)?;
                Ok(BootstrapOutcome {
                    account,
                    signup_credits_granted: self.signup_bonus,
                    is_new_account: true,
                })
            }
            // A concurrent signup won the race; this call changes nothing.
            Err(LedgerError::DuplicateReference { .. }) => {
                let account = self.ledger.get_account(user_id)?;
                Ok(BootstrapOutcome {
                    account,
                    signup_credits_granted: 0,
                    is_new_account: false,
                })
            }
            Err(e) => Err(e),
        }
    }
}
