//! Credit account types for tally.
//!
//! One `CreditAccount` exists per user and is mutated only through the
//! credit ledger's atomic store operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// A per-user credit account.
///
/// Invariants, maintained by the store's atomic apply:
///
/// - `balance == total_earned - total_spent` after every commit
/// - `0 <= frozen_balance <= balance`
///
/// Freezing reserves part of the balance without changing it; only the
/// unfrozen portion (`available`) is spendable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditAccount {
    /// The owning user. Unique: one account per user.
    pub user_id: UserId,

    /// Current balance in credits (spendable + frozen).
    pub balance: i64,

    /// Lifetime credits earned. Monotonically non-decreasing.
    pub total_earned: i64,

    /// Lifetime credits spent. Monotonically non-decreasing.
    pub total_spent: i64,

    /// Portion of `balance` reserved and unavailable for spending.
    pub frozen_balance: i64,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl CreditAccount {
    /// Create a new account with all-zero fields.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance: 0,
            total_earned: 0,
            total_spent: 0,
            frozen_balance: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The spendable portion of the balance.
    #[must_use]
    pub const fn available(&self) -> i64 {
        self.balance - self.frozen_balance
    }

    /// Check whether the account can cover a spend of `amount` credits.
    #[must_use]
    pub const fn has_enough(&self, amount: i64) -> bool {
        self.available() >= amount
    }
}
