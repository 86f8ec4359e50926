//! Credit transaction types for tally.
//!
//! Every mutation of a credit account appends exactly one transaction to
//! the log; the log is append-only and reconstructs the account's lifetime
//! totals when summed by type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TransactionId, UserId};

/// Type of credit transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Credits added to the balance.
    Earn,

    /// Credits deducted from the balance.
    Spend,

    /// Credits returned after a spend. Affects the balance like an earn.
    Refund,

    /// Operator-initiated correction, positive or negative.
    AdminAdjust,

    /// Part of the balance reserved. Balance unchanged.
    Freeze,

    /// Reserved credits released. Balance unchanged.
    Unfreeze,
}

impl TransactionType {
    /// Check if this transaction type increases the balance.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(self, Self::Earn | Self::Refund)
    }

    /// Check if this transaction type decreases the balance.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        matches!(self, Self::Spend)
    }

    /// Check if this transaction type leaves the balance unchanged and only
    /// moves credits between the frozen and available portions.
    #[must_use]
    pub const fn is_reservation(&self) -> bool {
        matches!(self, Self::Freeze | Self::Unfreeze)
    }

    /// Get the type name as a string, matching its serialized form.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::Earn => "earn",
            Self::Spend => "spend",
            Self::Refund => "refund",
            Self::AdminAdjust => "admin_adjust",
            Self::Freeze => "freeze",
            Self::Unfreeze => "unfreeze",
        }
    }
}

/// Where a transaction originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionSource {
    /// Monthly subscription or free-tier grant.
    Subscription,

    /// Metered API call.
    ApiCall,

    /// Operator action.
    Admin,

    /// Storage metering.
    Storage,

    /// One-time promotional or signup bonus.
    Bonus,
}

impl TransactionSource {
    /// Get the source name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::Subscription => "subscription",
            Self::ApiCall => "api_call",
            Self::Admin => "admin",
            Self::Storage => "storage",
            Self::Bonus => "bonus",
        }
    }
}

/// How an entry moves credits, independent of how it is labelled in the
/// transaction log.
///
/// Most transaction types imply their effect; `admin_adjust` is recorded
/// under one label but may move the balance either way, so the effect is
/// carried explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryEffect {
    /// Balance and `total_earned` increase by the amount.
    Credit,

    /// Balance decreases and `total_spent` increases by the amount.
    /// Requires sufficient available balance.
    Debit,

    /// `frozen_balance` increases. Requires sufficient available balance.
    Reserve,

    /// `frozen_balance` decreases. Requires sufficient frozen balance.
    Release,
}

/// The parameters of a single ledger mutation.
///
/// An entry is validated by the credit ledger and then handed to the store,
/// which applies the account update and the transaction-log append as one
/// atomic unit.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    /// What kind of mutation this is.
    pub kind: TransactionType,

    /// How the mutation moves credits.
    pub effect: EntryEffect,

    /// Magnitude in credits. Always strictly positive; direction is
    /// implied by `kind`.
    pub amount: i64,

    /// Where the mutation originated.
    pub source: TransactionSource,

    /// Human-readable description, if any.
    pub description: Option<String>,

    /// External correlation key. Unique per `(user, reference_id)` at the
    /// store level, which is what makes referenced operations idempotent.
    pub reference_id: Option<String>,

    /// Additional opaque context.
    pub metadata: serde_json::Value,
}

impl LedgerEntry {
    /// Create an entry with the effect implied by its kind.
    ///
    /// `admin_adjust` defaults to a credit; use [`LedgerEntry::with_effect`]
    /// for a debiting adjustment.
    #[must_use]
    pub const fn new(kind: TransactionType, amount: i64, source: TransactionSource) -> Self {
        let effect = match kind {
            TransactionType::Earn | TransactionType::Refund | TransactionType::AdminAdjust => {
                EntryEffect::Credit
            }
            TransactionType::Spend => EntryEffect::Debit,
            TransactionType::Freeze => EntryEffect::Reserve,
            TransactionType::Unfreeze => EntryEffect::Release,
        };
        Self {
            kind,
            effect,
            amount,
            source,
            description: None,
            reference_id: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Override the entry's effect.
    #[must_use]
    pub const fn with_effect(mut self, effect: EntryEffect) -> Self {
        self.effect = effect;
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the reference id.
    #[must_use]
    pub fn with_reference(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    /// Set the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A credit transaction recording one account mutation.
///
/// Transactions use ULIDs for time-ordered ids and are immutable once
/// created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The user whose account was affected.
    pub user_id: UserId,

    /// Type of transaction.
    pub kind: TransactionType,

    /// Magnitude in credits, always positive.
    pub amount: i64,

    /// The account's `balance` immediately after this transaction was
    /// applied. For freeze/unfreeze the balance is unchanged; this records
    /// the balance at that moment, not the frozen amount.
    pub balance_after: i64,

    /// Where the transaction originated.
    pub source: TransactionSource,

    /// Human-readable description, if any.
    pub description: Option<String>,

    /// External correlation key, if any.
    pub reference_id: Option<String>,

    /// Additional opaque context.
    pub metadata: serde_json::Value,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    /// Build the transaction record for an applied entry.
    #[must_use]
    pub fn from_entry(user_id: UserId, entry: &LedgerEntry, balance_after: i64) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            kind: entry.kind,
            amount: entry.amount,
            balance_after,
            source: entry.source,
            description: entry.description.clone(),
            reference_id: entry.reference_id.clone(),
            metadata: entry.metadata.clone(),
            created_at: Utc::now(),
        }
    }
}
