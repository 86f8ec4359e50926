//! Error types for ledger operations.

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur in ledger and quota operations.
///
/// This is a closed set so that callers branch on the variant rather than
/// string-matching messages.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The request was malformed: non-positive amount, or an unfreeze
    /// exceeding the frozen balance.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Spend or freeze against a non-existent account. Debit paths never
    /// auto-create accounts.
    #[error("account not found: {user_id}")]
    AccountNotFound {
        /// The user ID that has no account.
        user_id: String,
    },

    /// Available balance below the requested amount.
    #[error("insufficient credits: available={available}, required={required}")]
    InsufficientCredits {
        /// Spendable balance at the time of the atomic check.
        available: i64,
        /// Amount the operation required.
        required: i64,
    },

    /// A transaction with this `(user, reference_id)` already exists.
    #[error("duplicate reference: {reference_id}")]
    DuplicateReference {
        /// The reference ID that was already used.
        reference_id: String,
    },

    /// Underlying persistence failure, wrapped with operation context.
    #[error("store error: {0}")]
    Store(String),
}
