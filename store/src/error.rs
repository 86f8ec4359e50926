//! Error types for tally storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// What kind of record was missing.
        entity: &'static str,
        /// The key that was looked up.
        id: String,
    },

    /// Available balance below the requested debit or reserve.
    #[error("insufficient credits: available={available}, required={required}")]
    InsufficientCredits {
        /// Spendable balance at the time of the atomic check.
        available: i64,
        /// Required amount.
        required: i64,
    },

    /// Frozen balance below the requested release.
    #[error("insufficient frozen balance: frozen={frozen}, required={required}")]
    InsufficientFrozen {
        /// Frozen balance at the time of the atomic check.
        frozen: i64,
        /// Required amount.
        required: i64,
    },

    /// Entry amount is not a positive number of credits.
    #[error("entry amount must be positive, got {amount}")]
    InvalidAmount {
        /// The rejected amount.
        amount: i64,
    },

    /// Applying the entry would push a balance counter past `i64::MAX`.
    #[error("balance overflow applying amount {amount}")]
    BalanceOverflow {
        /// The amount that overflowed.
        amount: i64,
    },

    /// A transaction with this `(user, reference_id)` already exists.
    #[error("duplicate reference: {reference_id}")]
    DuplicateReference {
        /// The reference ID that was already used.
        reference_id: String,
    },
}

impl From<StoreError> for tally_core::LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity: "account", id } => Self::AccountNotFound { user_id: id },
            StoreError::InsufficientCredits { available, required } => {
                Self::InsufficientCredits { available, required }
            }
            StoreError::InsufficientFrozen { frozen, required } => Self::Validation(format!(
                "unfreeze amount {required} exceeds frozen balance {frozen}"
            )),
            StoreError::DuplicateReference { reference_id } => {
                Self::DuplicateReference { reference_id }
            }
            err @ (StoreError::InvalidAmount { .. } | StoreError::BalanceOverflow { .. }) => {
                Self::Validation(err.to_string())
            }
            err @ (StoreError::Database(_)
            | StoreError::Serialization(_)
            | StoreError::NotFound { .. }) => Self::Store(err.to_string()),
        }
    }
}
