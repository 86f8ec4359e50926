//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Credit account records, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Credit transactions, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: transactions by user, keyed by `user_id || transaction_id`.
    /// Value is empty (index only).
    pub const TRANSACTIONS_BY_USER: &str = "transactions_by_user";

    /// Index: transaction by reference, keyed by `user_id || reference_id`.
    /// Value is the transaction ID. Enforces reference uniqueness per user.
    pub const TRANSACTIONS_BY_REFERENCE: &str = "transactions_by_reference";

    /// Quota usage rows, keyed by `user_id || period || service`.
    pub const QUOTA_USAGE: &str = "quota_usage";

    /// User profiles, keyed by `user_id`.
    pub const PROFILES: &str = "profiles";

    /// API key records, keyed by the hex SHA-256 of the plaintext key.
    pub const API_KEYS: &str = "api_keys";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_USER,
        cf::TRANSACTIONS_BY_REFERENCE,
        cf::QUOTA_USAGE,
        cf::PROFILES,
        cf::API_KEYS,
    ]
}
