//! `RocksDB` storage layer for tally.
//!
//! This crate provides persistent storage for credit accounts, the
//! append-only transaction log, quota usage rows, user profiles, and API
//! keys, using `RocksDB` with column families for indexing.
//!
//! # Concurrency contract
//!
//! Every compound mutation (`apply_entry`, `create_account_if_absent`, the
//! quota upserts) executes its read-check-write under a per-user lock and
//! commits all touched keys in a single `WriteBatch`. A crash leaves the
//! account in its pre- or post-state, never a hybrid, and two concurrent
//! spends against one account serialize on the lock so the availability
//! check always sees the latest committed balance.
//!
//! # Example
//!
//! ```no_run
//! use tally_store::{RocksStore, Store};
//! use tally_core::UserId;
//!
//! let store = RocksStore::open("/tmp/tally-db").unwrap();
//! let user_id = UserId::generate();
//! let account = store.create_account_if_absent(&user_id).unwrap();
//! assert_eq!(account.balance, 0);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod mem;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use mem::MemStore;
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};

use tally_core::{
    ApiKeyRecord, CreditAccount, CreditTransaction, LedgerEntry, Period, QuotaService,
    QuotaUsageRecord, TransactionId, UserId, UserProfile,
};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different
/// implementations (`RocksDB` for production, in-memory for testing).
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, user_id: &UserId) -> Result<Option<CreditAccount>>;

    /// Get the existing account for `user_id`, or create a zeroed one.
    ///
    /// Safe to call concurrently for a never-before-seen user: the race
    /// resolves to exactly one account row, and the losing caller receives
    /// the winner's row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn create_account_if_absent(&self, user_id: &UserId) -> Result<CreditAccount>;

    /// Apply one ledger entry atomically: re-read the account, enforce the
    /// entry's balance checks, mutate the account, and append the
    /// transaction (plus its indexes) in one commit.
    ///
    /// Returns the created transaction, whose `balance_after` is the
    /// committed balance.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientCredits` if a debit or reserve exceeds
    ///   the available balance.
    /// - `StoreError::InsufficientFrozen` if a release exceeds the frozen
    ///   balance.
    /// - `StoreError::DuplicateReference` if the entry carries a
    ///   `reference_id` already used for this user.
    fn apply_entry(&self, user_id: &UserId, entry: &LedgerEntry) -> Result<CreditTransaction>;

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    /// Get a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<CreditTransaction>>;

    /// List transactions for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>>;

    /// Find a user's transaction by its reference ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_transaction_by_reference(
        &self,
        user_id: &UserId,
        reference_id: &str,
    ) -> Result<Option<CreditTransaction>>;

    // =========================================================================
    // Quota Operations
    // =========================================================================

    /// Increment the usage row for `(user, service, period)` by `delta`,
    /// creating the row with `used_amount = delta` if absent. Atomic per
    /// user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn upsert_quota_usage(
        &self,
        user_id: &UserId,
        service: &QuotaService,
        period: Period,
        delta: i64,
    ) -> Result<QuotaUsageRecord>;

    /// Get the usage row for `(user, service, period)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_quota_usage(
        &self,
        user_id: &UserId,
        service: &QuotaService,
        period: Period,
    ) -> Result<Option<QuotaUsageRecord>>;

    /// List all of a user's usage rows in a period.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_quota_usage(&self, user_id: &UserId, period: Period) -> Result<Vec<QuotaUsageRecord>>;

    /// Set `used_amount` to zero on all of a user's rows in the period.
    /// Rows are kept, not deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn reset_quota_usage(&self, user_id: &UserId, period: Period) -> Result<()>;

    /// Ensure a zero-valued row exists for `(user, service, period)`.
    /// Existing rows are left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn init_quota_usage(
        &self,
        user_id: &UserId,
        service: &QuotaService,
        period: Period,
    ) -> Result<()>;

    // =========================================================================
    // Profile Operations
    // =========================================================================

    /// Insert or update a user profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_profile(&self, profile: &UserProfile) -> Result<()>;

    /// Get a user profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_profile(&self, user_id: &UserId) -> Result<Option<UserProfile>>;

    /// List all user profiles.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_profiles(&self) -> Result<Vec<UserProfile>>;

    // =========================================================================
    // API Key Operations
    // =========================================================================

    /// Insert or update an API key record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_api_key(&self, key: &ApiKeyRecord) -> Result<()>;

    /// Look up an API key by the hex-encoded SHA-256 of its plaintext.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>>;

    /// Update a key's `last_used_at`. Best-effort bookkeeping, not part of
    /// any spend's atomic unit; missing keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn touch_api_key(&self, key_hash: &str, now: DateTime<Utc>) -> Result<()>;
}
