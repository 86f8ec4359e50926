//! Key encoding utilities for `RocksDB`.
//!
//! This module provides functions for encoding and decoding the keys used
//! in column families.

use tally_core::{Period, QuotaService, TransactionId, UserId};

/// Create an account key from a user ID.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a transaction key from a transaction ID.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Create a user-transaction index key.
///
/// Format: `user_id (16 bytes) || transaction_id (16 bytes)`
///
/// Since ULIDs are time-ordered, transactions for a user sort by time.
#[must_use]
pub fn user_transaction_key(user_id: &UserId, transaction_id: &TransactionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Create a prefix for iterating all transactions for a user.
#[must_use]
pub fn user_transactions_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the transaction ID from a user-transaction index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_transaction_id_from_user_key(key: &[u8]) -> TransactionId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    TransactionId::from_bytes(bytes)
}

/// Create a reference index key.
///
/// Format: `user_id (16 bytes) || reference_id (UTF-8)`
#[must_use]
pub fn user_reference_key(user_id: &UserId, reference_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + reference_id.len());
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(reference_id.as_bytes());
    key
}

/// Create a quota usage key.
///
/// Format: `user_id (16 bytes) || period (7 bytes, "YYYY-MM") || service`
#[must_use]
pub fn quota_key(user_id: &UserId, period: Period, service: &QuotaService) -> Vec<u8> {
    let period = period.to_string();
    let service = service.as_str();
    let mut key = Vec::with_capacity(16 + period.len() + service.len());
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(period.as_bytes());
    key.extend_from_slice(service.as_bytes());
    key
}

/// Create a prefix for iterating a user's quota rows in one period.
#[must_use]
pub fn quota_period_prefix(user_id: &UserId, period: Period) -> Vec<u8> {
    let period = period.to_string();
    let mut key = Vec::with_capacity(16 + period.len());
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(period.as_bytes());
    key
}

/// Create a profile key from a user ID.
#[must_use]
pub fn profile_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create an API key record key from a key hash.
#[must_use]
pub fn api_key_key(key_hash: &str) -> Vec<u8> {
    key_hash.as_bytes().to_vec()
}
