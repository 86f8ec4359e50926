//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store`
//! trait. Compound mutations take a per-user mutex before their
//! read-check-write and commit every touched key in one `WriteBatch`:
//! either the balance update and the transaction append both land, or
//! neither does.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use tally_core::{
    ApiKeyRecord, CreditAccount, CreditTransaction, EntryEffect, LedgerEntry, Period, QuotaService,
    QuotaUsageRecord, TransactionId, UserId, UserProfile,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::Store;

/// `RocksDB`-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Per-user critical sections for compound read-modify-write ops.
    locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            locks: DashMap::new(),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Get the mutex guarding one user's compound operations.
    fn user_lock(&self, user_id: &UserId) -> Arc<Mutex<()>> {
        self.locks.entry(*user_id).or_default().clone()
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn put_account(&self, account: &CreditAccount) -> Result<()> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(&account.user_id);
        let value = Self::serialize(account)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    /// Apply the entry's effect to an in-memory account copy, enforcing the
    /// balance checks against the values read inside the critical section.
    fn apply_effect(account: &mut CreditAccount, entry: &LedgerEntry) -> Result<()> {
        if entry.amount <= 0 {
            return Err(StoreError::InvalidAmount {
                amount: entry.amount,
            });
        }
        let overflow = || StoreError::BalanceOverflow {
            amount: entry.amount,
        };
        match entry.effect {
            EntryEffect::Credit => {
                account.balance = account.balance.checked_add(entry.amount).ok_or_else(overflow)?;
                account.total_earned = account
                    .total_earned
                    .checked_add(entry.amount)
                    .ok_or_else(overflow)?;
            }
            EntryEffect::Debit => {
                let available = account.available();
                if available < entry.amount {
                    return Err(StoreError::InsufficientCredits {
                        available,
                        required: entry.amount,
                    });
                }
                // The available check bounds the subtraction; only the
                // lifetime counter can overflow.
                account.balance -= entry.amount;
                account.total_spent = account
                    .total_spent
                    .checked_add(entry.amount)
                    .ok_or_else(overflow)?;
            }
            EntryEffect::Reserve => {
                let available = account.available();
                if available < entry.amount {
                    return Err(StoreError::InsufficientCredits {
                        available,
                        required: entry.amount,
                    });
                }
                account.frozen_balance += entry.amount;
            }
            EntryEffect::Release => {
                if account.frozen_balance < entry.amount {
                    return Err(StoreError::InsufficientFrozen {
                        frozen: account.frozen_balance,
                        required: entry.amount,
                    });
                }
                account.frozen_balance -= entry.amount;
            }
        }
        account.updated_at = Utc::now();
        Ok(())
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    fn get_account(&self, user_id: &UserId) -> Result<Option<CreditAccount>> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(user_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn create_account_if_absent(&self, user_id: &UserId) -> Result<CreditAccount> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = self.get_account(user_id)? {
            return Ok(existing);
        }

        let account = CreditAccount::new(*user_id);
        self.put_account(&account)?;
        Ok(account)
    }

    fn apply_entry(&self, user_id: &UserId, entry: &LedgerEntry) -> Result<CreditTransaction> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let cf_ref = self.cf(cf::TRANSACTIONS_BY_REFERENCE)?;

        // Reference uniqueness is checked inside the critical section so a
        // re-run of a referenced grant can never double-apply.
        if let Some(reference_id) = &entry.reference_id {
            let ref_key = keys::user_reference_key(user_id, reference_id);
            let exists = self
                .db
                .get_cf(&cf_ref, &ref_key)
                .map_err(|e| StoreError::Database(e.to_string()))?
                .is_some();
            if exists {
                return Err(StoreError::DuplicateReference {
                    reference_id: reference_id.clone(),
                });
            }
        }

        let mut account = self.get_account(user_id)?.ok_or_else(|| StoreError::NotFound {
            entity: "account",
            id: user_id.to_string(),
        })?;

        Self::apply_effect(&mut account, entry)?;
        let transaction = CreditTransaction::from_entry(*user_id, entry, account.balance);

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_tx_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;

        let account_key = keys::account_key(user_id);
        let tx_key = keys::transaction_key(&transaction.id);
        let user_tx_key = keys::user_transaction_key(user_id, &transaction.id);

        let account_value = Self::serialize(&account)?;
        let tx_value = Self::serialize(&transaction)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_accounts, &account_key, &account_value);
        batch.put_cf(&cf_tx, &tx_key, &tx_value);
        batch.put_cf(&cf_tx_by_user, &user_tx_key, b"");
        if let Some(reference_id) = &transaction.reference_id {
            let ref_key = keys::user_reference_key(user_id, reference_id);
            batch.put_cf(&cf_ref, &ref_key, transaction.id.to_bytes());
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(transaction)
    }

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<CreditTransaction>> {
        let cf = self.cf(cf::TRANSACTIONS)?;
        let key = keys::transaction_key(transaction_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>> {
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        let prefix = keys::user_transactions_prefix(user_id);

        let iter = self.db.iterator_cf(
            &cf_by_user,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        // ULID suffixes sort the index chronologically; collect the user's
        // range and walk it backwards for newest-first.
        let mut all_keys: Vec<Vec<u8>> = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            all_keys.push(key.to_vec());
        }

        all_keys.reverse();

        let mut transactions = Vec::new();
        for key in all_keys.into_iter().skip(offset) {
            if transactions.len() >= limit {
                break;
            }

            let tx_id = keys::extract_transaction_id_from_user_key(&key);
            if let Some(tx) = self.get_transaction(&tx_id)? {
                transactions.push(tx);
            }
        }

        Ok(transactions)
    }

    fn find_transaction_by_reference(
        &self,
        user_id: &UserId,
        reference_id: &str,
    ) -> Result<Option<CreditTransaction>> {
        let cf = self.cf(cf::TRANSACTIONS_BY_REFERENCE)?;
        let key = keys::user_reference_key(user_id, reference_id);

        let Some(tx_id_bytes) = self
            .db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let mut bytes = [0u8; 16];
        if tx_id_bytes.len() != 16 {
            return Err(StoreError::Serialization(
                "reference index value is not a transaction id".into(),
            ));
        }
        bytes.copy_from_slice(&tx_id_bytes);
        self.get_transaction(&TransactionId::from_bytes(bytes))
    }

    // =========================================================================
    // Quota Operations
    // =========================================================================

    fn upsert_quota_usage(
        &self,
        user_id: &UserId,
        service: &QuotaService,
        period: Period,
        delta: i64,
    ) -> Result<QuotaUsageRecord> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let cf = self.cf(cf::QUOTA_USAGE)?;
        let key = keys::quota_key(user_id, period, service);

        let record = match self
            .db
            .get_cf(&cf, &key)
            .map_err(|e| StoreError::Database(e.to_string()))?
        {
            Some(data) => {
                let mut record: QuotaUsageRecord = Self::deserialize(&data)?;
                record.used_amount += delta;
                record.updated_at = Utc::now();
                record
            }
            None => QuotaUsageRecord::new(*user_id, service.clone(), period, delta),
        };

        let value = Self::serialize(&record)?;
        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(record)
    }

    fn get_quota_usage(
        &self,
        user_id: &UserId,
        service: &QuotaService,
        period: Period,
    ) -> Result<Option<QuotaUsageRecord>> {
        let cf = self.cf(cf::QUOTA_USAGE)?;
        let key = keys::quota_key(user_id, period, service);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_quota_usage(&self, user_id: &UserId, period: Period) -> Result<Vec<QuotaUsageRecord>> {
        let cf = self.cf(cf::QUOTA_USAGE)?;
        let prefix = keys::quota_period_prefix(user_id, period);

        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, rocksdb::Direction::Forward));

        let mut records = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            records.push(Self::deserialize(&value)?);
        }

        Ok(records)
    }

    fn reset_quota_usage(&self, user_id: &UserId, period: Period) -> Result<()> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let cf = self.cf(cf::QUOTA_USAGE)?;
        let records = self.list_quota_usage(user_id, period)?;

        let mut batch = WriteBatch::default();
        for mut record in records {
            record.used_amount = 0;
            record.updated_at = Utc::now();

            let key = keys::quota_key(user_id, record.period, &record.service);
            let value = Self::serialize(&record)?;
            batch.put_cf(&cf, key, value);
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn init_quota_usage(
        &self,
        user_id: &UserId,
        service: &QuotaService,
        period: Period,
    ) -> Result<()> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let cf = self.cf(cf::QUOTA_USAGE)?;
        let key = keys::quota_key(user_id, period, service);

        let exists = self
            .db
            .get_cf(&cf, &key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();
        if exists {
            return Ok(());
        }

        let record = QuotaUsageRecord::new(*user_id, service.clone(), period, 0);
        let value = Self::serialize(&record)?;
        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    // =========================================================================
    // Profile Operations
    // =========================================================================

    fn put_profile(&self, profile: &UserProfile) -> Result<()> {
        let cf = self.cf(cf::PROFILES)?;
        let key = keys::profile_key(&profile.user_id);
        let value = Self::serialize(profile)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_profile(&self, user_id: &UserId) -> Result<Option<UserProfile>> {
        let cf = self.cf(cf::PROFILES)?;
        let key = keys::profile_key(user_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_profiles(&self) -> Result<Vec<UserProfile>> {
        let cf = self.cf(cf::PROFILES)?;
        let iter = self.db.iterator_cf(&cf, IteratorMode::Start);

        let mut profiles = Vec::new();
        for item in iter {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            profiles.push(Self::deserialize(&value)?);
        }

        Ok(profiles)
    }

    // =========================================================================
    // API Key Operations
    // =========================================================================

    fn put_api_key(&self, key: &ApiKeyRecord) -> Result<()> {
        let cf = self.cf(cf::API_KEYS)?;
        let db_key = keys::api_key_key(&key.key_hash);
        let value = Self::serialize(key)?;

        self.db
            .put_cf(&cf, db_key, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>> {
        let cf = self.cf(cf::API_KEYS)?;
        let key = keys::api_key_key(key_hash);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn touch_api_key(&self, key_hash: &str, now: DateTime<Utc>) -> Result<()> {
        let Some(mut record) = self.get_api_key_by_hash(key_hash)? else {
            return Ok(());
        };

        record.last_used_at = Some(now);
        self.put_api_key(&record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{TransactionSource, TransactionType};
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn earn(amount: i64) -> LedgerEntry {
        LedgerEntry::new(TransactionType::Earn, amount, TransactionSource::Admin)
    }

    fn spend(amount: i64) -> LedgerEntry {
        LedgerEntry::new(TransactionType::Spend, amount, TransactionSource::ApiCall)
    }

    #[test]
    fn create_account_if_absent_is_idempotent() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        let first = store.create_account_if_absent(&user_id).unwrap();
        let second = store.create_account_if_absent(&user_id).unwrap();

        assert_eq!(first.user_id, second.user_id);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.balance, 0);
    }

    #[test]
    fn concurrent_account_creation_yields_one_row() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        let user_id = UserId::generate();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.create_account_if_absent(&user_id).unwrap())
            })
            .collect();

        let accounts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let created_at = accounts[0].created_at;
        assert!(accounts.iter().all(|a| a.created_at == created_at));
    }

    #[test]
    fn apply_entry_updates_account_and_logs_transaction() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        store.create_account_if_absent(&user_id).unwrap();

        let tx = store.apply_entry(&user_id, &earn(100)).unwrap();
        assert_eq!(tx.balance_after, 100);

        let account = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(account.balance, 100);
        assert_eq!(account.total_earned, 100);
        assert_eq!(account.total_spent, 0);

        let txs = store.list_transactions_by_user(&user_id, 10, 0).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].id, tx.id);
    }

    #[test]
    fn apply_entry_requires_account() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        let result = store.apply_entry(&user_id, &spend(1));
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn spend_respects_available_balance() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        store.create_account_if_absent(&user_id).unwrap();
        store.apply_entry(&user_id, &earn(10)).unwrap();

        let result = store.apply_entry(&user_id, &spend(11));
        assert!(matches!(
            result,
            Err(StoreError::InsufficientCredits {
                available: 10,
                required: 11
            })
        ));

        // Balance untouched by the failed spend.
        let account = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(account.balance, 10);
        assert!(store.list_transactions_by_user(&user_id, 10, 0).unwrap().len() == 1);
    }

    #[test]
    fn credit_overflow_is_rejected() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        store.create_account_if_absent(&user_id).unwrap();
        store.apply_entry(&user_id, &earn(i64::MAX)).unwrap();

        let result = store.apply_entry(&user_id, &earn(1));
        assert!(matches!(result, Err(StoreError::BalanceOverflow { amount: 1 })));

        // The rejected entry leaves both the account and the log untouched.
        let account = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(account.balance, i64::MAX);
        assert_eq!(account.total_earned, i64::MAX);
        assert_eq!(store.list_transactions_by_user(&user_id, 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn non_positive_entry_amounts_are_rejected() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        store.create_account_if_absent(&user_id).unwrap();

        for amount in [0, -5] {
            let result = store.apply_entry(&user_id, &earn(amount));
            assert!(matches!(result, Err(StoreError::InvalidAmount { .. })));
        }
    }

    #[test]
    fn freeze_reserves_without_changing_balance() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        store.create_account_if_absent(&user_id).unwrap();
        store.apply_entry(&user_id, &earn(50)).unwrap();

        let freeze = LedgerEntry::new(TransactionType::Freeze, 20, TransactionSource::Admin);
        let tx = store.apply_entry(&user_id, &freeze).unwrap();
        assert_eq!(tx.balance_after, 50);

        let account = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(account.balance, 50);
        assert_eq!(account.frozen_balance, 20);
        assert_eq!(account.available(), 30);

        // Spend beyond the available portion fails even though the balance
        // covers it.
        let result = store.apply_entry(&user_id, &spend(40));
        assert!(matches!(result, Err(StoreError::InsufficientCredits { .. })));

        store.apply_entry(&user_id, &spend(30)).unwrap();
        let account = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(account.balance, 20);
        assert_eq!(account.frozen_balance, 20);
    }

    #[test]
    fn unfreeze_cannot_exceed_frozen() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        store.create_account_if_absent(&user_id).unwrap();
        store.apply_entry(&user_id, &earn(50)).unwrap();

        let freeze = LedgerEntry::new(TransactionType::Freeze, 20, TransactionSource::Admin);
        store.apply_entry(&user_id, &freeze).unwrap();

        let release = LedgerEntry::new(TransactionType::Unfreeze, 25, TransactionSource::Admin);
        let result = store.apply_entry(&user_id, &release);
        assert!(matches!(
            result,
            Err(StoreError::InsufficientFrozen {
                frozen: 20,
                required: 25
            })
        ));

        let release = LedgerEntry::new(TransactionType::Unfreeze, 20, TransactionSource::Admin);
        store.apply_entry(&user_id, &release).unwrap();
        let account = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(account.frozen_balance, 0);
        assert_eq!(account.balance, 50);
    }

    #[test]
    fn duplicate_reference_is_rejected() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        store.create_account_if_absent(&user_id).unwrap();

        let entry = earn(100).with_reference("signup_test");
        store.apply_entry(&user_id, &entry).unwrap();

        let result = store.apply_entry(&user_id, &entry);
        assert!(matches!(result, Err(StoreError::DuplicateReference { .. })));

        let account = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(account.balance, 100);

        let found = store
            .find_transaction_by_reference(&user_id, "signup_test")
            .unwrap()
            .unwrap();
        assert_eq!(found.amount, 100);
    }

    #[test]
    fn same_reference_different_users_is_allowed() {
        let (store, _dir) = create_test_store();
        let alice = UserId::generate();
        let bob = UserId::generate();
        store.create_account_if_absent(&alice).unwrap();
        store.create_account_if_absent(&bob).unwrap();

        let entry = earn(100).with_reference("free_2024-03");
        store.apply_entry(&alice, &entry).unwrap();
        store.apply_entry(&bob, &entry).unwrap();
    }

    #[test]
    fn concurrent_spends_never_overdraw() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        let user_id = UserId::generate();
        store.create_account_if_absent(&user_id).unwrap();
        store.apply_entry(&user_id, &earn(5)).unwrap();

        // Ten racing unit spends against a balance of five: exactly five
        // succeed.
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.apply_entry(&user_id, &spend(1)).is_ok())
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 5);
        let account = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(account.balance, 0);
        assert_eq!(account.total_spent, 5);
    }

    #[test]
    fn transaction_pagination_newest_first() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        store.create_account_if_absent(&user_id).unwrap();

        store
            .apply_entry(&user_id, &earn(10).with_description("first"))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2)); // Distinct ULID timestamps
        store
            .apply_entry(&user_id, &earn(20).with_description("second"))
            .unwrap();

        let txs = store.list_transactions_by_user(&user_id, 10, 0).unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].description.as_deref(), Some("second"));
        assert_eq!(txs[1].description.as_deref(), Some("first"));

        let page2 = store.list_transactions_by_user(&user_id, 1, 1).unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].description.as_deref(), Some("first"));
    }

    #[test]
    fn quota_upsert_and_reset() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let period = Period::from_ym(2024, 3).unwrap();

        for _ in 0..5 {
            store
                .upsert_quota_usage(&user_id, &QuotaService::ApiCall, period, 1)
                .unwrap();
        }

        let record = store
            .get_quota_usage(&user_id, &QuotaService::ApiCall, period)
            .unwrap()
            .unwrap();
        assert_eq!(record.used_amount, 5);

        store.reset_quota_usage(&user_id, period).unwrap();
        let record = store
            .get_quota_usage(&user_id, &QuotaService::ApiCall, period)
            .unwrap()
            .unwrap();
        assert_eq!(record.used_amount, 0);
    }

    #[test]
    fn quota_init_preserves_existing_rows() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let period = Period::from_ym(2024, 3).unwrap();

        store
            .upsert_quota_usage(&user_id, &QuotaService::ApiCall, period, 7)
            .unwrap();
        store
            .init_quota_usage(&user_id, &QuotaService::ApiCall, period)
            .unwrap();
        store
            .init_quota_usage(&user_id, &QuotaService::Storage, period)
            .unwrap();

        let api = store
            .get_quota_usage(&user_id, &QuotaService::ApiCall, period)
            .unwrap()
            .unwrap();
        assert_eq!(api.used_amount, 7);

        let storage = store
            .get_quota_usage(&user_id, &QuotaService::Storage, period)
            .unwrap()
            .unwrap();
        assert_eq!(storage.used_amount, 0);
    }

    #[test]
    fn quota_periods_are_isolated() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let march = Period::from_ym(2024, 3).unwrap();
        let april = Period::from_ym(2024, 4).unwrap();

        store
            .upsert_quota_usage(&user_id, &QuotaService::ApiCall, march, 3)
            .unwrap();
        store
            .upsert_quota_usage(&user_id, &QuotaService::ApiCall, april, 4)
            .unwrap();

        let march_rows = store.list_quota_usage(&user_id, march).unwrap();
        assert_eq!(march_rows.len(), 1);
        assert_eq!(march_rows[0].used_amount, 3);

        let april_rows = store.list_quota_usage(&user_id, april).unwrap();
        assert_eq!(april_rows[0].used_amount, 4);
    }

    #[test]
    fn api_key_lookup_and_touch() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let record = ApiKeyRecord::new(user_id, "ci".into(), "ab".repeat(32), None);

        store.put_api_key(&record).unwrap();

        let found = store.get_api_key_by_hash(&record.key_hash).unwrap().unwrap();
        assert_eq!(found.user_id, user_id);
        assert!(found.last_used_at.is_none());

        let now = Utc::now();
        store.touch_api_key(&record.key_hash, now).unwrap();
        let touched = store.get_api_key_by_hash(&record.key_hash).unwrap().unwrap();
        assert_eq!(touched.last_used_at, Some(now));

        // Touching an unknown hash is a no-op, not an error.
        store.touch_api_key("missing", now).unwrap();
    }

    #[test]
    fn profiles_roundtrip_and_list() {
        let (store, _dir) = create_test_store();
        let alice = UserProfile::new(UserId::generate());
        let bob = UserProfile::new(UserId::generate());

        store.put_profile(&alice).unwrap();
        store.put_profile(&bob).unwrap();

        assert!(store.get_profile(&alice.user_id).unwrap().is_some());
        assert_eq!(store.list_profiles().unwrap().len(), 2);
    }
}
