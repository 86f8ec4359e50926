//! In-memory storage implementation.
//!
//! `MemStore` keeps everything in `HashMap`s behind a single mutex. It
//! honors the same atomicity contract as `RocksStore` (the whole
//! read-check-write of a compound op runs under the lock), which makes it a
//! drop-in backend for unit tests that don't want a database on disk.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use tally_core::{
    ApiKeyRecord, CreditAccount, CreditTransaction, EntryEffect, LedgerEntry, Period, QuotaService,
    QuotaUsageRecord, TransactionId, UserId, UserProfile,
};

use crate::error::{Result, StoreError};
use crate::Store;

#[derive(Default)]
struct Tables {
    accounts: HashMap<UserId, CreditAccount>,
    transactions: HashMap<TransactionId, CreditTransaction>,
    /// Per-user transaction ids in insertion (chronological) order.
    transactions_by_user: HashMap<UserId, Vec<TransactionId>>,
    /// `(user, reference_id)` to transaction id.
    transactions_by_reference: HashMap<(UserId, String), TransactionId>,
    quota_usage: HashMap<(UserId, Period, String), QuotaUsageRecord>,
    profiles: HashMap<UserId, UserProfile>,
    /// Keyed by key hash.
    api_keys: HashMap<String, ApiKeyRecord>,
}

/// In-memory storage implementation.
#[derive(Default)]
pub struct MemStore {
    tables: Mutex<Tables>,
}

impl MemStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Store for MemStore {
    fn get_account(&self, user_id: &UserId) -> Result<Option<CreditAccount>> {
        Ok(self.lock().accounts.get(user_id).cloned())
    }

    fn create_account_if_absent(&self, user_id: &UserId) -> Result<CreditAccount> {
        let mut tables = self.lock();
        let account = tables
            .accounts
            .entry(*user_id)
            .or_insert_with(|| CreditAccount::new(*user_id));
        Ok(account.clone())
    }

    fn apply_entry(&self, user_id: &UserId, entry: &LedgerEntry) -> Result<CreditTransaction> {
        let mut tables = self.lock();

        if let Some(reference_id) = &entry.reference_id {
            if tables
                .transactions_by_reference
                .contains_key(&(*user_id, reference_id.clone()))
            {
                return Err(StoreError::DuplicateReference {
                    reference_id: reference_id.clone(),
                });
            }
        }

        let account = tables
            .accounts
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "account",
                id: user_id.to_string(),
            })?;

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
                // Compute both counters before assigning so a rejected
                // entry leaves the account untouched.
                let balance = account.balance.checked_add(entry.amount).ok_or_else(overflow)?;
                let total_earned = account
                    .total_earned
                    .checked_add(entry.amount)
                    .ok_or_else(overflow)?;
                account.balance = balance;
                account.total_earned = total_earned;
            }
            EntryEffect::Debit => {
                let available = account.available();
                if available < entry.amount {
                    return Err(StoreError::InsufficientCredits {
                        available,
                        required: entry.amount,
                    });
                }
                let total_spent = account
                    .total_spent
                    .checked_add(entry.amount)
                    .ok_or_else(overflow)?;
                account.balance -= entry.amount;
                account.total_spent = total_spent;
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

        let transaction = CreditTransaction::from_entry(*user_id, entry, account.balance);

        tables
            .transactions
            .insert(transaction.id, transaction.clone());
        tables
            .transactions_by_user
            .entry(*user_id)
            .or_default()
            .push(transaction.id);
        if let Some(reference_id) = &transaction.reference_id {
            tables
                .transactions_by_reference
                .insert((*user_id, reference_id.clone()), transaction.id);
        }

        Ok(transaction)
    }

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<CreditTransaction>> {
        Ok(self.lock().transactions.get(transaction_id).cloned())
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>> {
        let tables = self.lock();
        let Some(ids) = tables.transactions_by_user.get(user_id) else {
            return Ok(Vec::new());
        };

        let transactions = ids
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .filter_map(|id| tables.transactions.get(id).cloned())
            .collect();

        Ok(transactions)
    }

    fn find_transaction_by_reference(
        &self,
        user_id: &UserId,
        reference_id: &str,
    ) -> Result<Option<CreditTransaction>> {
        let tables = self.lock();
        let tx = tables
            .transactions_by_reference
            .get(&(*user_id, reference_id.to_owned()))
            .and_then(|id| tables.transactions.get(id).cloned());
        Ok(tx)
    }

    fn upsert_quota_usage(
        &self,
        user_id: &UserId,
        service: &QuotaService,
        period: Period,
        delta: i64,
    ) -> Result<QuotaUsageRecord> {
        let mut tables = self.lock();
        let key = (*user_id, period, service.as_str().to_owned());

        let record = tables
            .quota_usage
            .entry(key)
            .and_modify(|record| {
                record.used_amount += delta;
                record.updated_at = Utc::now();
            })
            .or_insert_with(|| QuotaUsageRecord::new(*user_id, service.clone(), period, delta));

        Ok(record.clone())
    }

    fn get_quota_usage(
        &self,
        user_id: &UserId,
        service: &QuotaService,
        period: Period,
    ) -> Result<Option<QuotaUsageRecord>> {
        let key = (*user_id, period, service.as_str().to_owned());
        Ok(self.lock().quota_usage.get(&key).cloned())
    }

    fn list_quota_usage(&self, user_id: &UserId, period: Period) -> Result<Vec<QuotaUsageRecord>> {
        let tables = self.lock();
        let mut records: Vec<_> = tables
            .quota_usage
            .values()
            .filter(|r| r.user_id == *user_id && r.period == period)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.service.as_str().cmp(b.service.as_str()));
        Ok(records)
    }

    fn reset_quota_usage(&self, user_id: &UserId, period: Period) -> Result<()> {
        let mut tables = self.lock();
        for record in tables
            .quota_usage
            .values_mut()
            .filter(|r| r.user_id == *user_id && r.period == period)
        {
            record.used_amount = 0;
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    fn init_quota_usage(
        &self,
        user_id: &UserId,
        service: &QuotaService,
        period: Period,
    ) -> Result<()> {
        let mut tables = self.lock();
        let key = (*user_id, period, service.as_str().to_owned());
        tables
            .quota_usage
            .entry(key)
            .or_insert_with(|| QuotaUsageRecord::new(*user_id, service.clone(), period, 0));
        Ok(())
    }

    fn put_profile(&self, profile: &UserProfile) -> Result<()> {
        self.lock().profiles.insert(profile.user_id, profile.clone());
        Ok(())
    }

    fn get_profile(&self, user_id: &UserId) -> Result<Option<UserProfile>> {
        Ok(self.lock().profiles.get(user_id).cloned())
    }

    fn list_profiles(&self) -> Result<Vec<UserProfile>> {
        Ok(self.lock().profiles.values().cloned().collect())
    }

    fn put_api_key(&self, key: &ApiKeyRecord) -> Result<()> {
        self.lock().api_keys.insert(key.key_hash.clone(), key.clone());
        Ok(())
    }

    fn get_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>> {
        Ok(self.lock().api_keys.get(key_hash).cloned())
    }

    fn touch_api_key(&self, key_hash: &str, now: DateTime<Utc>) -> Result<()> {
        if let Some(record) = self.lock().api_keys.get_mut(key_hash) {
            record.last_used_at = Some(now);
        }
        Ok(())
    }
}
