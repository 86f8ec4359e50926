//! Credit ledger service.
//!
//! Every balance mutation goes through here: the service validates the
//! request, builds a [`LedgerEntry`], and hands it to the store, which
//! applies the balance change and appends the transaction atomically.

use std::sync::Arc;

use tracing::info;

use tally_core::{
    CreditAccount, CreditTransaction, EntryEffect, LedgerError, LedgerEntry, Result,
    TransactionSource, TransactionType, UserId,
};
use tally_store::Store;

/// Credit balance and transaction-log service.
pub struct CreditLedger<S> {
    store: Arc<S>,
}

impl<S> Clone for CreditLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> CreditLedger<S> {
    /// Create a ledger over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn validate_amount(amount: i64) -> Result<()> {
        if amount <= 0 {
            return Err(LedgerError::Validation(format!(
                "amount must be positive, got {amount}"
            )));
        }
        Ok(())
    }

    fn build_entry(
        kind: TransactionType,
        amount: i64,
        source: TransactionSource,
        description: Option<String>,
        reference_id: Option<String>,
    ) -> LedgerEntry {
        let mut entry = LedgerEntry::new(kind, amount, source);
        if let Some(description) = description {
            entry = entry.with_description(description);
        }
        if let Some(reference_id) = reference_id {
            entry = entry.with_reference(reference_id);
        }
        entry
    }

    /// Fetch the account for `user_id`, creating a zeroed one if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn get_or_create_account(&self, user_id: &UserId) -> Result<CreditAccount> {
        Ok(self.store.create_account_if_absent(user_id)?)
    }

    /// Fetch the account for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AccountNotFound`] if no account exists.
    pub fn get_account(&self, user_id: &UserId) -> Result<CreditAccount> {
        self.store
            .get_account(user_id)?
            .ok_or_else(|| LedgerError::AccountNotFound {
                user_id: user_id.to_string(),
            })
    }

    /// Add credits to an account, creating the account if needed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] for a non-positive amount and
    /// [`LedgerError::DuplicateReference`] if `reference_id` was already
    /// used for this user.
    pub fn earn(
        &self,
        user_id: &UserId,
        amount: i64,
        source: TransactionSource,
        description: Option<String>,
        reference_id: Option<String>,
    ) -> Result<CreditTransaction> {
        Self::validate_amount(amount)?;
        self.store.create_account_if_absent(user_id)?;

        let entry = Self::build_entry(
            TransactionType::Earn,
            amount,
            source,
            description,
            reference_id,
        );
        let tx = self.store.apply_entry(user_id, &entry)?;

        info!(%user_id, amount, source = source.as_str(), balance_after = tx.balance_after, "credits earned");
        Ok(tx)
    }

    /// Deduct credits from an existing account.
    ///
    /// Spending never creates an account: a missing account is
    /// [`LedgerError::AccountNotFound`], not a zero-balance spend attempt.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientCredits`] if the available
    /// (unfrozen) balance does not cover `amount`.
    pub fn spend(
        &self,
        user_id: &UserId,
        amount: i64,
        source: TransactionSource,
        description: Option<String>,
        reference_id: Option<String>,
    ) -> Result<CreditTransaction> {
        Self::validate_amount(amount)?;

        let entry = Self::build_entry(
            TransactionType::Spend,
            amount,
            source,
            description,
            reference_id,
        );
        let tx = self.store.apply_entry(user_id, &entry)?;

        info!(%user_id, amount, source = source.as_str(), balance_after = tx.balance_after, "credits spent");
        Ok(tx)
    }

    /// Return previously spent credits to an account.
    ///
    /// The refund keeps the source of the original charge so history stays
    /// attributable. Unlike [`Self::earn`] it never creates the account: a
    /// refund is only meaningful against an account that was charged, so a
    /// missing one is reported rather than materialized at zero.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AccountNotFound`] if no account exists.
    pub fn refund(
        &self,
        user_id: &UserId,
        amount: i64,
        source: TransactionSource,
        description: Option<String>,
        reference_id: Option<String>,
    ) -> Result<CreditTransaction> {
        Self::validate_amount(amount)?;

        let description = Some(match description {
            Some(d) => format!("Refund: {d}"),
            None => "Refund".to_owned(),
        });
        let entry = Self::build_entry(
            TransactionType::Refund,
            amount,
            source,
            description,
            reference_id,
        );
        let tx = self.store.apply_entry(user_id, &entry)?;

        info!(%user_id, amount, balance_after = tx.balance_after, "credits refunded");
        Ok(tx)
    }

    /// Apply a signed manual correction.
    ///
    /// A positive `amount` credits the account, a negative one debits it.
    /// Either way the transaction is logged as an admin adjustment with the
    /// magnitude of the change.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] for a zero or out-of-range
    /// amount and
    /// [`LedgerError::InsufficientCredits`] if a debit exceeds the
    /// available balance.
    pub fn admin_adjust(
        &self,
        user_id: &UserId,
        amount: i64,
        description: Option<String>,
        reference_id: Option<String>,
    ) -> Result<CreditTransaction> {
        if amount == 0 {
            return Err(LedgerError::Validation(
                "adjustment amount must be non-zero".to_owned(),
            ));
        }
        // `i64::MIN` has no positive magnitude; reject it with the other
        // malformed amounts instead of letting the negation wrap.
        let magnitude = amount.checked_abs().ok_or_else(|| {
            LedgerError::Validation(format!("adjustment amount out of range: {amount}"))
        })?;
        Self::validate_amount(magnitude)?;
        self.store.create_account_if_absent(user_id)?;

        let effect = if amount > 0 {
            EntryEffect::Credit
        } else {
            EntryEffect::Debit
        };
        let entry = Self::build_entry(
            TransactionType::AdminAdjust,
            magnitude,
            TransactionSource::Admin,
            description,
            reference_id,
        )
        .with_effect(effect);
        let tx = self.store.apply_entry(user_id, &entry)?;

        info!(%user_id, amount, balance_after = tx.balance_after, "admin adjustment applied");
        Ok(tx)
    }

    /// Reserve part of the balance so it cannot be spent.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientCredits`] if the available
    /// balance does not cover `amount`.
    pub fn freeze(
        &self,
        user_id: &UserId,
        amount: i64,
        description: Option<String>,
        reference_id: Option<String>,
    ) -> Result<CreditTransaction> {
        Self::validate_amount(amount)?;

        let entry = Self::build_entry(
            TransactionType::Freeze,
            amount,
            TransactionSource::Admin,
            description,
            reference_id,
        );
        let tx = self.store.apply_entry(user_id, &entry)?;

        info!(%user_id, amount, "credits frozen");
        Ok(tx)
    }

    /// Release previously frozen credits back to the spendable balance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if `amount` exceeds the frozen
    /// balance.
    pub fn unfreeze(
        &self,
        user_id: &UserId,
        amount: i64,
        description: Option<String>,
        reference_id: Option<String>,
    ) -> Result<CreditTransaction> {
        Self::validate_amount(amount)?;

        let entry = Self::build_entry(
            TransactionType::Unfreeze,
            amount,
            TransactionSource::Admin,
            description,
            reference_id,
        );
        let tx = self.store.apply_entry(user_id, &entry)?;

        info!(%user_id, amount, "credits unfrozen");
        Ok(tx)
    }

    /// Whether the account can cover `amount` from its available balance.
    ///
    /// A missing account is treated as unable to pay rather than an error,
    /// so callers can gate work with a single check.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store fails.
    pub fn has_enough_credits(&self, user_id: &UserId, amount: i64) -> Result<bool> {
        Self::validate_amount(amount)?;

        match self.store.get_account(user_id)? {
            Some(account) => Ok(account.has_enough(amount)),
            None => Ok(false),
        }
    }

    /// List the account's transactions, newest first.
    ///
    /// Returns the page plus a flag indicating whether more rows exist
    /// beyond it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn get_transaction_history(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<CreditTransaction>, bool)> {
        // Fetch one extra row to learn whether another page exists.
        let mut transactions = self
            .store
            .list_transactions_by_user(user_id, limit + 1, offset)?;

        let has_more = transactions.len() > limit;
        transactions.truncate(limit);

        Ok((transactions, has_more))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_store::MemStore;

    fn ledger() -> CreditLedger<MemStore> {
        CreditLedger::new(Arc::new(MemStore::new()))
    }

    #[test]
    fn earn_creates_account_on_demand() {
        let ledger = ledger();
        let user_id = UserId::generate();

        let tx = ledger
            .earn(&user_id, 100, TransactionSource::Bonus, None, None)
            .unwrap();
        assert_eq!(tx.balance_after, 100);
        assert_eq!(tx.kind, TransactionType::Earn);

        let account = ledger.get_account(&user_id).unwrap();
        assert_eq!(account.total_earned, 100);
    }

    #[test]
    fn spend_does_not_create_accounts() {
        let ledger = ledger();
        let user_id = UserId::generate();

        let result = ledger.spend(&user_id, 10, TransactionSource::ApiCall, None, None);
        assert!(matches!(result, Err(LedgerError::AccountNotFound { .. })));
        assert!(ledger.get_account(&user_id).is_err());
    }

    #[test]
    fn spend_rejects_insufficient_balance() {
        let ledger = ledger();
        let user_id = UserId::generate();
        ledger
            .earn(&user_id, 5, TransactionSource::Bonus, None, None)
            .unwrap();

        let result = ledger.spend(&user_id, 6, TransactionSource::ApiCall, None, None);
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientCredits {
                available: 5,
                required: 6
            })
        ));

        // Failed spend leaves no trace in the history.
        let (txs, _) = ledger.get_transaction_history(&user_id, 10, 0).unwrap();
        assert_eq!(txs.len(), 1);
    }

    #[test]
    fn non_positive_amounts_are_rejected_before_the_store() {
        let ledger = ledger();
        let user_id = UserId::generate();

        for amount in [0, -5] {
            let result = ledger.earn(&user_id, amount, TransactionSource::Bonus, None, None);
            assert!(matches!(result, Err(LedgerError::Validation(_))));
        }

        // The validation failure must not have created an account.
        assert!(ledger.get_account(&user_id).is_err());
    }

    #[test]
    fn refund_prefixes_description_and_keeps_source() {
        let ledger = ledger();
        let user_id = UserId::generate();
        ledger
            .earn(&user_id, 10, TransactionSource::Bonus, None, None)
            .unwrap();
        ledger
            .spend(&user_id, 4, TransactionSource::ApiCall, None, None)
            .unwrap();

        let tx = ledger
            .refund(
                &user_id,
                4,
                TransactionSource::ApiCall,
                Some("failed chat call".to_owned()),
                None,
            )
            .unwrap();

        assert_eq!(tx.kind, TransactionType::Refund);
        assert_eq!(tx.source, TransactionSource::ApiCall);
        assert_eq!(tx.description.as_deref(), Some("Refund: failed chat call"));
        assert_eq!(tx.balance_after, 10);
    }

    #[test]
    fn admin_adjust_direction_follows_sign() {
        let ledger = ledger();
        let user_id = UserId::generate();

        let credit = ledger.admin_adjust(&user_id, 50, None, None).unwrap();
        assert_eq!(credit.kind, TransactionType::AdminAdjust);
        assert_eq!(credit.amount, 50);
        assert_eq!(credit.balance_after, 50);

        let debit = ledger.admin_adjust(&user_id, -20, None, None).unwrap();
        assert_eq!(debit.kind, TransactionType::AdminAdjust);
        assert_eq!(debit.amount, 20);
        assert_eq!(debit.balance_after, 30);

        let zero = ledger.admin_adjust(&user_id, 0, None, None);
        assert!(matches!(zero, Err(LedgerError::Validation(_))));
    }

    #[test]
    fn admin_adjust_rejects_magnitude_without_positive_form() {
        let ledger = ledger();
        let user_id = UserId::generate();

        let result = ledger.admin_adjust(&user_id, i64::MIN, None, None);
        assert!(matches!(result, Err(LedgerError::Validation(_))));

        // The rejected adjustment must not have created an account.
        assert!(ledger.get_account(&user_id).is_err());
    }

    #[test]
    fn admin_debit_respects_available_balance() {
        let ledger = ledger();
        let user_id = UserId::generate();
        ledger.admin_adjust(&user_id, 10, None, None).unwrap();

        let result = ledger.admin_adjust(&user_id, -11, None, None);
        assert!(matches!(result, Err(LedgerError::InsufficientCredits { .. })));
    }

    #[test]
    fn freeze_and_unfreeze_move_the_reservation() {
        let ledger = ledger();
        let user_id = UserId::generate();
        ledger
            .earn(&user_id, 100, TransactionSource::Bonus, None, None)
            .unwrap();

        ledger.freeze(&user_id, 60, None, None).unwrap();
        assert!(!ledger.has_enough_credits(&user_id, 41).unwrap());
        assert!(ledger.has_enough_credits(&user_id, 40).unwrap());

        let result = ledger.unfreeze(&user_id, 61, None, None);
        assert!(matches!(result, Err(LedgerError::Validation(_))));

        ledger.unfreeze(&user_id, 60, None, None).unwrap();
        assert!(ledger.has_enough_credits(&user_id, 100).unwrap());
    }

    #[test]
    fn has_enough_credits_is_false_for_missing_accounts() {
        let ledger = ledger();
        let user_id = UserId::generate();

        assert!(!ledger.has_enough_credits(&user_id, 1).unwrap());
    }

    #[test]
    fn history_pagination_reports_has_more() {
        let ledger = ledger();
        let user_id = UserId::generate();
        for _ in 0..5 {
            ledger
                .earn(&user_id, 1, TransactionSource::Bonus, None, None)
                .unwrap();
        }

        let (page, has_more) = ledger.get_transaction_history(&user_id, 3, 0).unwrap();
        assert_eq!(page.len(), 3);
        assert!(has_more);

        let (page, has_more) = ledger.get_transaction_history(&user_id, 3, 3).unwrap();
        assert_eq!(page.len(), 2);
        assert!(!has_more);
    }

    #[test]
    fn duplicate_reference_is_surfaced() {
        let ledger = ledger();
        let user_id = UserId::generate();

        ledger
            .earn(
                &user_id,
                100,
                TransactionSource::Bonus,
                None,
                Some("free_2024-03".to_owned()),
            )
            .unwrap();
        let result = ledger.earn(
            &user_id,
            100,
            TransactionSource::Bonus,
            None,
            Some("free_2024-03".to_owned()),
        );
        assert!(matches!(result, Err(LedgerError::DuplicateReference { .. })));

        let account = ledger.get_account(&user_id).unwrap();
        assert_eq!(account.balance, 100);
    }

    #[test]
    fn accounting_identity_holds_across_mixed_sequences() {
        enum Op {
            Earn(i64),
            Spend(i64),
            Refund(i64),
            Adjust(i64),
            Freeze(i64),
            Unfreeze(i64),
        }
        use Op::{Adjust, Earn, Freeze, Refund, Spend, Unfreeze};

        let ledger = ledger();
        let user_id = UserId::generate();

        // A mix of accepted and rejected operations; the account counters
        // must reconcile after every step either way.
        let script = [
            Earn(100),
            Spend(30),
            Freeze(50),
            Spend(25), // over the unfrozen portion
            Unfreeze(20),
            Spend(25),
            Refund(10),
            Adjust(-40), // over the available balance
            Adjust(-20),
            Unfreeze(31), // over the frozen balance
            Unfreeze(30),
            Spend(1_000),
            Earn(3),
        ];

        for op in script {
            let _ = match op {
                Earn(amount) => ledger.earn(&user_id, amount, TransactionSource::Bonus, None, None),
                Spend(amount) => {
                    ledger.spend(&user_id, amount, TransactionSource::ApiCall, None, None)
                }
                Refund(amount) => {
                    ledger.refund(&user_id, amount, TransactionSource::ApiCall, None, None)
                }
                Adjust(amount) => ledger.admin_adjust(&user_id, amount, None, None),
                Freeze(amount) => ledger.freeze(&user_id, amount, None, None),
                Unfreeze(amount) => ledger.unfreeze(&user_id, amount, None, None),
            };

            let account = ledger.get_account(&user_id).unwrap();
            assert_eq!(account.balance, account.total_earned - account.total_spent);
            assert!(account.balance >= 0);
            assert!(account.frozen_balance >= 0);
            assert!(account.frozen_balance <= account.balance);
        }

        let account = ledger.get_account(&user_id).unwrap();
        assert_eq!(account.balance, 38);
        assert_eq!(account.total_earned, 113);
        assert_eq!(account.total_spent, 75);
        assert_eq!(account.frozen_balance, 0);
    }
}
