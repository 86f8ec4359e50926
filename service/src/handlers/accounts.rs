//! Account bootstrap, balance, and transaction handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use tally_core::{CreditTransaction, UserId};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Bootstrap request.
#[derive(Debug, Deserialize)]
pub struct BootstrapRequest {
    /// The user to initialize. Must match the session user.
    pub user_id: UserId,
}

/// Bootstrap response.
#[derive(Debug, Serialize)]
pub struct BootstrapResponse {
    /// The initialized user.
    pub user_id: String,
    /// Balance after bootstrap.
    pub balance: i64,
    /// Signup credits granted by this call (zero on repeat calls).
    pub signup_credits_granted: i64,
    /// Whether this call created the account.
    pub is_new_account: bool,
}

/// Initialize the signup state for the session user.
///
/// Safe to call any number of times; only the first call grants the
/// signup bonus.
pub async fn bootstrap(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(request): Json<BootstrapRequest>,
) -> Result<Json<BootstrapResponse>, ApiError> {
    // Users bootstrap themselves only.
    if request.user_id != auth.user_id {
        return Err(ApiError::Forbidden);
    }

    let outcome = state.bootstrap.run(&auth.user_id).await?;

    Ok(Json(BootstrapResponse {
        user_id: outcome.account.user_id.to_string(),
        balance: outcome.account.balance,
        signup_credits_granted: outcome.signup_credits_granted,
        is_new_account: outcome.is_new_account,
    }))
}

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// The account owner.
    pub user_id: String,
    /// Total balance including frozen credits.
    pub balance: i64,
    /// Spendable balance.
    pub available: i64,
    /// Frozen (reserved) credits.
    pub frozen_balance: i64,
    /// Lifetime credits earned.
    pub total_earned: i64,
    /// Lifetime credits spent.
    pub total_spent: i64,
}

/// Get the session user's credit balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account = state.ledger.get_account(&auth.user_id)?;

    Ok(Json(BalanceResponse {
        user_id: account.user_id.to_string(),
        balance: account.balance,
        available: account.available(),
        frozen_balance: account.frozen_balance,
        total_earned: account.total_earned,
        total_spent: account.total_spent,
    }))
}

/// Transaction list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Maximum number of transactions to return (default: 50, max: 100).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// Transaction response.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: String,
    /// Transaction kind.
    pub kind: String,
    /// Credit amount moved (always positive; `kind` carries direction).
    pub amount: i64,
    /// Balance after this transaction.
    pub balance_after: i64,
    /// What triggered the transaction.
    pub source: String,
    /// Human-readable description, if any.
    pub description: Option<String>,
    /// Idempotency reference, if any.
    pub reference_id: Option<String>,
    /// Timestamp.
    pub created_at: String,
}

impl From<&CreditTransaction> for TransactionResponse {
    fn from(tx: &CreditTransaction) -> Self {
        Self {
            id: tx.id.to_string(),
            kind: tx.kind.as_str().to_string(),
            amount: tx.amount,
            balance_after: tx.balance_after,
            source: tx.source.as_str().to_string(),
            description: tx.description.clone(),
            reference_id: tx.reference_id.clone(),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// List transactions response.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Transactions (newest first).
    pub transactions: Vec<TransactionResponse>,
    /// Whether there are more transactions.
    pub has_more: bool,
}

/// List the session user's transaction history.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    // Verify the account exists before paginating.
    state.ledger.get_account(&auth.user_id)?;

    let limit = query.limit.min(100);
    let (transactions, has_more) =
        state
            .ledger
            .get_transaction_history(&auth.user_id, limit, query.offset)?;

    let transactions = transactions.iter().map(TransactionResponse::from).collect();

    Ok(Json(ListTransactionsResponse {
        transactions,
        has_more,
    }))
}
