//! Admin operations handlers.
//!
//! Everything under `/v1/admin` requires the configured admin token and is
//! meant for operators and internal jobs, not end users.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_core::{Period, SubscriptionStatus, UserId, UserProfile};
use tally_ledger::DistributionReport;
use tally_store::Store;

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::keys;
use crate::state::AppState;

/// Profile upsert request.
#[derive(Debug, Deserialize)]
pub struct UpsertUserRequest {
    /// The user to create or update.
    pub user_id: UserId,
    /// New ban flag; omitted keeps the current value.
    pub banned: Option<bool>,
    /// New subscription status; omitted keeps the current value.
    pub subscription: Option<SubscriptionStatus>,
}

/// Profile response.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    /// The user.
    pub user_id: String,
    /// Ban flag.
    pub banned: bool,
    /// Subscription status, if any.
    pub subscription: Option<SubscriptionStatus>,
}

/// Create or update a user profile.
pub async fn upsert_user(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(request): Json<UpsertUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let mut profile = state
        .store
        .get_profile(&request.user_id)?
        .unwrap_or_else(|| UserProfile::new(request.user_id));

    if let Some(banned) = request.banned {
        profile.banned = banned;
    }
    if let Some(subscription) = request.subscription {
        profile.subscription = Some(subscription);
    }
    profile.updated_at = Utc::now();

    state.store.put_profile(&profile)?;

    Ok(Json(UserResponse {
        user_id: profile.user_id.to_string(),
        banned: profile.banned,
        subscription: profile.subscription,
    }))
}

/// API key mint request.
#[derive(Debug, Deserialize)]
pub struct MintKeyRequest {
    /// The key's owner.
    pub user_id: UserId,
    /// Human-readable key name.
    pub name: String,
    /// Optional expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

/// API key mint response. The plaintext key appears here and nowhere else.
#[derive(Debug, Serialize)]
pub struct MintKeyResponse {
    /// Key record id.
    pub id: String,
    /// The key's owner.
    pub user_id: String,
    /// Key name.
    pub name: String,
    /// The plaintext key. Shown once; only its hash is stored.
    pub api_key: String,
    /// Expiry, if any.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Mint a new API key for a user.
pub async fn mint_api_key(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(request): Json<MintKeyRequest>,
) -> Result<Json<MintKeyResponse>, ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::BadRequest("key name must not be empty".into()));
    }

    let plaintext = keys::generate_api_key();
    let record = tally_core::ApiKeyRecord::new(
        request.user_id,
        request.name,
        keys::hash_api_key(&plaintext),
        request.expires_at,
    );

    state.store.put_api_key(&record)?;

    Ok(Json(MintKeyResponse {
        id: record.id.to_string(),
        user_id: record.user_id.to_string(),
        name: record.name,
        api_key: plaintext,
        expires_at: record.expires_at,
    }))
}

/// Credit adjustment request.
#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    /// The account to adjust.
    pub user_id: UserId,
    /// Signed amount: positive credits, negative debits.
    pub amount: i64,
    /// Optional description for the audit trail.
    pub description: Option<String>,
    /// Optional idempotency reference; a reuse for the same user is a 409.
    pub reference_id: Option<String>,
}

/// Balance mutation response.
#[derive(Debug, Serialize)]
pub struct MutationResponse {
    /// Transaction id of the recorded mutation.
    pub transaction_id: String,
    /// Balance after the mutation.
    pub balance_after: i64,
}

/// Apply a signed manual balance correction.
pub async fn adjust_credits(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(request): Json<AdjustRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let tx = state.ledger.admin_adjust(
        &request.user_id,
        request.amount,
        request.description,
        request.reference_id,
    )?;

    Ok(Json(MutationResponse {
        transaction_id: tx.id.to_string(),
        balance_after: tx.balance_after,
    }))
}

/// Freeze/unfreeze request.
#[derive(Debug, Deserialize)]
pub struct FreezeRequest {
    /// The account to act on.
    pub user_id: UserId,
    /// Amount of credits to reserve or release. Strictly positive.
    pub amount: i64,
    /// Optional description for the audit trail.
    pub description: Option<String>,
    /// Optional idempotency reference; a reuse for the same user is a 409.
    pub reference_id: Option<String>,
}

/// Reserve part of a user's balance.
pub async fn freeze_credits(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(request): Json<FreezeRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let tx = state.ledger.freeze(
        &request.user_id,
        request.amount,
        request.description,
        request.reference_id,
    )?;

    Ok(Json(MutationResponse {
        transaction_id: tx.id.to_string(),
        balance_after: tx.balance_after,
    }))
}

/// Release part of a user's frozen balance.
pub async fn unfreeze_credits(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(request): Json<FreezeRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let tx = state.ledger.unfreeze(
        &request.user_id,
        request.amount,
        request.description,
        request.reference_id,
    )?;

    Ok(Json(MutationResponse {
        transaction_id: tx.id.to_string(),
        balance_after: tx.balance_after,
    }))
}

/// Distribution request.
#[derive(Debug, Deserialize)]
pub struct DistributeRequest {
    /// Month to distribute for, as `YYYY-MM`. Defaults to the current
    /// month.
    pub period: Option<Period>,
    /// Grant size per user. Defaults to the plan's monthly credits.
    pub credits_per_user: Option<i64>,
}

/// Run the monthly distribution job.
pub async fn distribute(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(request): Json<DistributeRequest>,
) -> Result<Json<DistributionReport>, ApiError> {
    let period = request.period.unwrap_or_else(Period::current);
    let credits_per_user = request
        .credits_per_user
        .unwrap_or(state.config.plan.monthly_credits);
    if credits_per_user <= 0 {
        return Err(ApiError::BadRequest(
            "credits_per_user must be positive".into(),
        ));
    }

    let report = state.distribution.run(period, credits_per_user)?;
    Ok(Json(report))
}
