//! Metered API handlers.
//!
//! These endpoints authenticate with an API key and bill the owner's
//! credit account per call. The flow is check, work, charge: an early
//! balance check rejects callers who cannot pay before any work happens,
//! and the atomic spend afterwards catches balances that raced to zero
//! in between.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use tally_core::{QuotaService, TransactionId, TransactionSource};
use tally_store::Store;

use crate::auth::ApiKeyAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Size of the synthetic dataset served by `/api/data`.
const DATASET_SIZE: usize = 100;

/// Billing summary attached to every metered response.
#[derive(Debug, Serialize)]
pub struct CreditsUsed {
    /// Credits charged for this call.
    pub used: i64,
    /// Spendable balance after the charge.
    pub remaining: i64,
}

/// Data page query parameters.
#[derive(Debug, Deserialize)]
pub struct DataQuery {
    /// 1-based page number (default: 1).
    #[serde(default = "default_page")]
    pub page: usize,
    /// Items per page (default: 10, max: 50).
    #[serde(default = "default_per_page")]
    pub per_page: usize,
}

fn default_page() -> usize {
    1
}

fn default_per_page() -> usize {
    10
}

/// One item of the metered dataset.
#[derive(Debug, Serialize)]
pub struct DataItem {
    /// Item id.
    pub id: usize,
    /// Item name.
    pub name: String,
    /// Item value.
    pub value: i64,
}

/// Data page response.
#[derive(Debug, Serialize)]
pub struct DataResponse {
    /// The requested page of items.
    pub data: Vec<DataItem>,
    /// The page served.
    pub page: usize,
    /// Items per page.
    pub per_page: usize,
    /// Total items in the dataset.
    pub total: usize,
    /// Billing summary.
    pub credits: CreditsUsed,
}

/// Serve one page of the metered dataset, billed per call.
pub async fn get_data(
    State(state): State<Arc<AppState>>,
    auth: ApiKeyAuth,
    Query(query): Query<DataQuery>,
) -> Result<Json<DataResponse>, ApiError> {
    if query.page == 0 {
        return Err(ApiError::BadRequest("page must be at least 1".into()));
    }
    let per_page = query.per_page.clamp(1, 50);

    let cost = state.config.plan.data_cost_per_call;
    ensure_can_pay(&state, &auth, cost)?;

    // Page bounds are checked before charging; a miss costs nothing.
    // Pages whose offset does not even fit a usize are past the end too.
    let start = match (query.page - 1).checked_mul(per_page) {
        Some(start) if start < DATASET_SIZE => start,
        _ => {
            return Err(ApiError::NotFound(format!(
                "page {} is past the end of the dataset",
                query.page
            )));
        }
    };

    let data: Vec<DataItem> = (start..(start + per_page).min(DATASET_SIZE))
        .map(|i| DataItem {
            id: i + 1,
            name: format!("item-{}", i + 1),
            // Deterministic so repeated reads of a page agree.
            value: (i as i64 + 1) * 37 % 1000,
        })
        .collect();

    let credits = charge(&state, &auth, cost, "GET /api/data")?;

    Ok(Json(DataResponse {
        data,
        page: query.page,
        per_page,
        total: DATASET_SIZE,
        credits,
    }))
}

/// Chat request.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// The prompt to complete.
    pub prompt: String,
}

/// Chat response.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    /// The completion.
    pub reply: String,
    /// Prompt length the charge was computed from.
    pub prompt_chars: usize,
    /// Billing summary.
    pub credits: CreditsUsed,
}

/// Serve a chat completion, billed by prompt length.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    auth: ApiKeyAuth,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return Err(ApiError::BadRequest("prompt must not be empty".into()));
    }

    let prompt_chars = prompt.chars().count();
    let cost = state.config.plan.chat_cost(prompt_chars as i64);
    ensure_can_pay(&state, &auth, cost)?;

    // Placeholder completion; a real deployment proxies a model here.
    let reply = format!(
        "You said {prompt_chars} characters. Echo: {}",
        prompt.chars().take(80).collect::<String>()
    );

    let credits = charge(&state, &auth, cost, "POST /api/v1/ai/chat")?;

    Ok(Json(ChatResponse {
        reply,
        prompt_chars,
        credits,
    }))
}

/// Reject callers whose available balance cannot cover `cost` before any
/// work is done.
fn ensure_can_pay(state: &AppState, auth: &ApiKeyAuth, cost: i64) -> Result<(), ApiError> {
    if state.ledger.has_enough_credits(&auth.user_id, cost)? {
        return Ok(());
    }

    let available = state
        .ledger
        .get_account(&auth.user_id)
        .map_or(0, |a| a.available());
    Err(ApiError::InsufficientCredits {
        available,
        required: cost,
    })
}

/// Charge the caller and record usage. The spend is atomic; usage row and
/// key timestamp updates are best-effort bookkeeping after it.
fn charge(
    state: &AppState,
    auth: &ApiKeyAuth,
    cost: i64,
    endpoint: &str,
) -> Result<CreditsUsed, ApiError> {
    // Unique per call, so a gateway retry cannot double-charge.
    let call_reference = format!("call_{}", TransactionId::generate());

    let tx = state.ledger.spend(
        &auth.user_id,
        cost,
        TransactionSource::ApiCall,
        Some(endpoint.to_string()),
        Some(call_reference),
    )?;

    if let Err(e) = state
        .quota
        .update_usage(&auth.user_id, &QuotaService::ApiCall, 1, None)
    {
        warn!(user_id = %auth.user_id, error = %e, "usage tracking failed");
    }
    if let Err(e) = state.store.touch_api_key(&auth.key_hash, Utc::now()) {
        warn!(user_id = %auth.user_id, error = %e, "key timestamp update failed");
    }

    let remaining = state
        .ledger
        .get_account(&auth.user_id)
        .map_or(tx.balance_after, |a| a.available());

    Ok(CreditsUsed {
        used: cost,
        remaining,
    })
}
