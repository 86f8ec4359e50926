//! Authentication extractors.
//!
//! This module provides extractors for:
//! - `AuthUser` - End-user authentication via session bearer token
//! - `ApiKeyAuth` - Metered API authentication via `x-api-key`
//! - `AdminAuth` - Operations surface authentication via `x-admin-token`

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::Utc;

use tally_core::UserId;
use tally_store::Store;

use crate::error::ApiError;
use crate::keys;
use crate::state::AppState;

/// An authenticated user extracted from a session bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The user ID.
    pub user_id: UserId,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        _state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let auth_header = parts
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            let token = auth_header
                .strip_prefix("Bearer ")
                .ok_or(ApiError::Unauthorized)?;

            // Test token format: "test-token:<user-uuid>". Real deployments
            // terminate sessions upstream and forward this token.
            if let Some(user_id_str) = token.strip_prefix("test-token:") {
                let user_id = user_id_str
                    .parse::<UserId>()
                    .map_err(|_| ApiError::Unauthorized)?;

                return Ok(AuthUser { user_id });
            }

            Err(ApiError::Unauthorized)
        })
    }
}

/// An authenticated API key presented via the `x-api-key` header.
///
/// Resolving the key also checks expiry and the owner's ban flag, so a
/// handler holding one of these can proceed straight to billing.
#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    /// The key's owner.
    pub user_id: UserId,
    /// Stored hash of the presented key, for usage timestamping.
    pub key_hash: String,
}

impl FromRequestParts<Arc<AppState>> for ApiKeyAuth {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let presented = parts
                .headers
                .get("x-api-key")
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            let key_hash = keys::hash_api_key(presented);

            let record = state
                .store
                .get_api_key_by_hash(&key_hash)?
                .ok_or(ApiError::Unauthorized)?;

            if record.is_expired(Utc::now()) {
                return Err(ApiError::Unauthorized);
            }

            // A banned owner keeps a valid key but loses access.
            let banned = state
                .store
                .get_profile(&record.user_id)?
                .is_some_and(|p| p.banned);
            if banned {
                return Err(ApiError::Forbidden);
            }

            Ok(ApiKeyAuth {
                user_id: record.user_id,
                key_hash,
            })
        })
    }
}

/// Admin authentication via the `x-admin-token` header.
#[derive(Debug, Clone)]
pub struct AdminAuth;

impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let presented = parts
                .headers
                .get("x-admin-token")
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            // With no token configured the admin surface stays closed.
            let expected = state
                .config
                .admin_token
                .as_ref()
                .ok_or(ApiError::Unauthorized)?;

            if !keys::secrets_match(presented, expected) {
                return Err(ApiError::Unauthorized);
            }

            Ok(AdminAuth)
        })
    }
}
