//! API key records.
//!
//! Keys are stored by their SHA-256 hash; the plaintext is returned exactly
//! once at mint time and never touches the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ApiKeyId, UserId};

/// A stored API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    /// Unique key ID.
    pub id: ApiKeyId,

    /// The user this key resolves to.
    pub user_id: UserId,

    /// Human-readable label.
    pub name: String,

    /// Hex-encoded SHA-256 of the plaintext key.
    pub key_hash: String,

    /// Expiry, if the key expires.
    pub expires_at: Option<DateTime<Utc>>,

    /// When the key was minted.
    pub created_at: DateTime<Utc>,

    /// Last successful use. Updated best-effort, outside the spend's
    /// atomic unit.
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKeyRecord {
    /// Create a new key record.
    #[must_use]
    pub fn new(
        user_id: UserId,
        name: String,
        key_hash: String,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: ApiKeyId::generate(),
            user_id,
            name,
            key_hash,
            expires_at,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }

    /// Whether the key has expired as of `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}
