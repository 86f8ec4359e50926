//! User profile types.
//!
//! Profiles carry the two per-user inputs the accounting engine consumes
//! from the outside world: whether the user is banned, and whether a paid
//! subscription is currently in force.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// Status of a user's payment subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Subscription is active and paid.
    Active,

    /// Trial period, treated as paid.
    Trialing,

    /// Payment failed, subscription is past due.
    PastDue,

    /// Subscription was canceled.
    Canceled,
}

/// Per-user profile row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// The user ID.
    pub user_id: UserId,

    /// Banned users are rejected at the metered gateway.
    pub banned: bool,

    /// Current subscription status, if the user ever subscribed.
    pub subscription: Option<SubscriptionStatus>,

    /// When the profile was created.
    pub created_at: DateTime<Utc>,

    /// When the profile was last updated.
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Create a profile with no subscription and no ban.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            banned: false,
            subscription: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the user currently holds a paid subscription.
    ///
    /// `active` and `trialing` both count; such users are excluded from
    /// the monthly free-credit grant.
    #[must_use]
    pub fn has_active_subscription(&self) -> bool {
        matches!(
            self.subscription,
            Some(SubscriptionStatus::Active | SubscriptionStatus::Trialing)
        )
    }
}
