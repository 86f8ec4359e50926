//! Core types for the tally credits and quota service.
//!
//! This crate provides the foundational types used throughout tally:
//!
//! - **Identifiers**: `UserId`, `TransactionId`, `ApiKeyId`
//! - **Accounts**: `CreditAccount`
//! - **Credits**: `CreditTransaction`, `TransactionType`, `TransactionSource`, `LedgerEntry`
//! - **Quota**: `QuotaUsageRecord`, `QuotaService`, `Period`
//! - **Users**: `UserProfile`, `SubscriptionStatus`, `ApiKeyRecord`
//! - **Plans**: `PlanConfig`
//!
//! # Credit Unit
//!
//! Credits are whole integers stored as `i64`. One metered API call costs
//! one or more credits; amounts supplied to ledger operations are always
//! strictly positive magnitudes, with direction implied by the transaction
//! type.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod apikey;
pub mod credits;
pub mod error;
pub mod ids;
pub mod plan;
pub mod profile;
pub mod quota;

pub use account::CreditAccount;
pub use apikey::ApiKeyRecord;
pub use credits::{CreditTransaction, EntryEffect, LedgerEntry, TransactionSource, TransactionType};
pub use error::{LedgerError, Result};
pub use ids::{ApiKeyId, IdError, QuotaRecordId, TransactionId, UserId};
pub use plan::PlanConfig;
pub use profile::{SubscriptionStatus, UserProfile};
pub use quota::{Period, PeriodError, QuotaService, QuotaUsageRecord};
