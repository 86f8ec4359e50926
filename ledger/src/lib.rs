//! Credit accounting services for the tally platform.
//!
//! This crate hosts the domain services that sit between the HTTP surface
//! and the storage layer:
//!
//! - [`CreditLedger`]: balance mutations (earn, spend, refund, adjust,
//!   freeze) and transaction history.
//! - [`QuotaTracker`]: per-user, per-service, per-month usage counters.
//! - [`MonthlyDistribution`]: the batch job that grants free monthly
//!   credits and refreshes quota rows for every user.
//! - [`AccountBootstrap`]: idempotent signup initialization.
//!
//! All services are generic over [`tally_store::Store`], so tests can run
//! them against `MemStore` while production wires up `RocksStore`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bootstrap;
pub mod credit;
pub mod distribution;
pub mod quota;

pub use bootstrap::{AccountBootstrap, BootstrapOutcome};
pub use credit::CreditLedger;
pub use distribution::{DistributionReport, MonthlyDistribution};
pub use quota::QuotaTracker;
