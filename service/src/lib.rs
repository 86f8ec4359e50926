//! Tally HTTP API Service.
//!
//! This crate provides the HTTP API for the tally credit and quota
//! service, including:
//!
//! - Signup bootstrap and credit balances
//! - Transaction history
//! - Metered data and chat endpoints billed per call
//! - Admin surface for adjustments and the monthly distribution job
//!
//! # Authentication
//!
//! The service supports three authentication methods:
//!
//! 1. **Session tokens** - For end-user requests (dashboard, etc.)
//! 2. **API keys** - For metered programmatic access under `/api`
//! 3. **Admin token** - For the operations surface under `/v1/admin`

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handler signatures are async for the router

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod keys;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
