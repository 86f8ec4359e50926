//! API handlers.

// Allow lossless-in-practice casts in handlers - dataset indexes and prompt
// lengths are far below i64 range
#![allow(clippy::cast_possible_wrap)]

pub mod accounts;
pub mod admin;
pub mod health;
pub mod metered;
