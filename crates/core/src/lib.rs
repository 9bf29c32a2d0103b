//! Domain rules shared by every autobridge crate.
//!
//! This crate has zero internal dependencies so the API, the repository
//! layer and the background worker can all use the same validation and
//! formatting logic.

pub mod clock;
pub mod error;
pub mod saved_search;
pub mod types;
