//! Foundation utilities for deckforge.
//!
//! Shared data model types, the error taxonomy, tracing setup, and small
//! filesystem helpers used by the other workspace crates.

pub mod atomic_write;
pub mod error;
pub mod logging;
pub mod types;
