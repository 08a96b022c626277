//! # livelink common library
//!
//! Shared code for the livelink tools:
//! - Error taxonomy (fatal and per-pair kinds, ledger errors)
//! - TOML configuration loading, resolution and validation
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod time;

pub use error::{Error, LedgerError, Result};
