//! livelink library interface
//!
//! Reconciliation engine for Live Photo pairs whose image and motion-video
//! components lost their link:
//! - `matcher` finds image/video pairs sharing a filename stem
//! - `ledger` records every proposal and outcome, write-ahead
//! - `executor` links (or reverses links) one pair at a time
//! - `run_mode` gates how much a run may mutate
//!
//! `store` and `client` are the gateways to the asset database and the
//! photo server API.

pub mod client;
pub mod confirm;
pub mod executor;
pub mod ledger;
pub mod matcher;
pub mod models;
pub mod run_mode;
pub mod store;

pub use client::{ImmichClient, LinkClient, LinkError};
pub use executor::{ExecutionAborted, LinkExecutor, LinkSummary, UnlinkExecutor, UnlinkSummary};
pub use ledger::{Ledger, LedgerAction, LedgerEntry};
pub use matcher::{MatchPolicy, MatchReport, PairMatcher};
pub use models::{Asset, AssetId, CandidatePair, MediaKind};
pub use run_mode::RunMode;
pub use store::{AssetStore, PgAssetStore};
