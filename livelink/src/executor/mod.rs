//! Link and Unlink Executors
//!
//! Both executors process strictly one pair at a time, in the order they are
//! given, and honour the run mode. A per-pair failure is written to the
//! ledger and the batch continues; only a ledger failure stops the run.
//! Interruption is observed between pairs, never mid-pair.

pub mod link;
pub mod unlink;

pub use link::LinkExecutor;
pub use unlink::UnlinkExecutor;

use crate::models::AssetId;
use livelink_common::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Log a progress line every this many items (first and last always logged)
const PROGRESS_INTERVAL: usize = 50;

/// Fatal error with a count of what had already been processed
#[derive(Debug, Error)]
#[error("run aborted after {processed} of {total} items")]
pub struct ExecutionAborted {
    pub processed: usize,
    pub total: usize,
    #[source]
    pub source: Error,
}

impl ExecutionAborted {
    pub(crate) fn new(processed: usize, total: usize, source: impl Into<Error>) -> Self {
        Self {
            processed,
            total,
            source: source.into(),
        }
    }
}

/// Outcome counts of a link run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSummary {
    pub total: usize,
    pub linked: usize,
    pub failed: usize,
    /// Pairs not attempted (dry-run, test-run limit, interruption)
    pub skipped: usize,
    pub interrupted: bool,
    pub ledger_path: PathBuf,
}

impl LinkSummary {
    fn new(total: usize, ledger_path: &Path) -> Self {
        Self {
            total,
            linked: 0,
            failed: 0,
            skipped: 0,
            interrupted: false,
            ledger_path: ledger_path.to_path_buf(),
        }
    }

    /// Pairs with a recorded live outcome
    pub fn processed(&self) -> usize {
        self.linked + self.failed
    }
}

impl fmt::Display for LinkSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Linked: {}, Failed: {}, Skipped: {} (of {}){}\nLedger: {}",
            self.linked,
            self.failed,
            self.skipped,
            self.total,
            if self.interrupted { " [interrupted]" } else { "" },
            self.ledger_path.display()
        )
    }
}

/// Outcome counts of an unlink run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlinkSummary {
    pub total: usize,
    pub unlinked: usize,
    pub failed: usize,
    pub skipped: usize,
    pub interrupted: bool,
    pub ledger_path: PathBuf,
}

impl UnlinkSummary {
    fn new(total: usize, ledger_path: &Path) -> Self {
        Self {
            total,
            unlinked: 0,
            failed: 0,
            skipped: 0,
            interrupted: false,
            ledger_path: ledger_path.to_path_buf(),
        }
    }

    pub fn processed(&self) -> usize {
        self.unlinked + self.failed
    }
}

impl fmt::Display for UnlinkSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unlinked: {}, Failed: {}, Skipped: {} (of {}){}\nLedger: {}",
            self.unlinked,
            self.failed,
            self.skipped,
            self.total,
            if self.interrupted { " [interrupted]" } else { "" },
            self.ledger_path.display()
        )
    }
}

fn report_progress(verb: &str, processed: usize, total: usize) {
    if processed == 1 || processed == total || processed % PROGRESS_INTERVAL == 0 {
        info!(processed, total, "{} asset: {}/{}", verb, processed, total);
    }
}

fn describe_pairing(pairing: Option<AssetId>) -> String {
    match pairing {
        Some(id) => id.to_string(),
        None => "no pairing".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_display_includes_ledger_path() {
        let mut summary = LinkSummary::new(3, Path::new("output/link_ledger.jsonl"));
        summary.linked = 2;
        summary.failed = 1;
        let text = summary.to_string();
        assert!(text.contains("Linked: 2, Failed: 1, Skipped: 0 (of 3)"));
        assert!(text.contains("output/link_ledger.jsonl"));
        assert_eq!(summary.processed(), 3);
    }

    #[test]
    fn test_aborted_keeps_fatal_source() {
        let err = ExecutionAborted::new(4, 10, Error::Connectivity("down".into()));
        assert_eq!(err.to_string(), "run aborted after 4 of 10 items");
        assert!(matches!(err.source, Error::Connectivity(_)));
    }
}
