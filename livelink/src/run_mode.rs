//! Run-Mode Controller
//!
//! A pure gating policy. The mode is chosen once per invocation and decides
//! whether remote mutation is allowed and how many items an executor may
//! process before stopping.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Safety gate for a single invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Identify and record proposals, never mutate
    DryRun,
    /// Exactly one live mutation, then stop
    TestRun,
    /// Process the entire candidate set
    FullRun,
}

impl RunMode {
    /// Map CLI flags to a mode; `--dry-run` wins over `--test-run`
    pub fn from_flags(dry_run: bool, test_run: bool) -> Self {
        if dry_run {
            RunMode::DryRun
        } else if test_run {
            RunMode::TestRun
        } else {
            RunMode::FullRun
        }
    }

    /// Whether executors may call the remote link client at all
    pub fn permits_mutation(self) -> bool {
        !matches!(self, RunMode::DryRun)
    }

    /// Maximum number of live items before the executor must stop
    pub fn item_limit(self) -> Option<usize> {
        match self {
            RunMode::TestRun => Some(1),
            RunMode::DryRun | RunMode::FullRun => None,
        }
    }

    /// True once `processed` live items have used up the limit
    pub fn limit_reached(self, processed: usize) -> bool {
        self.item_limit().is_some_and(|limit| processed >= limit)
    }

    /// Prefix for ledger file names
    pub fn ledger_prefix(self) -> &'static str {
        match self {
            RunMode::DryRun => "DRY_RUN_",
            RunMode::TestRun => "TEST_RUN_",
            RunMode::FullRun => "",
        }
    }

    /// Process exit status for a finished run
    ///
    /// Only a full-run with failed items is non-zero: a dry or test run is
    /// not a full mutation attempt.
    pub fn exit_code(self, failed: usize) -> u8 {
        match self {
            RunMode::FullRun if failed > 0 => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunMode::DryRun => "dry-run",
            RunMode::TestRun => "test-run",
            RunMode::FullRun => "full-run",
        })
    }
}
