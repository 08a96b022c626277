//! Unlink Executor
//!
//! Reverses the `linked` entries of an existing ledger. Entries of every
//! other kind are ignored, so pairs that never linked are never touched.
//! Outcomes are appended to the same ledger, which makes a second unlink run
//! over that file skip what was already handled.

use super::{describe_pairing, report_progress, ExecutionAborted, UnlinkSummary};
use crate::client::{LinkClient, LinkError};
use crate::ledger::{outstanding_links, Ledger, LedgerAction, LedgerEntry};
use crate::run_mode::RunMode;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives the link client over the outstanding links of a ledger
pub struct UnlinkExecutor<'a, C: LinkClient + ?Sized> {
    client: &'a C,
    cancel: CancellationToken,
}

impl<'a, C: LinkClient + ?Sized> UnlinkExecutor<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn execute(
        &self,
        ledger_path: &Path,
        mode: RunMode,
    ) -> Result<UnlinkSummary, ExecutionAborted> {
        let entries =
            Ledger::load_all(ledger_path).map_err(|e| ExecutionAborted::new(0, 0, e))?;
        let targets = outstanding_links(&entries);
        let total = targets.len();
        let mut summary = UnlinkSummary::new(total, ledger_path);
        info!(
            total,
            entries = entries.len(),
            mode = %mode,
            ledger = %ledger_path.display(),
            "Unlink run starting"
        );

        if !mode.permits_mutation() {
            for entry in &targets {
                info!(
                    photo = %entry.photo_filename,
                    video = %entry.video_filename,
                    "Would unlink"
                );
            }
            summary.skipped = total;
            return Ok(summary);
        }

        let mut ledger =
            Ledger::open(ledger_path).map_err(|e| ExecutionAborted::new(0, total, e))?;

        for entry in &targets {
            if self.cancel.is_cancelled() {
                warn!(processed = summary.processed(), "Interrupted; stopping at pair boundary");
                summary.interrupted = true;
                break;
            }
            if mode.limit_reached(summary.processed()) {
                debug!(mode = %mode, "Item limit reached");
                break;
            }

            let outcome = match self.unlink_one(entry).await {
                Ok(()) => {
                    summary.unlinked += 1;
                    entry.follow_up(LedgerAction::Unlinked)
                }
                Err(e) => {
                    warn!(
                        photo_id = %entry.photo_id,
                        video_id = %entry.video_id,
                        error = %e,
                        "Unlink failed"
                    );
                    summary.failed += 1;
                    entry.follow_up(LedgerAction::UnlinkFailed).with_error(e.to_string())
                }
            };
            ledger
                .append(&outcome)
                .map_err(|e| ExecutionAborted::new(summary.processed(), total, e))?;

            report_progress("Unlinking", summary.processed(), total);
        }

        summary.skipped = total - summary.processed();
        info!(
            unlinked = summary.unlinked,
            failed = summary.failed,
            skipped = summary.skipped,
            "Unlink run finished"
        );
        Ok(summary)
    }

    /// Refuse to unlink when the photo no longer points at the recorded video
    async fn unlink_one(&self, entry: &LedgerEntry) -> Result<(), LinkError> {
        let current = self.client.current_pairing(entry.photo_id).await?;
        if current != Some(entry.video_id) {
            return Err(LinkError::Conflict(format!(
                "photo {} expected pairing {}, found {}",
                entry.photo_id,
                entry.video_id,
                describe_pairing(current)
            )));
        }
        self.client.unlink_assets(entry.photo_id, entry.video_id).await
    }
}
