//! Link Executor
//!
//! Per pair: write `proposed`, then (unless dry-run) check that the photo is
//! still unlinked, call the link client and write `linked` or `link-failed`.
//! The proposal always reaches storage before the remote call, so a crash
//! mid-pair still leaves the intent on record.
//!
//! Resumption after a partial run needs no checkpoint: linked assets drop out
//! of the next identification pass.

use super::{describe_pairing, report_progress, ExecutionAborted, LinkSummary};
use crate::client::{LinkClient, LinkError};
use crate::ledger::{Ledger, LedgerAction, LedgerEntry};
use crate::models::CandidatePair;
use crate::run_mode::RunMode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives the link client over an ordered list of pairs
pub struct LinkExecutor<'a, C: LinkClient + ?Sized> {
    client: &'a C,
    verify_links: bool,
    cancel: CancellationToken,
}

impl<'a, C: LinkClient + ?Sized> LinkExecutor<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            verify_links: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Read each pairing back after linking before recording `linked`
    pub fn with_verification(mut self, verify_links: bool) -> Self {
        self.verify_links = verify_links;
        self
    }

    /// Stop at the next pair boundary once `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Link freshly identified pairs
    pub async fn execute(
        &self,
        pairs: &[CandidatePair],
        mode: RunMode,
        ledger: &mut Ledger,
    ) -> Result<LinkSummary, ExecutionAborted> {
        let targets: Vec<LedgerEntry> = pairs
            .iter()
            .map(|pair| LedgerEntry::for_pair(pair, LedgerAction::Proposed))
            .collect();
        self.run(&targets, mode, ledger).await
    }

    /// Link pairs proposed in an earlier ledger, without re-identifying
    ///
    /// Pass the result of `ledger::unapplied_proposals`. Each pair is proposed
    /// again in `ledger`, and the precondition check skips any photo that was
    /// linked elsewhere in the meantime.
    pub async fn replay(
        &self,
        proposals: &[LedgerEntry],
        mode: RunMode,
        ledger: &mut Ledger,
    ) -> Result<LinkSummary, ExecutionAborted> {
        self.run(proposals, mode, ledger).await
    }

    async fn run(
        &self,
        targets: &[LedgerEntry],
        mode: RunMode,
        ledger: &mut Ledger,
    ) -> Result<LinkSummary, ExecutionAborted> {
        let total = targets.len();
        let mut summary = LinkSummary::new(total, ledger.path());
        info!(total, mode = %mode, ledger = %ledger.path().display(), "Link run starting");

        for target in targets {
            if self.cancel.is_cancelled() {
                warn!(processed = summary.processed(), "Interrupted; stopping at pair boundary");
                summary.interrupted = true;
                break;
            }
            if mode.limit_reached(summary.processed()) {
                debug!(mode = %mode, "Item limit reached");
                break;
            }

            let proposal = target.follow_up(LedgerAction::Proposed);
            ledger
                .append(&proposal)
                .map_err(|e| ExecutionAborted::new(summary.processed(), total, e))?;

            if !mode.permits_mutation() {
                debug!(
                    photo = %proposal.photo_filename,
                    video = %proposal.video_filename,
                    "Proposed (dry-run)"
                );
                continue;
            }

            let outcome = match self.link_one(&proposal).await {
                Ok(LinkOutcome::Confirmed) => {
                    summary.linked += 1;
                    proposal.follow_up(LedgerAction::Linked)
                }
                Ok(LinkOutcome::Unverified(e)) => {
                    warn!(
                        photo_id = %proposal.photo_id,
                        error = %e,
                        "Link applied but could not be read back"
                    );
                    summary.linked += 1;
                    proposal
                        .follow_up(LedgerAction::Linked)
                        .with_error(format!("verification failed: {}", e))
                }
                Err(e) => {
                    warn!(
                        photo_id = %proposal.photo_id,
                        video_id = %proposal.video_id,
                        error = %e,
                        "Link failed"
                    );
                    summary.failed += 1;
                    proposal.follow_up(LedgerAction::LinkFailed).with_error(e.to_string())
                }
            };
            ledger
                .append(&outcome)
                .map_err(|e| ExecutionAborted::new(summary.processed(), total, e))?;

            report_progress("Linking", summary.processed(), total);
        }

        summary.skipped = total - summary.processed();
        info!(
            linked = summary.linked,
            failed = summary.failed,
            skipped = summary.skipped,
            "Link run finished"
        );
        Ok(summary)
    }

    /// Link one pair unless the photo changed since it was proposed
    ///
    /// Once the link call has succeeded the pair is recorded as `linked`
    /// even if the read-back fails, so that rollback still finds it.
    async fn link_one(&self, proposal: &LedgerEntry) -> Result<LinkOutcome, LinkError> {
        let (photo_id, video_id) = proposal.pair_key();

        match self.client.current_pairing(photo_id).await? {
            None => {}
            Some(current) if current == video_id => {
                debug!(photo_id = %photo_id, "Pair already linked");
                return Ok(LinkOutcome::Confirmed);
            }
            Some(current) => {
                return Err(LinkError::Conflict(format!(
                    "photo {} was linked to {} after identification",
                    photo_id, current
                )));
            }
        }

        self.client.link_assets(photo_id, video_id).await?;

        if !self.verify_links {
            return Ok(LinkOutcome::Confirmed);
        }
        match self.client.current_pairing(photo_id).await {
            Ok(Some(current)) if current == video_id => Ok(LinkOutcome::Confirmed),
            Ok(current) => Err(LinkError::Conflict(format!(
                "link reported success but photo {} shows {}",
                photo_id,
                describe_pairing(current)
            ))),
            Err(e) => Ok(LinkOutcome::Unverified(e)),
        }
    }
}

/// Result of a link call the server accepted
enum LinkOutcome {
    Confirmed,
    /// Applied, but the read-back failed
    Unverified(LinkError),
}
