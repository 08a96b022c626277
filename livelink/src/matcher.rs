//! Pair Matcher
//!
//! Finds image/video pairs that share a filename stem but are not linked.
//!
//! # Algorithm
//! 1. Load every video whose name ends with the live-video suffix and that no
//!    image references, ordered by creation time.
//! 2. Strip the suffix to get the stem and load the images with that stem.
//! 3. Keep only unlinked images. None left → unmatched. Otherwise take the
//!    one closest in creation time; an exact tie (or any choice under the
//!    `reject` policy) is ambiguous and never auto-paired.
//! 4. A photo already claimed by an earlier video is not reused.
//!
//! Each call re-queries the store; nothing survives between invocations.
//! Any store failure aborts identification instead of yielding a partial set.

use crate::models::{filename_stem, strip_live_suffix, time_delta, Asset, AssetId, CandidatePair};
use crate::store::AssetStore;
use async_stream::try_stream;
use chrono::Duration;
use futures::{pin_mut, Stream, StreamExt};
use livelink_common::config::{AmbiguityPolicy, MatchingConfig};
use livelink_common::{Error, Result};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Matching rules, fixed for the matcher's lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPolicy {
    pub live_video_suffix: String,
    pub max_time_delta: Option<Duration>,
    pub ambiguity: AmbiguityPolicy,
}

impl MatchPolicy {
    pub fn new(live_video_suffix: impl Into<String>) -> Self {
        Self {
            live_video_suffix: live_video_suffix.into(),
            max_time_delta: None,
            ambiguity: AmbiguityPolicy::NearestTimestamp,
        }
    }
}

impl From<&MatchingConfig> for MatchPolicy {
    fn from(config: &MatchingConfig) -> Self {
        Self {
            live_video_suffix: config.live_video_suffix.clone(),
            // A window wider than `Duration` can represent admits every pair
            max_time_delta: config
                .max_time_delta_secs
                .and_then(|secs| i64::try_from(secs).ok())
                .and_then(Duration::try_seconds),
            ambiguity: config.ambiguity_policy,
        }
    }
}

/// Why a video could not be paired
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnmatchedReason {
    /// No image shares the stem
    NoPhoto,
    /// Every image with the stem is already linked to another video
    PhotoAlreadyLinked {
        photo_id: AssetId,
        linked_to: Option<AssetId>,
    },
    /// Best photo was created too far from the video
    TimestampOutOfRange { delta: Duration },
    /// Best photo was already paired with an earlier video in this pass
    PhotoClaimed {
        photo_id: AssetId,
        claimed_by: AssetId,
    },
}

/// Video that was skipped, with the reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmatchedVideo {
    pub video: Asset,
    pub reason: UnmatchedReason,
}

/// Video with several equally good photos; reported, never auto-linked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousMatch {
    pub video: Asset,
    pub candidates: Vec<Asset>,
}

impl AmbiguousMatch {
    /// Per-pair error describing the ambiguity
    pub fn to_error(&self) -> Error {
        Error::MatchAmbiguity(format!(
            "{} matches {} photos: {}",
            self.video.original_filename,
            self.candidates.len(),
            self.candidates
                .iter()
                .map(|c| c.original_filename.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }
}

/// Outcome for one video
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Paired(CandidatePair),
    Ambiguous(AmbiguousMatch),
    Unmatched(UnmatchedVideo),
}

/// Complete identification result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchReport {
    /// Pairs to link, in ascending video creation order
    pub pairs: Vec<CandidatePair>,
    pub ambiguous: Vec<AmbiguousMatch>,
    pub unmatched: Vec<UnmatchedVideo>,
}

impl MatchReport {
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Pair matcher over an asset store
pub struct PairMatcher<'a, S: AssetStore + ?Sized> {
    store: &'a S,
    policy: MatchPolicy,
}

impl<'a, S: AssetStore + ?Sized> PairMatcher<'a, S> {
    pub fn new(store: &'a S, policy: MatchPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    /// Lazily yield one outcome per candidate video
    ///
    /// Restartable: every call issues fresh store queries.
    pub fn outcomes(&self) -> impl Stream<Item = Result<MatchOutcome>> + 'a {
        let store = self.store;
        let policy = self.policy.clone();

        try_stream! {
            let suffix = policy.live_video_suffix.clone();
            let mut videos = store.unlinked_live_videos(&suffix).await?;
            videos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            debug!(videos = videos.len(), "Candidate live videos loaded");

            let mut claimed: HashMap<AssetId, AssetId> = HashMap::new();
            for video in videos {
                if video.is_linked() {
                    continue;
                }
                let stem = match strip_live_suffix(&video.original_filename, &suffix) {
                    Some(stem) => stem.to_string(),
                    None => continue,
                };
                let images = store.images_with_stem(&stem).await?;
                let outcome = resolve_candidates(video, images, &policy, &claimed);
                if let MatchOutcome::Paired(pair) = &outcome {
                    claimed.insert(pair.photo_id, pair.video_id);
                }
                yield outcome;
            }
        }
    }

    /// Run identification to completion
    pub async fn find_unlinked_pairs(&self) -> Result<MatchReport> {
        let mut report = MatchReport::default();
        let outcomes = self.outcomes();
        pin_mut!(outcomes);

        while let Some(outcome) = outcomes.next().await {
            match outcome? {
                MatchOutcome::Paired(pair) => report.pairs.push(pair),
                MatchOutcome::Ambiguous(ambiguous) => {
                    warn!("{}", ambiguous.to_error());
                    report.ambiguous.push(ambiguous);
                }
                MatchOutcome::Unmatched(unmatched) => {
                    debug!(
                        video = %unmatched.video.original_filename,
                        reason = ?unmatched.reason,
                        "Video left unmatched"
                    );
                    report.unmatched.push(unmatched);
                }
            }
        }

        info!(
            pairs = report.pairs.len(),
            ambiguous = report.ambiguous.len(),
            unmatched = report.unmatched.len(),
            "Identification complete"
        );
        Ok(report)
    }
}

/// Decide the outcome for one video given every image sharing its stem
pub fn resolve_candidates(
    video: Asset,
    images: Vec<Asset>,
    policy: &MatchPolicy,
    claimed: &HashMap<AssetId, AssetId>,
) -> MatchOutcome {
    let suffix = policy.live_video_suffix.as_str();
    let expected_stem = strip_live_suffix(&video.original_filename, suffix);

    let (unlinked, linked): (Vec<Asset>, Vec<Asset>) = images
        .into_iter()
        .filter(|image| image.id != video.id && Some(filename_stem(&image.original_filename)) == expected_stem)
        .partition(|image| !image.is_linked());

    if unlinked.is_empty() {
        let reason = match linked.first() {
            Some(photo) => UnmatchedReason::PhotoAlreadyLinked {
                photo_id: photo.id,
                linked_to: photo.pairing,
            },
            None => UnmatchedReason::NoPhoto,
        };
        return MatchOutcome::Unmatched(UnmatchedVideo { video, reason });
    }

    let considered = unlinked.len();
    if considered > 1 && policy.ambiguity == AmbiguityPolicy::Reject {
        return MatchOutcome::Ambiguous(AmbiguousMatch {
            video,
            candidates: unlinked,
        });
    }

    let best_delta = unlinked
        .iter()
        .map(|image| time_delta(image.created_at, video.created_at))
        .min()
        .unwrap_or_else(Duration::zero);
    let mut best: Vec<Asset> = unlinked
        .into_iter()
        .filter(|image| time_delta(image.created_at, video.created_at) == best_delta)
        .collect();

    if best.len() > 1 {
        return MatchOutcome::Ambiguous(AmbiguousMatch {
            video,
            candidates: best,
        });
    }
    let photo = best.remove(0);

    if let Some(max) = policy.max_time_delta {
        if best_delta > max {
            return MatchOutcome::Unmatched(UnmatchedVideo {
                video,
                reason: UnmatchedReason::TimestampOutOfRange { delta: best_delta },
            });
        }
    }

    if let Some(&claimed_by) = claimed.get(&photo.id) {
        return MatchOutcome::Unmatched(UnmatchedVideo {
            video,
            reason: UnmatchedReason::PhotoClaimed {
                photo_id: photo.id,
                claimed_by,
            },
        });
    }

    MatchOutcome::Paired(CandidatePair::new(&photo, &video, suffix, considered))
}
