//! Asset and candidate pair models

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Asset identifier as assigned by the photo server
pub type AssetId = Uuid;

/// Media kind of a stored asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Value stored in the asset table's `type` column
    pub fn as_db_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "IMAGE",
            MediaKind::Video => "VIDEO",
        }
    }

    pub fn from_db_str(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "IMAGE" => Some(MediaKind::Image),
            "VIDEO" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// A stored media item, read-only from this crate's point of view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub original_filename: String,
    pub created_at: DateTime<Utc>,
    pub kind: MediaKind,
    /// Linked counterpart: the video for an image, the referencing image for a video
    pub pairing: Option<AssetId>,
}

impl Asset {
    pub fn is_linked(&self) -> bool {
        self.pairing.is_some()
    }

    /// Filename with its final extension removed
    pub fn stem(&self) -> &str {
        filename_stem(&self.original_filename)
    }
}

/// Strip the final extension: `IMG_1234.HEIC` → `IMG_1234`
///
/// Names without a dot (or with only a leading dot) are returned unchanged.
pub fn filename_stem(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => &filename[..idx],
        _ => filename,
    }
}

/// Strip the live-video suffix, compared ASCII case-insensitively
///
/// `IMG_1234_3.MOV` with suffix `_3.mov` → `Some("IMG_1234")`. Returns `None`
/// when the name does not end with the suffix or nothing would remain.
pub fn strip_live_suffix<'a>(filename: &'a str, suffix: &str) -> Option<&'a str> {
    if suffix.is_empty() || filename.len() <= suffix.len() {
        return None;
    }
    let split = filename.len() - suffix.len();
    if !filename.is_char_boundary(split) {
        return None;
    }
    let (stem, tail) = filename.split_at(split);
    if tail.eq_ignore_ascii_case(suffix) {
        Some(stem)
    } else {
        None
    }
}

/// Why a pair was proposed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchBasis {
    /// Suffix stripped from the video name to obtain the shared stem
    pub suffix: String,
    /// Absolute creation-time difference in milliseconds
    pub time_delta_ms: i64,
    /// Unlinked photos sharing the stem that were weighed against each other
    pub candidates_considered: usize,
}

/// A proposed photo/video association
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatePair {
    pub photo_id: AssetId,
    pub video_id: AssetId,
    pub photo_filename: String,
    pub video_filename: String,
    pub photo_created_at: DateTime<Utc>,
    pub video_created_at: DateTime<Utc>,
    pub basis: MatchBasis,
}

impl CandidatePair {
    pub fn new(photo: &Asset, video: &Asset, suffix: &str, candidates_considered: usize) -> Self {
        Self {
            photo_id: photo.id,
            video_id: video.id,
            photo_filename: photo.original_filename.clone(),
            video_filename: video.original_filename.clone(),
            photo_created_at: photo.created_at,
            video_created_at: video.created_at,
            basis: MatchBasis {
                suffix: suffix.to_string(),
                time_delta_ms: time_delta(photo.created_at, video.created_at).num_milliseconds(),
                candidates_considered,
            },
        }
    }

    pub fn time_delta(&self) -> Duration {
        time_delta(self.photo_created_at, self.video_created_at)
    }
}

impl fmt::Display for CandidatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) <- {} ({})",
            self.photo_filename, self.photo_id, self.video_filename, self.video_id
        )
    }
}

/// Absolute difference between two creation timestamps
pub fn time_delta(a: DateTime<Utc>, b: DateTime<Utc>) -> Duration {
    let delta = a.signed_duration_since(b);
    if delta < Duration::zero() {
        -delta
    } else {
        delta
    }
}
