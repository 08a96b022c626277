//! Test doubles for integration tests
//!
//! `FakeLibrary` plays both external collaborators: it answers asset store
//! queries and applies link/unlink calls to the same in-memory state, so a
//! link run is visible to the next identification pass. Every client call is
//! recorded for call-count assertions.

#![allow(dead_code)]

pub mod mock_server;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use livelink::client::{LinkClient, LinkError};
use livelink::models::{filename_stem, strip_live_suffix, Asset, AssetId, MediaKind};
use livelink::store::AssetStore;
use livelink_common::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

/// Client call as observed by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Link(AssetId, AssetId),
    Unlink(AssetId, AssetId),
    Read(AssetId),
}

#[derive(Debug, Clone)]
struct StoredAsset {
    id: AssetId,
    filename: String,
    created_at: DateTime<Utc>,
    kind: MediaKind,
    /// Only images carry the reference, as on the real server
    live_photo_video_id: Option<AssetId>,
}

#[derive(Default)]
struct State {
    assets: Vec<StoredAsset>,
    calls: Vec<Call>,
    fail_links: HashMap<AssetId, LinkError>,
    fail_unlinks: HashMap<AssetId, LinkError>,
    ignore_links: HashSet<AssetId>,
    /// Read errors served once, after the photo has been linked
    fail_linked_reads: HashMap<AssetId, LinkError>,
    store_offline: bool,
}

/// In-memory photo library
#[derive(Default)]
pub struct FakeLibrary {
    state: Mutex<State>,
}

/// Fixed base time so tests can express offsets in seconds
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 14, 18, 30, 0).unwrap()
}

impl FakeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&self, filename: &str, kind: MediaKind, offset_secs: i64, link: Option<AssetId>) -> AssetId {
        let id = Uuid::new_v4();
        self.state.lock().unwrap().assets.push(StoredAsset {
            id,
            filename: filename.to_string(),
            created_at: base_time() + Duration::seconds(offset_secs),
            kind,
            live_photo_video_id: link,
        });
        id
    }

    pub fn add_image(&self, filename: &str, offset_secs: i64) -> AssetId {
        self.add(filename, MediaKind::Image, offset_secs, None)
    }

    pub fn add_linked_image(&self, filename: &str, offset_secs: i64, video: AssetId) -> AssetId {
        self.add(filename, MediaKind::Image, offset_secs, Some(video))
    }

    pub fn add_video(&self, filename: &str, offset_secs: i64) -> AssetId {
        self.add(filename, MediaKind::Video, offset_secs, None)
    }

    /// Make `link_assets` fail for this photo
    pub fn fail_link(&self, photo: AssetId, error: LinkError) {
        self.state.lock().unwrap().fail_links.insert(photo, error);
    }

    pub fn fail_unlink(&self, photo: AssetId, error: LinkError) {
        self.state.lock().unwrap().fail_unlinks.insert(photo, error);
    }

    /// Accept `link_assets` for this photo without changing anything
    pub fn ignore_link(&self, photo: AssetId) {
        self.state.lock().unwrap().ignore_links.insert(photo);
    }

    /// Make the next `current_pairing` on this photo fail once it is linked
    pub fn fail_read_once_linked(&self, photo: AssetId, error: LinkError) {
        self.state.lock().unwrap().fail_linked_reads.insert(photo, error);
    }

    pub fn set_store_offline(&self, offline: bool) {
        self.state.lock().unwrap().store_offline = offline;
    }

    /// Change a pairing behind the tool's back
    pub fn set_pairing(&self, photo: AssetId, video: Option<AssetId>) {
        let mut state = self.state.lock().unwrap();
        if let Some(asset) = state.assets.iter_mut().find(|a| a.id == photo) {
            asset.live_photo_video_id = video;
        }
    }

    pub fn pairing_of(&self, photo: AssetId) -> Option<AssetId> {
        let state = self.state.lock().unwrap();
        state
            .assets
            .iter()
            .find(|a| a.id == photo)
            .and_then(|a| a.live_photo_video_id)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn read_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Read(_)))
            .count()
    }

    pub fn link_calls(&self) -> Vec<(AssetId, AssetId)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Link(p, v) => Some((p, v)),
                _ => None,
            })
            .collect()
    }

    pub fn unlink_calls(&self) -> Vec<(AssetId, AssetId)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Unlink(p, v) => Some((p, v)),
                _ => None,
            })
            .collect()
    }

    /// Link/unlink calls only; reads do not mutate
    pub fn mutation_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| !matches!(c, Call::Read(_)))
            .count()
    }
}

fn to_asset(stored: &StoredAsset, all: &[StoredAsset]) -> Asset {
    let pairing = match stored.kind {
        MediaKind::Image => stored.live_photo_video_id,
        MediaKind::Video => all
            .iter()
            .find(|a| a.live_photo_video_id == Some(stored.id))
            .map(|a| a.id),
    };
    Asset {
        id: stored.id,
        original_filename: stored.filename.clone(),
        created_at: stored.created_at,
        kind: stored.kind,
        pairing,
    }
}

#[async_trait]
impl AssetStore for FakeLibrary {
    async fn unlinked_live_videos(&self, suffix: &str) -> Result<Vec<Asset>> {
        let state = self.state.lock().unwrap();
        if state.store_offline {
            return Err(Error::Connectivity("asset store offline".to_string()));
        }
        let mut videos: Vec<Asset> = state
            .assets
            .iter()
            .filter(|a| a.kind == MediaKind::Video)
            .filter(|a| strip_live_suffix(&a.filename, suffix).is_some())
            .map(|a| to_asset(a, &state.assets))
            .filter(|a| !a.is_linked())
            .collect();
        // Deliberately unordered: the matcher owns the ordering
        videos.reverse();
        Ok(videos)
    }

    async fn images_with_stem(&self, stem: &str) -> Result<Vec<Asset>> {
        let state = self.state.lock().unwrap();
        if state.store_offline {
            return Err(Error::Connectivity("asset store offline".to_string()));
        }
        Ok(state
            .assets
            .iter()
            .filter(|a| a.kind == MediaKind::Image && filename_stem(&a.filename) == stem)
            .map(|a| to_asset(a, &state.assets))
            .collect())
    }
}

#[async_trait]
impl LinkClient for FakeLibrary {
    async fn link_assets(&self, photo_id: AssetId, video_id: AssetId) -> std::result::Result<(), LinkError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Link(photo_id, video_id));
        if let Some(err) = state.fail_links.get(&photo_id) {
            return Err(err.clone());
        }
        if state.ignore_links.contains(&photo_id) {
            return Ok(());
        }
        match state.assets.iter_mut().find(|a| a.id == photo_id) {
            Some(asset) => {
                asset.live_photo_video_id = Some(video_id);
                Ok(())
            }
            None => Err(LinkError::Api {
                status: 404,
                message: "Not Found: Asset not found".to_string(),
            }),
        }
    }

    async fn unlink_assets(&self, photo_id: AssetId, video_id: AssetId) -> std::result::Result<(), LinkError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Unlink(photo_id, video_id));
        if let Some(err) = state.fail_unlinks.get(&photo_id) {
            return Err(err.clone());
        }
        match state.assets.iter_mut().find(|a| a.id == photo_id) {
            Some(asset) => {
                asset.live_photo_video_id = None;
                Ok(())
            }
            None => Err(LinkError::Api {
                status: 404,
                message: "Not Found: Asset not found".to_string(),
            }),
        }
    }

    async fn current_pairing(&self, photo_id: AssetId) -> std::result::Result<Option<AssetId>, LinkError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Read(photo_id));
        let pairing = state
            .assets
            .iter()
            .find(|a| a.id == photo_id)
            .map(|a| a.live_photo_video_id);
        if matches!(pairing, Some(Some(_))) {
            if let Some(err) = state.fail_linked_reads.remove(&photo_id) {
                return Err(err);
            }
        }
        match pairing {
            Some(pairing) => Ok(pairing),
            None => Err(LinkError::Api {
                status: 404,
                message: "Not Found: Asset not found".to_string(),
            }),
        }
    }
}
