//! Asset Store Gateway
//!
//! Read-only query interface over the asset metadata store. The matcher only
//! needs two questions answered, so the trait stays that small.

pub mod postgres;

pub use postgres::PgAssetStore;

use crate::models::Asset;
use async_trait::async_trait;
use livelink_common::Result;

/// Read-only asset metadata queries
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Video assets whose filename ends with `suffix` (ASCII case-insensitive)
    /// and that no image currently references.
    async fn unlinked_live_videos(&self, suffix: &str) -> Result<Vec<Asset>>;

    /// Image assets whose filename stem equals `stem` exactly, linked or not.
    async fn images_with_stem(&self, stem: &str) -> Result<Vec<Asset>>;
}
