//! PostgreSQL asset store
//!
//! Queries the photo server's asset table directly. Column names follow the
//! server schema (`"originalFileName"`, `"fileCreatedAt"`, `"livePhotoVideoId"`),
//! which is why every identifier is double-quoted.

use super::AssetStore;
use crate::models::{Asset, MediaKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use livelink_common::config::DatabaseConfig;
use livelink_common::{Error, Result};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Asset store backed by a single PostgreSQL pool opened once per run
pub struct PgAssetStore {
    pool: PgPool,
    asset_table: String,
    owner_id: Option<Uuid>,
}

impl PgAssetStore {
    /// Open the pool and resolve the optional owner filter
    ///
    /// An unreachable server is a `Connectivity` error; an unknown owner name
    /// is a `Validation` error.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(config.connect_options())
            .await
            .map_err(|e| {
                Error::Connectivity(format!(
                    "Asset database {}:{}/{} unreachable: {}",
                    config.host, config.port, config.dbname, e
                ))
            })?;
        info!(host = %config.host, dbname = %config.dbname, "Asset database connected");

        let owner_id = match config.owner_name.as_deref() {
            Some(name) => {
                let sql = format!("SELECT id FROM \"{}\" WHERE name = $1", config.user_table);
                let row = sqlx::query(&sql)
                    .bind(name)
                    .fetch_optional(&pool)
                    .await
                    .map_err(connectivity)?;
                match row {
                    Some(row) => {
                        let id: Uuid = row.try_get("id").map_err(connectivity)?;
                        debug!(owner = %name, owner_id = %id, "Owner filter resolved");
                        Some(id)
                    }
                    None => {
                        pool.close().await;
                        return Err(Error::Validation(format!(
                            "No user named '{}' in the asset database",
                            name
                        )));
                    }
                }
            }
            None => None,
        };

        Ok(Self {
            pool,
            asset_table: config.asset_table.clone(),
            owner_id,
        })
    }

    /// Release the pool; call on every exit path
    pub async fn close(&self) {
        self.pool.close().await;
        debug!("Asset database connection closed");
    }
}

#[async_trait]
impl AssetStore for PgAssetStore {
    async fn unlinked_live_videos(&self, suffix: &str) -> Result<Vec<Asset>> {
        let sql = format!(
            r#"
            SELECT v.id, v."originalFileName", v."fileCreatedAt", v.type, p.id AS pairing
            FROM "{table}" v
            LEFT JOIN "{table}" p
                ON p."livePhotoVideoId" = v.id AND p."deletedAt" IS NULL
            WHERE v.type = 'VIDEO'
              AND v."deletedAt" IS NULL
              AND char_length(v."originalFileName") > char_length($1)
              AND lower(right(v."originalFileName", char_length($1))) = lower($1)
              AND p.id IS NULL
              AND ($2::uuid IS NULL OR v."ownerId" = $2)
            ORDER BY v."fileCreatedAt", v.id
            "#,
            table = self.asset_table
        );

        let rows = sqlx::query(&sql)
            .bind(suffix)
            .bind(self.owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(connectivity)?;

        let assets = rows.iter().map(asset_from_row).collect::<Result<Vec<_>>>()?;
        debug!(count = assets.len(), suffix = %suffix, "Unlinked live videos loaded");
        Ok(assets)
    }

    async fn images_with_stem(&self, stem: &str) -> Result<Vec<Asset>> {
        let sql = format!(
            r#"
            SELECT id, "originalFileName", "fileCreatedAt", type, "livePhotoVideoId" AS pairing
            FROM "{table}"
            WHERE type = 'IMAGE'
              AND "deletedAt" IS NULL
              AND regexp_replace("originalFileName", '\.[^.]*$', '') = $1
              AND ($2::uuid IS NULL OR "ownerId" = $2)
            ORDER BY "fileCreatedAt", id
            "#,
            table = self.asset_table
        );

        let rows = sqlx::query(&sql)
            .bind(stem)
            .bind(self.owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(connectivity)?;

        rows.iter().map(asset_from_row).collect()
    }
}

fn asset_from_row(row: &PgRow) -> Result<Asset> {
    let kind: String = row.try_get("type")?;
    let kind = MediaKind::from_db_str(&kind)
        .ok_or_else(|| Error::Validation(format!("Unknown asset type '{}'", kind)))?;
    let created_at: DateTime<Utc> = row.try_get("fileCreatedAt")?;

    Ok(Asset {
        id: row.try_get("id")?,
        original_filename: row.try_get("originalFileName")?,
        created_at,
        kind,
        pairing: row.try_get("pairing")?,
    })
}

/// Any store failure during identification aborts the run
fn connectivity(e: sqlx::Error) -> Error {
    Error::Connectivity(format!("Asset database query failed: {}", e))
}
