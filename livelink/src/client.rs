//! Remote Link Client
//!
//! Creates and removes the live-pairing relationship through the photo
//! server's REST API. The relationship lives on the image asset
//! (`livePhotoVideoId`), so both operations are a `PUT` on the photo.
//!
//! # API Reference
//! - `PUT /api/assets/{id}` with `{"livePhotoVideoId": <uuid|null>}`
//! - `GET /api/assets/{id}` for the current pairing
//! - `GET /api/server/ping` (unauthenticated) and `GET /api/users/me`

use crate::models::AssetId;
use async_trait::async_trait;
use livelink_common::config::ApiConfig;
use livelink_common::{Error, Result};
use reqwest::{header, Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const API_KEY_HEADER: &str = "x-api-key";

/// Per-pair failure reported by the remote API
///
/// None of these abort a batch; executors record them in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// Asset state no longer matches what the caller expected
    #[error("conflict: {0}")]
    Conflict(String),

    /// Server answered with an error status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Request never completed
    #[error("network failure: {0}")]
    Network(String),
}

impl From<LinkError> for Error {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::Conflict(msg) => Error::LinkConflict(msg),
            LinkError::Network(msg) => Error::Connectivity(msg),
            LinkError::Api { status, message } => match status {
                401 | 403 => Error::Validation(format!("API rejected credentials: {}", message)),
                _ => Error::Connectivity(format!("API error {}: {}", status, message)),
            },
        }
    }
}

/// Operations the executors drive, one pair at a time
#[async_trait]
pub trait LinkClient: Send + Sync {
    /// Set `video_id` as the live component of `photo_id`
    async fn link_assets(&self, photo_id: AssetId, video_id: AssetId) -> std::result::Result<(), LinkError>;

    /// Clear the live component of `photo_id`
    async fn unlink_assets(&self, photo_id: AssetId, video_id: AssetId) -> std::result::Result<(), LinkError>;

    /// Read the video currently linked to `photo_id`
    async fn current_pairing(&self, photo_id: AssetId) -> std::result::Result<Option<AssetId>, LinkError>;
}

/// HTTP client for an Immich-compatible photo server
pub struct ImmichClient {
    http_client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetResponse {
    #[serde(default)]
    live_photo_video_id: Option<AssetId>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<serde_json::Value>,
}

impl ImmichClient {
    /// Build a client from validated configuration
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let api_key = config.api_key()?;

        let mut headers = header::HeaderMap::new();
        let mut key_value = header::HeaderValue::from_str(api_key)
            .map_err(|_| Error::Validation("API key contains invalid header characters".to_string()))?;
        key_value.set_sensitive(true);
        headers.insert(API_KEY_HEADER, key_value);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Validation(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url().to_string(),
        })
    }

    fn asset_url(&self, id: AssetId) -> String {
        format!("{}/api/assets/{}", self.base_url, id)
    }

    /// Server reachability check
    pub async fn ping(&self) -> Result<()> {
        let url = format!("{}/api/server/ping", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Connectivity(format!("Server connection failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Connectivity(format!(
                "Server ping returned {}",
                response.status()
            )));
        }
        debug!(url = %url, "Server ping succeeded");
        Ok(())
    }

    /// API key check against the current-user endpoint
    pub async fn validate_credentials(&self) -> Result<()> {
        let url = format!("{}/api/users/me", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Connectivity(format!("Server connection failed: {}", e)))?;

        match response.status() {
            status if status.is_success() => {
                debug!("API key accepted");
                Ok(())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let message = error_message(response).await;
                Err(Error::Validation(format!("API key validation failure: {}", message)))
            }
            status => Err(Error::Connectivity(format!(
                "API key check returned {}",
                status
            ))),
        }
    }

    async fn put_pairing(
        &self,
        photo_id: AssetId,
        video_id: Option<AssetId>,
    ) -> std::result::Result<(), LinkError> {
        let response = self
            .http_client
            .put(self.asset_url(photo_id))
            .json(&json!({ "livePhotoVideoId": video_id }))
            .send()
            .await
            .map_err(|e| LinkError::Network(e.to_string()))?;

        check_status(response).await.map(|_| ())
    }
}

#[async_trait]
impl LinkClient for ImmichClient {
    async fn link_assets(&self, photo_id: AssetId, video_id: AssetId) -> std::result::Result<(), LinkError> {
        debug!(photo_id = %photo_id, video_id = %video_id, "Linking assets");
        self.put_pairing(photo_id, Some(video_id)).await
    }

    async fn unlink_assets(&self, photo_id: AssetId, video_id: AssetId) -> std::result::Result<(), LinkError> {
        debug!(photo_id = %photo_id, video_id = %video_id, "Unlinking assets");
        self.put_pairing(photo_id, None).await
    }

    async fn current_pairing(&self, photo_id: AssetId) -> std::result::Result<Option<AssetId>, LinkError> {
        let response = self
            .http_client
            .get(self.asset_url(photo_id))
            .send()
            .await
            .map_err(|e| LinkError::Network(e.to_string()))?;

        let asset: AssetResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| LinkError::Api {
                status: 200,
                message: format!("Failed to parse asset response: {}", e),
            })?;
        Ok(asset.live_photo_video_id)
    }
}

/// Map a non-success status to a `LinkError`
async fn check_status(response: Response) -> std::result::Result<Response, LinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = error_message(response).await;
    match status {
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT => Err(LinkError::Conflict(message)),
        _ => Err(LinkError::Api {
            status: status.as_u16(),
            message,
        }),
    }
}

/// `"<error>: <message>"` from the server's JSON error body
async fn error_message(response: Response) -> String {
    let body: ErrorBody = response.json().await.unwrap_or_default();
    let error = body.error.unwrap_or_else(|| "Unknown error".to_string());
    let message = match body.message {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .collect::<Vec<_>>()
            .join("; "),
        Some(other) => other.to_string(),
        None => "No message provided".to_string(),
    };
    format!("{}: {}", error, message)
}
