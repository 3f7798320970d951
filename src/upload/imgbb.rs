//! ImgBB upload adapter.
//!
//! Posts the base64-encoded image as a form field to the ImgBB v1 API and
//! returns the `data.url` field of the JSON answer.

use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;

use super::ImageUploader;
use crate::error::UploadError;

/// Public ImgBB upload endpoint.
pub const DEFAULT_IMGBB_ENDPOINT: &str = "https://api.imgbb.com/1/upload";

/// Default upload timeout: 30 seconds.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest error body kept in [`UploadError::Status`].
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    data: Option<UploadData>,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    url: String,
}

/// Uploads images to ImgBB (or any API speaking the same protocol).
#[derive(Clone)]
pub struct ImgbbUploader {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl ImgbbUploader {
    /// Create an uploader for the public ImgBB endpoint.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, UploadError> {
        Self::with_endpoint(api_key, DEFAULT_IMGBB_ENDPOINT, timeout)
    }

    /// Create an uploader for a custom endpoint.
    pub fn with_endpoint(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UploadError::Request(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ImageUploader for ImgbbUploader {
    async fn upload(&self, png: Bytes) -> Result<String, UploadError> {
        let encoded = BASE64_STANDARD.encode(&png);
        let form = [
            ("key", self.api_key.as_str()),
            ("image", encoded.as_str()),
            ("name", "screenshot"),
        ];

        let response = self.client.post(&self.endpoint).form(&form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(
                body.char_indices()
                    .nth(MAX_ERROR_BODY)
                    .map_or(body.len(), |(i, _)| i),
            );
            return Err(UploadError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: UploadResponse = response.json().await?;
        match parsed.data {
            Some(data) if parsed.success && !data.url.is_empty() => {
                debug!(url = %data.url, size = png.len(), "Uploaded image");
                Ok(data.url)
            }
            _ => Err(UploadError::InvalidResponse(
                "response does not contain an image URL".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "imgbb"
    }
}
