//! Publishing rendered images to a third-party image host.
//!
//! Uploads are a single attempt with a bounded timeout. The caller decides
//! what to do when the host is unavailable.

mod imgbb;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::UploadError;

pub use imgbb::{ImgbbUploader, DEFAULT_IMGBB_ENDPOINT, DEFAULT_UPLOAD_TIMEOUT};

/// Pushes image bytes to an external host and returns the public URL.
#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload(&self, png: Bytes) -> Result<String, UploadError>;

    /// Short name of the host, used in logs and responses.
    fn name(&self) -> &str;
}
