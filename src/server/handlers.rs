//! HTTP request handlers for the htmlshot API.
//!
//! # Endpoints
//!
//! - `GET /` - Service status and store statistics
//! - `GET /health` - Health check endpoint
//! - `POST /screenshot` - Render HTML, return PNG bytes or a URL
//! - `POST /screenshot-url` - Render HTML, return a temporary self-hosted URL
//! - `GET /image/{id}` - Serve a stored image

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::error::{InputError, RenderError, StoreError};
use crate::render::{
    png_dimensions, RenderRequest, Renderer, DEFAULT_DEVICE_SCALE_FACTOR, DEFAULT_HEIGHT,
    DEFAULT_WIDTH,
};
use crate::store::{ImageId, ImageStore};
use crate::upload::ImageUploader;

/// Output format reported in URL responses.
const IMAGE_FORMAT: &str = "png";

/// Header carrying the reason an upload failed when raw bytes are returned instead.
pub const UPLOAD_ERROR_HEADER: &str = "x-upload-error";

/// Routes advertised by the index endpoint.
const ADVERTISED_ROUTES: &[&str] = &[
    "/screenshot",
    "/screenshot-url",
    "/image/{id}",
    "/health",
];

// =============================================================================
// Application State
// =============================================================================

/// Shared application state.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<R: Renderer> {
    /// Renderer producing PNG bytes from HTML
    pub renderer: Arc<R>,

    /// Store for self-hosted images
    pub store: Arc<ImageStore>,

    /// External image host used by `returnUrl` requests, if configured
    pub uploader: Option<Arc<dyn ImageUploader>>,

    /// Base URL for image links (None = derive from request headers)
    pub public_url: Option<String>,
}

impl<R: Renderer> AppState<R> {
    /// Create a new application state.
    pub fn new(renderer: R, store: Arc<ImageStore>) -> Self {
        Self {
            renderer: Arc::new(renderer),
            store,
            uploader: None,
            public_url: None,
        }
    }

    /// Upload `returnUrl` renders to an external host instead of the local store.
    pub fn with_uploader(mut self, uploader: Arc<dyn ImageUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Use a fixed base URL for image links.
    pub fn with_public_url(mut self, public_url: Option<String>) -> Self {
        self.public_url = public_url.map(|url| url.trim_end_matches('/').to_string());
        self
    }
}

impl<R: Renderer> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            renderer: Arc::clone(&self.renderer),
            store: Arc::clone(&self.store),
            uploader: self.uploader.clone(),
            public_url: self.public_url.clone(),
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// JSON body of the screenshot endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotRequest {
    /// HTML document to render (required, non-empty)
    #[serde(default)]
    pub html: Option<String>,

    /// Viewport width in CSS pixels (default: 1200)
    #[serde(default = "default_width")]
    pub width: u32,

    /// Viewport height in CSS pixels, 0 = full page (default: 0)
    #[serde(default = "default_height")]
    pub height: u32,

    /// Device scale factor (default: 2)
    #[serde(default = "default_device_scale_factor")]
    pub device_scale_factor: f64,

    /// Return a URL instead of the image bytes (only for `/screenshot`)
    #[serde(default)]
    pub return_url: bool,
}

fn default_width() -> u32 {
    DEFAULT_WIDTH
}

fn default_height() -> u32 {
    DEFAULT_HEIGHT
}

fn default_device_scale_factor() -> f64 {
    DEFAULT_DEVICE_SCALE_FACTOR
}

impl ScreenshotRequest {
    /// Build a validated render request.
    pub fn to_render_request(&self) -> Result<RenderRequest, InputError> {
        let html = match self.html.as_deref() {
            Some(html) if !html.is_empty() => html,
            _ => return Err(InputError::MissingHtml),
        };

        let request = RenderRequest::new(html)
            .with_width(self.width)
            .with_height(self.height)
            .with_device_scale_factor(self.device_scale_factor);
        request.validate()?;
        Ok(request)
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Index response with service status.
#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub status: String,
    pub message: String,
    pub routes: Vec<String>,

    /// Images currently held by the store
    pub images_stored: usize,

    /// Total size of the stored images in bytes
    pub bytes_stored: usize,

    /// Expired images removed while answering this request
    pub expired_cleaned: usize,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

/// Response of URL-producing requests.
#[derive(Debug, Serialize)]
pub struct UrlResponse {
    pub success: bool,
    pub url: String,
    pub format: String,
    pub message: String,

    /// Lifetime of self-hosted images; absent for externally hosted ones
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_hours: Option<u64>,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Errors surfaced at the HTTP boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Not found")]
    NotFound,

    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error("Request body too large")]
    PayloadTooLarge,
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::PayloadTooLarge;
        }
        ApiError::Input(InputError::MalformedBody(rejection.body_text()))
    }
}

impl ApiError {
    /// HTTP status code for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Input(_) => StatusCode::BAD_REQUEST,
            ApiError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Store(StoreError::NotFound) | ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::Expired) => StatusCode::GONE,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

/// Convert ApiError to HTTP response.
///
/// This implementation logs errors appropriately based on their severity:
/// - 5xx errors are logged at ERROR level (server errors)
/// - Store misses and unknown routes are logged at DEBUG level (expected)
/// - Other 4xx errors are logged at WARN level (client errors)
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            error!(status = status.as_u16(), "Server error: {}", message);
        } else if matches!(self, ApiError::Store(_) | ApiError::NotFound) {
            debug!(status = status.as_u16(), "Lookup miss: {}", message);
        } else {
            warn!(status = status.as_u16(), "Client error: {}", message);
        }

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Index handler.
///
/// Sweeps expired images and reports the store size.
pub async fn index_handler<R: Renderer>(State(state): State<AppState<R>>) -> Json<IndexResponse> {
    let expired_cleaned = state.store.sweep().await;
    let images_stored = state.store.len().await;
    let bytes_stored = state.store.total_bytes().await;

    Json(IndexResponse {
        status: "ok".to_string(),
        message: "HTML to Image Service is running".to_string(),
        routes: ADVERTISED_ROUTES.iter().map(|r| r.to_string()).collect(),
        images_stored,
        bytes_stored,
        expired_cleaned,
    })
}

/// Health check handler.
///
/// Returns a simple JSON response indicating the service is running.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Render HTML and return either the PNG or a URL.
///
/// With `returnUrl: true` the image is uploaded to the configured external
/// host. If the upload fails, the PNG is returned anyway with the reason in
/// the `X-Upload-Error` header. Without an external host the image is
/// published through the local store.
pub async fn screenshot_handler<R: Renderer>(
    State(state): State<AppState<R>>,
    headers: HeaderMap,
    payload: Result<Json<ScreenshotRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload?;
    let request = body.to_render_request()?;
    let png = render_png(&state, &request).await?;

    if !body.return_url {
        return Ok(png_response(png));
    }

    let Some(uploader) = state.uploader.as_ref() else {
        return Ok(publish(&state, &headers, png).await.into_response());
    };

    match uploader.upload(png.clone()).await {
        Ok(url) => {
            info!(host = uploader.name(), %url, "Image uploaded");
            Ok(Json(UrlResponse {
                success: true,
                url,
                format: IMAGE_FORMAT.to_string(),
                message: format!("Image uploaded to {}", uploader.name()),
                expires_in_hours: None,
            })
            .into_response())
        }
        Err(e) => {
            warn!(host = uploader.name(), "Upload failed, returning image bytes: {}", e);
            let mut response = png_response(png);
            let reason = HeaderValue::from_str(&format!("Upload failed: {}", e))
                .unwrap_or_else(|_| HeaderValue::from_static("Upload failed"));
            response.headers_mut().insert(UPLOAD_ERROR_HEADER, reason);
            Ok(response)
        }
    }
}

/// Render HTML and publish it as a temporary self-hosted URL.
pub async fn screenshot_url_handler<R: Renderer>(
    State(state): State<AppState<R>>,
    headers: HeaderMap,
    payload: Result<Json<ScreenshotRequest>, JsonRejection>,
) -> Result<Json<UrlResponse>, ApiError> {
    let Json(body) = payload?;
    let request = body.to_render_request()?;
    let png = render_png(&state, &request).await?;

    Ok(publish(&state, &headers, png).await)
}

/// Serve a stored image.
///
/// Unknown or malformed ids are 404, expired ids are 410.
pub async fn image_handler<R: Renderer>(
    State(state): State<AppState<R>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id: ImageId = id.parse().map_err(|_| StoreError::NotFound)?;
    let image = state.store.get(&id).await?;

    let max_age = image.remaining_at(state.store.now()).as_secs();
    let mut response = png_response(image.bytes().clone());
    if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={}, immutable", max_age)) {
        response.headers_mut().insert(header::CACHE_CONTROL, value);
    }

    Ok(response)
}

/// Fallback for unknown paths.
pub async fn not_found_handler() -> ApiError {
    ApiError::NotFound
}

/// Fallback for known paths requested with an unsupported method.
pub async fn method_not_allowed_handler() -> ApiError {
    ApiError::MethodNotAllowed
}

// =============================================================================
// Helpers
// =============================================================================

async fn render_png<R: Renderer>(
    state: &AppState<R>,
    request: &RenderRequest,
) -> Result<Bytes, ApiError> {
    let started = Instant::now();
    let png = state.renderer.render(request).await?;

    debug!(
        width = request.width,
        height = request.height,
        size = png.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Rendered HTML"
    );

    Ok(png)
}

/// Put the image into the store and describe its URL.
async fn publish<R: Renderer>(
    state: &AppState<R>,
    headers: &HeaderMap,
    png: Bytes,
) -> Json<UrlResponse> {
    let id = state.store.put(png).await;
    let url = format!("{}/image/{}", base_url(state, headers), id);
    let hours = state.store.ttl_hours();

    info!(%id, %url, "Image published");

    Json(UrlResponse {
        success: true,
        url,
        format: IMAGE_FORMAT.to_string(),
        message: format!("Image stored, available for {} hours", hours),
        expires_in_hours: Some(hours),
    })
}

/// Base URL for links: the configured public URL, or one derived from the
/// request's Host and X-Forwarded-Proto headers.
fn base_url<R: Renderer>(state: &AppState<R>, headers: &HeaderMap) -> String {
    if let Some(ref public_url) = state.public_url {
        return public_url.clone();
    }

    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost:3000");

    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("http");

    format!("{}://{}", proto, host)
}

/// Build a `200 image/png` response.
fn png_response(png: Bytes) -> Response {
    let dimensions = png_dimensions(&png);
    let mut response = (StatusCode::OK, Body::from(png)).into_response();

    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("inline; filename=screenshot.png"),
    );
    if let Some((width, height)) = dimensions {
        headers.insert("x-image-width", HeaderValue::from(width));
        headers.insert("x-image-height", HeaderValue::from(height));
    }

    response
}

// =============================================================================
// Tests
// =============================================================================
