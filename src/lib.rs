//! # htmlshot
//!
//! An HTTP service that renders HTML documents to PNG images with headless
//! Chrome.
//!
//! ## Features
//!
//! - **Direct rendering**: `POST /screenshot` answers with the PNG bytes
//! - **Temporary URLs**: renders can be published to an in-memory store and
//!   served from `GET /image/{id}` until they expire (24 hours by default)
//! - **External hosting**: with an ImgBB API key, `returnUrl` requests are
//!   uploaded and the host's URL is returned
//! - **Full-page capture**: `height: 0` captures the whole document
//!
//! ## Architecture
//!
//! - [`render`] - Render requests and the headless Chrome renderer
//! - [`store`] - Expiring in-memory image store and its sweeper
//! - [`upload`] - External image host adapters
//! - [`server`] - Axum-based HTTP handlers and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use htmlshot::{create_router, AppState, ChromeConfig, ChromeRenderer, ImageStore, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(ImageStore::default());
//!     let renderer = ChromeRenderer::new(ChromeConfig::default());
//!     let router = create_router(AppState::new(renderer, store), RouterConfig::new());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod config;
pub mod error;
pub mod render;
pub mod server;
pub mod store;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use error::{InputError, RenderError, StoreError, UploadError};
pub use render::{
    png_dimensions, ChromeConfig, ChromeRenderer, RenderRequest, Renderer,
    DEFAULT_DEVICE_SCALE_FACTOR, DEFAULT_HEIGHT, DEFAULT_WIDTH,
};
pub use server::{
    create_router, health_handler, image_handler, index_handler, screenshot_handler,
    screenshot_url_handler, ApiError, AppState, ErrorResponse, HealthResponse, IndexResponse,
    RouterConfig, ScreenshotRequest, UrlResponse, UPLOAD_ERROR_HEADER,
};
pub use store::{
    spawn_sweeper, Clock, ImageId, ImageStore, ManualClock, StoredImage, SystemClock,
    DEFAULT_IMAGE_TTL, DEFAULT_SWEEP_INTERVAL,
};
pub use upload::{ImageUploader, ImgbbUploader};
