//! HTTP server layer for htmlshot.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │     POST /screenshot   POST /screenshot-url   GET /image/{id}   │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │        handlers          │  │           routes            │  │
//! │  │ (render, publish, serve) │  │ (router config, middleware) │  │
//! │  └──────────────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//!          │                  │                      │
//!          ▼                  ▼                      ▼
//!      Renderer           ImageStore           ImageUploader
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    health_handler, image_handler, index_handler, screenshot_handler, screenshot_url_handler,
    ApiError, AppState, ErrorResponse, HealthResponse, IndexResponse, ScreenshotRequest,
    UrlResponse, UPLOAD_ERROR_HEADER,
};
pub use routes::{create_router, RouterConfig};
