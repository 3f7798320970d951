//! Router configuration for htmlshot.
//!
//! This module defines the HTTP routes and applies middleware for CORS,
//! body size limits and request tracing.
//!
//! # Route Structure
//!
//! ```text
//! /                  - Service status and store statistics
//! /health            - Health check
//! /screenshot        - Render HTML to PNG bytes (or URL with returnUrl)
//! /screenshot-url    - Render HTML to a temporary self-hosted URL
//! /image/{id}        - Stored image
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use htmlshot::render::{ChromeConfig, ChromeRenderer};
//! use htmlshot::server::{create_router, AppState, RouterConfig};
//! use htmlshot::store::ImageStore;
//!
//! let store = Arc::new(ImageStore::default());
//! let state = AppState::new(ChromeRenderer::new(ChromeConfig::default()), store);
//! let router = create_router(state, RouterConfig::new());
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use http::header::CONTENT_TYPE;
use http::{HeaderName, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    health_handler, image_handler, index_handler, method_not_allowed_handler, not_found_handler,
    screenshot_handler, screenshot_url_handler, AppState, UPLOAD_ERROR_HEADER,
};
use crate::config::DEFAULT_MAX_BODY_BYTES;
use crate::render::Renderer;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Clone, Debug)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,

    /// Base URL for image links (None = derive from request headers)
    pub public_url: Option<String>,

    /// Maximum accepted request body size in bytes
    pub max_body_bytes: usize,
}

impl RouterConfig {
    /// Create a new router configuration.
    ///
    /// By default:
    /// - CORS allows any origin
    /// - Tracing is enabled
    /// - Image URLs are derived from request headers
    /// - Request bodies are limited to 10MB
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            enable_tracing: true,
            public_url: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    /// Pass None (or don't call this method) to allow any origin.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    /// Use a fixed base URL for image links.
    pub fn with_public_url(mut self, public_url: impl Into<String>) -> Self {
        self.public_url = Some(public_url.into());
        self
    }

    /// Set the maximum request body size in bytes.
    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// This function builds the complete Axum router with:
/// - Render, image and status routes
/// - JSON 404/405 fallbacks
/// - Body size limit
/// - CORS configuration
/// - Request tracing (optional)
pub fn create_router<R>(app_state: AppState<R>, config: RouterConfig) -> Router
where
    R: Renderer + 'static,
{
    let app_state = match config.public_url {
        Some(ref url) => app_state.with_public_url(Some(url.clone())),
        None => app_state,
    };

    let cors = build_cors_layer(&config);

    let router = Router::new()
        .route("/", get(index_handler::<R>))
        .route("/health", get(health_handler))
        .route("/screenshot", post(screenshot_handler::<R>))
        .route("/screenshot-url", post(screenshot_url_handler::<R>))
        .route("/image/{id}", get(image_handler::<R>))
        .fallback(not_found_handler)
        .method_not_allowed_fallback(method_not_allowed_handler)
        .with_state(app_state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .expose_headers([
            HeaderName::from_static(UPLOAD_ERROR_HEADER),
            HeaderName::from_static("x-image-width"),
            HeaderName::from_static("x-image-height"),
        ])
        .max_age(Duration::from_secs(86400)); // 24 hours

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => {
            // No origins allowed - this effectively disables CORS
            cors
        }
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
