//! Configuration management for htmlshot.
//!
//! This module provides a flexible configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `HTMLSHOT_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Environment Variables
//!
//! - `HTMLSHOT_HOST` - Server bind address (default: 0.0.0.0)
//! - `HTMLSHOT_PORT` - Server port (default: 3000)
//! - `HTMLSHOT_PUBLIC_URL` - Base URL used in image links (default: derived from request)
//! - `HTMLSHOT_IMAGE_TTL_HOURS` - Lifetime of self-hosted images (default: 24)
//! - `HTMLSHOT_SWEEP_INTERVAL_SECS` - Expired image sweep interval (default: 3600)
//! - `HTMLSHOT_RENDER_TIMEOUT_SECS` - Per-render timeout (default: 30)
//! - `HTMLSHOT_MAX_CONCURRENT_RENDERS` - Browsers running at once (default: 4)
//! - `HTMLSHOT_NETWORK_IDLE_MS` - Network quiet time before capture (default: 500)
//! - `CHROME_PATH` - Chrome/Chromium binary (default: auto-detect)
//! - `HTMLSHOT_IMGBB_API_KEY` - Enables uploads to ImgBB for `returnUrl` requests
//! - `HTMLSHOT_UPLOAD_TIMEOUT_SECS` - Upload timeout (default: 30)
//! - `HTMLSHOT_MAX_BODY_BYTES` - Request body limit (default: 10MB)
//! - `HTMLSHOT_CORS_ORIGINS` - Allowed CORS origins, comma-separated (default: any)

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::render::{ChromeConfig, DEFAULT_MAX_CONCURRENT_RENDERS};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default lifetime of self-hosted images in hours.
pub const DEFAULT_IMAGE_TTL_HOURS: u64 = 24;

/// Default interval between expired image sweeps in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Default render timeout in seconds.
pub const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 30;

/// Default network quiet time before capture, in milliseconds.
pub const DEFAULT_NETWORK_IDLE_MS: u64 = 500;

/// Default upload timeout in seconds.
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 30;

/// Default request body limit (10MB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Longest accepted image TTL (one year).
const MAX_IMAGE_TTL_HOURS: u64 = 24 * 365;

// =============================================================================
// CLI Arguments
// =============================================================================

/// htmlshot - Render HTML to PNG with headless Chrome.
///
/// Serves rendered images directly, as temporary self-hosted URLs, or via an
/// external image host.
#[derive(Parser, Debug, Clone)]
#[command(name = "htmlshot")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "HTMLSHOT_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "HTMLSHOT_PORT")]
    pub port: u16,

    /// Public base URL used when building image links (e.g. https://shots.example.com).
    ///
    /// If not specified, the URL is derived from the Host and
    /// X-Forwarded-Proto headers of each request.
    #[arg(long, env = "HTMLSHOT_PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Maximum request body size in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES, env = "HTMLSHOT_MAX_BODY_BYTES")]
    pub max_body_bytes: usize,

    // =========================================================================
    // Image Store Configuration
    // =========================================================================
    /// How long self-hosted images stay retrievable, in hours.
    #[arg(long, default_value_t = DEFAULT_IMAGE_TTL_HOURS, env = "HTMLSHOT_IMAGE_TTL_HOURS")]
    pub image_ttl_hours: u64,

    /// Interval between sweeps of expired images, in seconds.
    #[arg(long, default_value_t = DEFAULT_SWEEP_INTERVAL_SECS, env = "HTMLSHOT_SWEEP_INTERVAL_SECS")]
    pub sweep_interval_secs: u64,

    // =========================================================================
    // Renderer Configuration
    // =========================================================================
    /// Maximum time a single render may take, in seconds.
    #[arg(long, default_value_t = DEFAULT_RENDER_TIMEOUT_SECS, env = "HTMLSHOT_RENDER_TIMEOUT_SECS")]
    pub render_timeout_secs: u64,

    /// Maximum number of browsers rendering at the same time.
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT_RENDERS, env = "HTMLSHOT_MAX_CONCURRENT_RENDERS")]
    pub max_concurrent_renders: usize,

    /// How long the page's network must stay idle before capture, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_NETWORK_IDLE_MS, env = "HTMLSHOT_NETWORK_IDLE_MS")]
    pub network_idle_ms: u64,

    /// Path to the Chrome/Chromium executable.
    #[arg(long, env = "CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    // =========================================================================
    // Upload Configuration
    // =========================================================================
    /// ImgBB API key. When set, `returnUrl` requests are uploaded to ImgBB.
    #[arg(long, env = "HTMLSHOT_IMGBB_API_KEY", hide_env_values = true)]
    pub imgbb_api_key: Option<String>,

    /// Upload timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_UPLOAD_TIMEOUT_SECS, env = "HTMLSHOT_UPLOAD_TIMEOUT_SECS")]
    pub upload_timeout_secs: u64,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "HTMLSHOT_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref public_url) = self.public_url {
            let url = Url::parse(public_url)
                .map_err(|e| format!("public_url '{}' is not a valid URL: {}", public_url, e))?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(format!(
                    "public_url must use http or https, got '{}'",
                    url.scheme()
                ));
            }
        }

        if self.image_ttl_hours == 0 || self.image_ttl_hours > MAX_IMAGE_TTL_HOURS {
            return Err(format!(
                "image_ttl_hours must be between 1 and {}",
                MAX_IMAGE_TTL_HOURS
            ));
        }

        if self.sweep_interval_secs == 0 {
            return Err("sweep_interval_secs must be greater than 0".to_string());
        }

        if self.render_timeout_secs == 0 {
            return Err("render_timeout_secs must be greater than 0".to_string());
        }

        if self.max_concurrent_renders == 0 {
            return Err("max_concurrent_renders must be greater than 0".to_string());
        }

        if self.network_idle_ms >= self.render_timeout_secs.saturating_mul(1000) {
            return Err("network_idle_ms must be shorter than the render timeout".to_string());
        }

        if self.upload_timeout_secs == 0 {
            return Err("upload_timeout_secs must be greater than 0".to_string());
        }

        if matches!(self.imgbb_api_key.as_deref(), Some(key) if key.trim().is_empty()) {
            return Err("imgbb_api_key must not be empty when set".to_string());
        }

        if self.max_body_bytes < 1024 {
            return Err("max_body_bytes must be at least 1KB".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Lifetime of self-hosted images.
    pub fn image_ttl(&self) -> Duration {
        Duration::from_secs(self.image_ttl_hours * 3600)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    /// Renderer settings derived from this configuration.
    pub fn chrome_config(&self) -> ChromeConfig {
        ChromeConfig::default()
            .with_chrome_path(self.chrome_path.clone())
            .with_timeout(Duration::from_secs(self.render_timeout_secs))
            .with_max_concurrent(self.max_concurrent_renders)
            .with_settle_delay(Duration::from_millis(self.network_idle_ms))
    }
}

// =============================================================================
// Tests
// =============================================================================
