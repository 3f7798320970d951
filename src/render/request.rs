//! Render parameters and their validation.

use crate::error::InputError;

/// Default viewport width in CSS pixels.
pub const DEFAULT_WIDTH: u32 = 1200;

/// Default height; 0 selects a full-page capture.
pub const DEFAULT_HEIGHT: u32 = 0;

/// Default device scale factor.
pub const DEFAULT_DEVICE_SCALE_FACTOR: f64 = 2.0;

/// Initial viewport height used for layout when capturing the full page.
pub const AUTO_HEIGHT_VIEWPORT: u32 = 800;

/// Largest accepted width or height in CSS pixels.
pub const MAX_DIMENSION: u32 = 16384;

/// Largest accepted device scale factor.
pub const MAX_DEVICE_SCALE_FACTOR: f64 = 8.0;

/// A single HTML to PNG render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    /// HTML document to render
    pub html: String,

    /// Viewport width in CSS pixels (>= 1)
    pub width: u32,

    /// Viewport height in CSS pixels, or 0 for full-page capture
    pub height: u32,

    /// Ratio of device pixels to CSS pixels in the output image
    pub device_scale_factor: f64,
}

impl RenderRequest {
    /// Create a request with default dimensions.
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            device_scale_factor: DEFAULT_DEVICE_SCALE_FACTOR,
        }
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }

    pub fn with_height(mut self, height: u32) -> Self {
        self.height = height;
        self
    }

    pub fn with_device_scale_factor(mut self, factor: f64) -> Self {
        self.device_scale_factor = factor;
        self
    }

    /// True when the capture should span the whole rendered page.
    pub fn is_full_page(&self) -> bool {
        self.height == 0
    }

    /// Viewport presented to the browser before the page is laid out.
    pub fn initial_viewport(&self) -> (u32, u32) {
        if self.is_full_page() {
            (self.width, AUTO_HEIGHT_VIEWPORT)
        } else {
            (self.width, self.height)
        }
    }

    /// Check that the parameters can be rendered.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.html.is_empty() {
            return Err(InputError::MissingHtml);
        }

        if self.width == 0 || self.width > MAX_DIMENSION {
            return Err(InputError::InvalidWidth {
                width: self.width,
                max: MAX_DIMENSION,
            });
        }

        if self.height > MAX_DIMENSION {
            return Err(InputError::InvalidHeight {
                height: self.height,
                max: MAX_DIMENSION,
            });
        }

        let factor = self.device_scale_factor;
        if !factor.is_finite() || factor <= 0.0 || factor > MAX_DEVICE_SCALE_FACTOR {
            return Err(InputError::InvalidScaleFactor {
                factor,
                max: MAX_DEVICE_SCALE_FACTOR,
            });
        }

        Ok(())
    }
}
