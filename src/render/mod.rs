//! HTML rendering.
//!
//! The HTTP layer talks to a [`Renderer`]; the production implementation is
//! [`ChromeRenderer`], which drives headless Chrome. Tests substitute their
//! own implementation.
//!
//! # Sizing
//!
//! - `height == 0`: the page is laid out in a `width × 800` viewport and the
//!   capture covers the full document height.
//! - `height > 0`: the capture is exactly `width × height` CSS pixels.
//!
//! Output pixel dimensions are the CSS dimensions multiplied by the device
//! scale factor.

mod chrome;
mod request;

use std::io::Cursor;

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::png::PngDecoder;
use image::ImageDecoder;

use crate::error::RenderError;

pub use chrome::{
    ChromeConfig, ChromeRenderer, DEFAULT_MAX_CONCURRENT_RENDERS, DEFAULT_RENDER_TIMEOUT,
    DEFAULT_SETTLE_DELAY,
};
pub use request::{
    RenderRequest, AUTO_HEIGHT_VIEWPORT, DEFAULT_DEVICE_SCALE_FACTOR, DEFAULT_HEIGHT,
    DEFAULT_WIDTH, MAX_DEVICE_SCALE_FACTOR, MAX_DIMENSION,
};

/// Turns HTML into PNG bytes.
///
/// Implementations must not retry; a failure is reported to the caller as is.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<Bytes, RenderError>;
}

/// Pixel dimensions of a PNG image, read from its header.
pub fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let decoder = PngDecoder::new(Cursor::new(bytes)).ok()?;
    Some(decoder.dimensions())
}
