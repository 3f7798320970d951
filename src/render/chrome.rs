//! Headless Chrome renderer.
//!
//! Each render launches its own browser process, loads the HTML into a fresh
//! tab, waits for the page to settle and captures a PNG. The browser is torn
//! down when the render returns, on success and on failure.
//!
//! The page counts as settled once the load event has fired, fonts and
//! images are done, and no network request has been in flight for the quiet
//! window (`settle_delay`). Requests started by scripts after load, such as a
//! `fetch` that injects content, are tracked through CDP network events.
//!
//! The `headless_chrome` API is blocking, so the work runs on tokio's blocking
//! thread pool. A semaphore caps the number of browsers alive at once and the
//! whole render, including waiting for a slot, is bounded by a timeout. The
//! blocking capture checks the same deadline between steps.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use bytes::Bytes;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::{Network, Page};
use headless_chrome::types::Bounds;
use headless_chrome::{Browser, LaunchOptions, Tab};
use image::ImageFormat;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::request::{RenderRequest, MAX_DIMENSION};
use super::Renderer;
use crate::error::RenderError;

/// Default render timeout: 30 seconds.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of browsers allowed to run at the same time.
pub const DEFAULT_MAX_CONCURRENT_RENDERS: usize = 4;

/// How long the network must stay idle before the page is captured.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Poll interval while waiting for the network to go quiet.
const NETWORK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Flags passed to Chrome, suitable for containers.
const CHROME_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
];

/// Chrome refuses navigations to URLs longer than 2MB; larger documents are
/// written into a blank page instead.
const MAX_DATA_URL_LEN: usize = 2 * 1024 * 1024 - 1024;

/// Resolves once the document, its fonts and its images have loaded.
const WAIT_FOR_SETTLED_JS: &str = r#"(async () => {
    if (document.readyState !== 'complete') {
        await new Promise((resolve) => window.addEventListener('load', resolve, { once: true }));
    }
    if (document.fonts && document.fonts.ready) {
        await document.fonts.ready;
    }
    await Promise.all(Array.from(document.images)
        .filter((img) => !img.complete)
        .map((img) => new Promise((resolve) => {
            img.addEventListener('load', resolve, { once: true });
            img.addEventListener('error', resolve, { once: true });
        })));
    return true;
})()"#;

const PAGE_HEIGHT_JS: &str = "Math.ceil(Math.max(\
    document.documentElement ? document.documentElement.scrollHeight : 0, \
    document.body ? document.body.scrollHeight : 0))";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for [`ChromeRenderer`].
#[derive(Debug, Clone)]
pub struct ChromeConfig {
    /// Path to the Chrome/Chromium binary (None = auto-detect)
    pub chrome_path: Option<PathBuf>,

    /// Upper bound on a single render, including waiting for a browser slot
    pub timeout: Duration,

    /// Maximum number of browsers running concurrently
    pub max_concurrent: usize,

    /// Time without in-flight requests required before capturing
    pub settle_delay: Duration,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            timeout: DEFAULT_RENDER_TIMEOUT,
            max_concurrent: DEFAULT_MAX_CONCURRENT_RENDERS,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

impl ChromeConfig {
    pub fn with_chrome_path(mut self, path: Option<PathBuf>) -> Self {
        self.chrome_path = path;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }
}

// =============================================================================
// Renderer
// =============================================================================

/// Renders HTML with a freshly launched headless Chrome per request.
pub struct ChromeRenderer {
    config: ChromeConfig,
    slots: Arc<Semaphore>,
}

impl ChromeRenderer {
    pub fn new(config: ChromeConfig) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self { config, slots }
    }

    pub fn config(&self) -> &ChromeConfig {
        &self.config
    }

    /// Number of browser slots currently free.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}

impl Default for ChromeRenderer {
    fn default() -> Self {
        Self::new(ChromeConfig::default())
    }
}

#[async_trait]
impl Renderer for ChromeRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<Bytes, RenderError> {
        let timeout = self.config.timeout;
        let deadline = Deadline::after(timeout);
        let config = self.config.clone();
        let request = request.clone();
        let slots = Arc::clone(&self.slots);

        let render = async move {
            let slot = slots
                .acquire_owned()
                .await
                .map_err(|e| RenderError::TaskFailed(e.to_string()))?;

            // The slot moves into the blocking task so it is only released
            // once the browser is actually gone, even after a timeout.
            tokio::task::spawn_blocking(move || {
                let _slot = slot;
                capture(&config, &request, deadline)
            })
            .await
            .map_err(|e| RenderError::TaskFailed(e.to_string()))?
        };

        match tokio::time::timeout(timeout, render).await {
            Ok(result) => result,
            Err(_) => Err(RenderError::Timeout {
                seconds: timeout.as_secs(),
            }),
        }
    }
}

// =============================================================================
// Deadline
// =============================================================================

/// Point in time by which a render must be finished.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    /// Time left, or a timeout error once the deadline has passed.
    fn remaining(&self) -> Result<Duration, RenderError> {
        let left = self.at.saturating_duration_since(Instant::now());
        if left.is_zero() {
            Err(RenderError::Timeout {
                seconds: self.budget.as_secs(),
            })
        } else {
            Ok(left)
        }
    }
}

// =============================================================================
// Network Activity
// =============================================================================

struct NetworkState {
    pending: HashSet<String>,
    last_change: Instant,
}

/// Requests a page has started and not yet finished or failed.
///
/// Fed from CDP events on the browser's event thread and polled by the
/// capture thread.
struct NetworkTracker {
    state: Mutex<NetworkState>,
}

impl NetworkTracker {
    fn new() -> Self {
        Self {
            state: Mutex::new(NetworkState {
                pending: HashSet::new(),
                last_change: Instant::now(),
            }),
        }
    }

    fn started(&self, request_id: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        // Redirects reuse the request id
        state.pending.insert(request_id.to_string());
        state.last_change = Instant::now();
    }

    fn finished(&self, request_id: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.pending.remove(request_id) {
            state.last_change = Instant::now();
        }
    }

    fn in_flight(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .len()
    }

    /// How long the network has been idle at `now`; `None` while requests are pending.
    fn idle_for(&self, now: Instant) -> Option<Duration> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.pending.is_empty() {
            Some(now.saturating_duration_since(state.last_change))
        } else {
            None
        }
    }

    fn on_event(&self, event: &Event) {
        match event {
            Event::NetworkRequestWillBeSent(ev) => self.started(&ev.params.request_id),
            Event::NetworkLoadingFinished(ev) => self.finished(&ev.params.request_id),
            Event::NetworkLoadingFailed(ev) => self.finished(&ev.params.request_id),
            _ => {}
        }
    }
}

/// Block until no request has been in flight for `quiet`.
fn wait_for_network_idle(
    tracker: &NetworkTracker,
    quiet: Duration,
    deadline: Deadline,
) -> Result<(), RenderError> {
    loop {
        match tracker.idle_for(Instant::now()) {
            Some(idle) if idle >= quiet => return Ok(()),
            Some(idle) => {
                let left = deadline.remaining()?;
                std::thread::sleep((quiet - idle).min(left));
            }
            None => {
                let left = deadline.remaining().map_err(|e| {
                    warn!(pending = tracker.in_flight(), "Network never went idle");
                    e
                })?;
                std::thread::sleep(NETWORK_POLL_INTERVAL.min(left));
            }
        }
    }
}

// =============================================================================
// Blocking Capture
// =============================================================================

fn capture(
    config: &ChromeConfig,
    request: &RenderRequest,
    deadline: Deadline,
) -> Result<Bytes, RenderError> {
    let (viewport_width, viewport_height) = request.initial_viewport();

    // Every CDP call is bounded by the idle timeout, so it must not outlive
    // the render.
    let options = LaunchOptions::default_builder()
        .headless(true)
        .sandbox(false)
        .window_size(Some((viewport_width, viewport_height)))
        .path(config.chrome_path.clone())
        .args(CHROME_ARGS.iter().map(OsStr::new).collect())
        .idle_browser_timeout(deadline.remaining()?)
        .build()
        .map_err(|e| RenderError::Launch(e.to_string()))?;

    let browser = Browser::new(options).map_err(|e| RenderError::Launch(e.to_string()))?;
    let tab = browser
        .new_tab()
        .map_err(|e| RenderError::Launch(format!("failed to open tab: {}", e)))?;

    let tracker = Arc::new(NetworkTracker::new());
    let listener = Arc::clone(&tracker);
    tab.add_event_listener(Arc::new(move |event: &Event| listener.on_event(event)))
        .map_err(|e| RenderError::Launch(format!("failed to watch network: {}", e)))?;
    tab.call_method(Network::Enable {
        max_total_buffer_size: None,
        max_resource_buffer_size: None,
        max_post_data_size: None,
        report_direct_socket_traffic: None,
        enable_durable_messages: None,
    })
    .map_err(|e| RenderError::Launch(format!("failed to enable network events: {}", e)))?;

    tab.set_default_timeout(deadline.remaining()?);
    load_html(&tab, &request.html)?;

    deadline.remaining()?;
    tab.evaluate(WAIT_FOR_SETTLED_JS, true)
        .map_err(|e| RenderError::Navigation(format!("page did not settle: {}", e)))?;
    wait_for_network_idle(&tracker, config.settle_delay, deadline)?;

    deadline.remaining()?;
    let height = if request.is_full_page() {
        let content_height = page_height(&tab)?;
        if content_height > viewport_height {
            tab.set_bounds(Bounds::Normal {
                left: None,
                top: None,
                width: Some(f64::from(viewport_width)),
                height: Some(f64::from(content_height)),
            })
            .map_err(|e| RenderError::Capture(format!("failed to resize viewport: {}", e)))?;
        }
        content_height
    } else {
        request.height
    };

    debug!(
        width = request.width,
        height,
        scale = request.device_scale_factor,
        full_page = request.is_full_page(),
        "Capturing screenshot"
    );

    deadline.remaining()?;
    let clip = Page::Viewport {
        x: 0.0,
        y: 0.0,
        width: f64::from(request.width),
        height: f64::from(height),
        scale: request.device_scale_factor,
    };
    let png = tab
        .capture_screenshot(
            Page::CaptureScreenshotFormatOption::Png,
            None,
            Some(clip),
            true,
        )
        .map_err(|e| RenderError::Capture(e.to_string()))?;

    if !matches!(image::guess_format(&png), Ok(ImageFormat::Png)) {
        return Err(RenderError::InvalidOutput(
            "screenshot is not a PNG image".to_string(),
        ));
    }

    Ok(Bytes::from(png))
}

/// Load `html` as the document of `tab`.
fn load_html(tab: &Tab, html: &str) -> Result<(), RenderError> {
    let url = format!(
        "data:text/html;charset=utf-8;base64,{}",
        BASE64_STANDARD.encode(html)
    );

    if url.len() <= MAX_DATA_URL_LEN {
        tab.navigate_to(&url)
            .map_err(|e| RenderError::Navigation(e.to_string()))?;
        tab.wait_until_navigated()
            .map_err(|e| RenderError::Navigation(e.to_string()))?;
        return Ok(());
    }

    let literal = serde_json::to_string(html)
        .map_err(|e| RenderError::Navigation(format!("failed to encode document: {}", e)))?;
    tab.evaluate(
        &format!("document.open(); document.write({}); document.close();", literal),
        false,
    )
    .map_err(|e| RenderError::Navigation(e.to_string()))?;

    Ok(())
}

/// Full scroll height of the rendered document in CSS pixels.
fn page_height(tab: &Tab) -> Result<u32, RenderError> {
    let value = tab
        .evaluate(PAGE_HEIGHT_JS, false)
        .map_err(|e| RenderError::Capture(format!("failed to measure page: {}", e)))?
        .value
        .and_then(|v| v.as_f64())
        .ok_or_else(|| RenderError::Capture("page height is not a number".to_string()))?;

    Ok(clamp_page_height(value))
}

/// Convert a measured document height to a capture height, logging when the
/// page is taller than the largest supported capture.
fn clamp_page_height(measured: f64) -> u32 {
    let height = measured.max(1.0).ceil();
    if height > f64::from(MAX_DIMENSION) {
        warn!(
            measured = height,
            max = MAX_DIMENSION,
            "Page is taller than the capture limit, screenshot will be cut off"
        );
        return MAX_DIMENSION;
    }
    height as u32
}
