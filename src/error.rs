use thiserror::Error;

/// Invalid render parameters supplied by a client (maps to HTTP 400)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    /// The `html` field is missing or empty
    #[error("HTML content is required")]
    MissingHtml,

    /// Width outside the supported range
    #[error("Invalid width: {width} (must be 1-{max})")]
    InvalidWidth { width: u32, max: u32 },

    /// Height outside the supported range (0 means full page)
    #[error("Invalid height: {height} (must be 0-{max}, 0 = full page)")]
    InvalidHeight { height: u32, max: u32 },

    /// Device scale factor not a finite number in the supported range
    #[error("Invalid deviceScaleFactor: {factor} (must be greater than 0 and at most {max})")]
    InvalidScaleFactor { factor: f64, max: f64 },

    /// The request body could not be parsed
    #[error("{0}")]
    MalformedBody(String),
}

/// Errors produced by the headless browser renderer
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// The browser process could not be started
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    /// Loading the HTML document failed or never completed
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// The screenshot could not be captured
    #[error("Screenshot capture failed: {0}")]
    Capture(String),

    /// The render did not finish within the configured timeout
    #[error("Render timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The browser returned bytes that are not a PNG image
    #[error("Renderer produced invalid output: {0}")]
    InvalidOutput(String),

    /// The blocking render task panicked or was cancelled
    #[error("Render task failed: {0}")]
    TaskFailed(String),
}

/// Lookup failures from the ephemeral image store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No entry exists for the identifier
    #[error("Image not found")]
    NotFound,

    /// The entry existed but its TTL has elapsed (it has now been evicted)
    #[error("Image has expired")]
    Expired,
}

/// Errors from the external image host
#[derive(Debug, Clone, Error)]
pub enum UploadError {
    /// Network or connection error talking to the host
    #[error("Upload request failed: {0}")]
    Request(String),

    /// The host did not answer within the configured timeout
    #[error("Upload timed out")]
    Timeout,

    /// The host answered with a non-success HTTP status
    #[error("Image host returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The host answered 2xx but the payload could not be understood
    #[error("Invalid response from image host: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UploadError::Timeout
        } else if err.is_decode() {
            UploadError::InvalidResponse(err.to_string())
        } else {
            UploadError::Request(err.to_string())
        }
    }
}
