//! Ephemeral image store.
//!
//! Rendered images published by URL live here until they expire or the
//! process exits.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! │  POST /screenshot-url   GET /image/{id} │
//! └────────────────────┬────────────────────┘
//!                      │ put / get
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │               ImageStore                │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ id → image   │  │     Clock       │  │
//! │  │ (RwLock map) │  │ (expiry checks) │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────▲────────────────────┘
//!                      │ sweep
//! ┌────────────────────┴────────────────────┐
//! │         Sweeper (background task)       │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`ImageStore`]: the map of live images with lazy eviction and sweeping
//! - [`ImageId`]: random 128-bit identifier handed out to clients
//! - [`StoredImage`]: immutable entry with creation and expiry time
//! - [`Clock`]: time source, with [`SystemClock`] and [`ManualClock`]
//! - [`spawn_sweeper`]: periodic bulk removal of expired entries

mod clock;
mod image_store;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use image_store::{ImageId, ImageStore, StoredImage, DEFAULT_IMAGE_TTL};
pub use sweeper::{spawn_sweeper, DEFAULT_SWEEP_INTERVAL};
