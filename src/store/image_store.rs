//! In-memory store for rendered images with time-based expiry.
//!
//! Every image is stored under a freshly generated random identifier and
//! stays retrievable until its TTL elapses. Expired entries are removed
//! lazily when they are next requested, or in bulk by [`ImageStore::sweep`].
//!
//! # Visibility
//!
//! An entry is visible while `now <= expires_at`. Once `now > expires_at`,
//! the first lookup reports [`StoreError::Expired`] and removes the entry;
//! every later lookup reports [`StoreError::NotFound`].

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use crate::error::StoreError;

/// Default lifetime of a stored image: 24 hours.
pub const DEFAULT_IMAGE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

// =============================================================================
// Image Identifier
// =============================================================================

/// Opaque identifier of a stored image (random UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(Uuid);

impl ImageId {
    /// Generate a new random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ImageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// =============================================================================
// Stored Image
// =============================================================================

/// A rendered image held by the store.
///
/// Entries are immutable once inserted.
#[derive(Debug, Clone)]
pub struct StoredImage {
    id: ImageId,
    bytes: Bytes,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl StoredImage {
    pub fn id(&self) -> ImageId {
        self.id
    }

    /// The PNG payload.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the entry is past its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Time left before expiry, zero if already expired.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

// =============================================================================
// Image Store
// =============================================================================

/// Concurrency-safe, time-expiring store of rendered images.
///
/// The map lock is only held for the map operation itself, never while
/// rendering or serving bytes.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use htmlshot::store::ImageStore;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let store = ImageStore::new(Duration::from_secs(3600));
///
///     let id = store.put(Bytes::from_static(b"\x89PNG")).await;
///     let image = store.get(&id).await.unwrap();
///     assert_eq!(image.bytes().as_ref(), b"\x89PNG");
/// }
/// ```
pub struct ImageStore {
    entries: RwLock<HashMap<ImageId, StoredImage>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ImageStore {
    /// Create a store using the system clock.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Create a store that reads time from `clock`.
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Configured time-to-live for new entries.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// TTL in whole hours, as advertised to clients.
    pub fn ttl_hours(&self) -> u64 {
        self.ttl.as_secs() / 3600
    }

    /// Current time as seen by the store.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Insert an image and return its new identifier.
    pub async fn put(&self, bytes: Bytes) -> ImageId {
        let created_at = self.clock.now();
        let expires_at = expiry_for(created_at, self.ttl);
        let size = bytes.len();

        let mut entries = self.entries.write().await;
        let id = loop {
            let id = ImageId::generate();
            if let Entry::Vacant(slot) = entries.entry(id) {
                slot.insert(StoredImage {
                    id,
                    bytes,
                    created_at,
                    expires_at,
                });
                break id;
            }
        };
        let count = entries.len();
        drop(entries);

        debug!(%id, size, stored = count, "Stored image");
        id
    }

    /// Look up an image.
    ///
    /// An expired entry is removed as a side effect and reported as
    /// [`StoreError::Expired`]. Each expiry is reported at most once: if a
    /// sweep or another lookup removed the entry first, this returns
    /// [`StoreError::NotFound`].
    pub async fn get(&self, id: &ImageId) -> Result<StoredImage, StoreError> {
        let now = self.clock.now();

        {
            let entries = self.entries.read().await;
            match entries.get(id) {
                None => return Err(StoreError::NotFound),
                Some(image) if !image.is_expired_at(now) => return Ok(image.clone()),
                Some(_) => {}
            }
        }

        // A concurrent sweep or lookup may have evicted it in between; only
        // the caller that removes the entry reports it as expired.
        let mut entries = self.entries.write().await;
        match entries.get(id) {
            None => return Err(StoreError::NotFound),
            Some(image) if !image.is_expired_at(now) => return Ok(image.clone()),
            Some(_) => {}
        }

        entries.remove(id);
        debug!(%id, "Evicted expired image on access");
        Err(StoreError::Expired)
    }

    /// Remove every entry that is expired now. Returns the number removed.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, image| !image.is_expired_at(now));
        before - entries.len()
    }

    /// Whether an entry for `id` is present, expired or not.
    pub async fn contains(&self, id: &ImageId) -> bool {
        self.entries.read().await.contains_key(id)
    }

    /// Number of entries, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Total payload size of all entries in bytes.
    pub async fn total_bytes(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .map(|image| image.bytes.len())
            .sum()
    }
}

/// `created_at + ttl`, saturating at the latest representable instant.
fn expiry_for(created_at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| created_at.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl Default for ImageStore {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_TTL)
    }
}

// =============================================================================
// Tests
// =============================================================================
