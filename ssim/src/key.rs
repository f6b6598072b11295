//! Canonical rendition keys.
//!
//! A [`RenditionKey`] names one rendition request: a source uid plus an
//! optional target mime type and target dimensions. Keys are interned by a
//! [`KeyRegistry`], so value-equal requests share one `Arc<RenditionKey>` for
//! as long as anyone holds it. The shared instance carries a per-key monitor
//! that the finder uses to serialize recompute and write-back of a rendition.
//!
//! # Example
//!
//! ```
//! use ssim::key::KeyRegistry;
//! use std::sync::Arc;
//!
//! let registry = KeyRegistry::new();
//! let a = registry.resolve("img1", Some("image/png"), 100, -1);
//! let b = registry.resolve("img1", Some("image/png"), 100, -7);
//!
//! assert!(Arc::ptr_eq(&a, &b));
//! assert!(!a.is_complete());
//! ```

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

/// Dimension value meaning "unknown / unconstrained".
pub const UNKNOWN_DIMENSION: i32 = -1;

/// Registry size below which no sweep of dead entries happens.
const MIN_SWEEP_THRESHOLD: usize = 1024;

/// An immutable rendition request.
///
/// Equality and hashing are by value (uid, mime type, width, height). Keys
/// obtained from the same [`KeyRegistry`] are unique per value, so
/// [`Arc::ptr_eq`] is equivalent to `==` for them.
pub struct RenditionKey {
    uid: String,
    mime_type: Option<String>,
    width: i32,
    height: i32,
    monitor: KeyMonitor,
}

impl RenditionKey {
    fn new(uid: String, mime_type: Option<String>, width: i32, height: i32) -> Self {
        Self {
            uid,
            mime_type,
            width: width.max(UNKNOWN_DIMENSION),
            height: height.max(UNKNOWN_DIMENSION),
            monitor: KeyMonitor::default(),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// Target width, `None` when unconstrained.
    pub fn width(&self) -> Option<u32> {
        u32::try_from(self.width).ok()
    }

    /// Target height, `None` when unconstrained.
    pub fn height(&self) -> Option<u32> {
        u32::try_from(self.height).ok()
    }

    /// Target width with `-1` for unknown.
    pub fn raw_width(&self) -> i32 {
        self.width
    }

    /// Target height with `-1` for unknown.
    pub fn raw_height(&self) -> i32 {
        self.height
    }

    /// True when mime type and both dimensions are known.
    pub fn is_complete(&self) -> bool {
        self.mime_type.is_some() && self.width >= 0 && self.height >= 0
    }

    /// True when no resize is requested.
    pub fn is_unsized(&self) -> bool {
        self.width < 0 && self.height < 0
    }

    pub(crate) fn monitor(&self) -> &KeyMonitor {
        &self.monitor
    }
}

impl PartialEq for RenditionKey {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.uid == other.uid
            && self.mime_type == other.mime_type
    }
}

impl Eq for RenditionKey {}

impl Hash for RenditionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uid.hash(state);
        self.mime_type.hash(state);
        self.width.hash(state);
        self.height.hash(state);
    }
}

impl fmt::Debug for RenditionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenditionKey")
            .field("uid", &self.uid)
            .field("mime_type", &self.mime_type)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl fmt::Display for RenditionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{} {}x{}]",
            self.uid,
            self.mime_type.as_deref().unwrap_or("*"),
            self.width,
            self.height
        )
    }
}

/// Per-key "write-back in flight" flag plus the condition waiters block on.
///
/// Holding the mutex is the per-rendition critical section; the flag is set
/// while a computed rendition is being persisted.
#[derive(Default)]
pub(crate) struct KeyMonitor {
    persisting: Mutex<bool>,
    settled: Condvar,
}

impl KeyMonitor {
    /// Enter the critical section for this key.
    pub(crate) fn enter(&self) -> MutexGuard<'_, bool> {
        self.persisting.lock()
    }

    /// Block (inside the critical section) until no write-back is in flight.
    ///
    /// Returns true if the caller had to wait.
    pub(crate) fn wait_until_settled(&self, guard: &mut MutexGuard<'_, bool>) -> bool {
        let mut waited = false;
        while **guard {
            waited = true;
            self.settled.wait(guard);
        }
        waited
    }

    /// Clear the in-flight flag and wake every waiter.
    pub(crate) fn settle(&self) {
        let mut persisting = self.persisting.lock();
        *persisting = false;
        self.settled.notify_all();
    }
}

type KeyTuple = (String, Option<String>, i32, i32);

/// Interns [`RenditionKey`]s so value-equal requests share one instance.
///
/// Entries are held weakly: a key lives as long as some caller (a waiting
/// requester, a queued write-back) holds it. Dead entries are swept once the
/// map grows past twice its size at the previous sweep.
pub struct KeyRegistry {
    keys: DashMap<KeyTuple, Weak<RenditionKey>>,
    sweep_threshold: AtomicUsize,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self {
            keys: DashMap::new(),
            sweep_threshold: AtomicUsize::new(MIN_SWEEP_THRESHOLD),
        }
    }

    /// Return the canonical key for the given request.
    ///
    /// Negative dimensions are clamped to [`UNKNOWN_DIMENSION`]. Concurrent
    /// first-time resolutions of the same tuple converge on one instance.
    pub fn resolve(
        &self,
        uid: &str,
        mime_type: Option<&str>,
        width: i32,
        height: i32,
    ) -> Arc<RenditionKey> {
        let width = width.max(UNKNOWN_DIMENSION);
        let height = height.max(UNKNOWN_DIMENSION);
        let tuple = (
            uid.to_string(),
            mime_type.map(str::to_string),
            width,
            height,
        );

        let key = match self.keys.entry(tuple) {
            Entry::Occupied(mut entry) => match entry.get().upgrade() {
                Some(existing) => return existing,
                None => {
                    let fresh = Self::make_key(entry.key());
                    entry.insert(Arc::downgrade(&fresh));
                    fresh
                }
            },
            Entry::Vacant(entry) => {
                let fresh = Self::make_key(entry.key());
                entry.insert(Arc::downgrade(&fresh));
                fresh
            }
        };

        self.maybe_sweep();
        key
    }

    /// Return the canonical instance for a key's value.
    pub fn canonicalize(&self, key: &RenditionKey) -> Arc<RenditionKey> {
        self.resolve(&key.uid, key.mime_type(), key.width, key.height)
    }

    /// Drop entries whose key is no longer referenced anywhere.
    pub fn sweep(&self) {
        let before = self.keys.len();
        self.keys.retain(|_, weak| weak.strong_count() > 0);
        trace!(before, after = self.keys.len(), "Swept key registry");
    }

    /// Number of registry entries, including dead ones not yet swept.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn make_key(tuple: &KeyTuple) -> Arc<RenditionKey> {
        let (uid, mime_type, width, height) = tuple;
        Arc::new(RenditionKey::new(
            uid.clone(),
            mime_type.clone(),
            *width,
            *height,
        ))
    }

    fn maybe_sweep(&self) {
        let threshold = self.sweep_threshold.load(Ordering::Relaxed);
        if self.keys.len() <= threshold {
            return;
        }
        self.sweep();
        let next = (self.keys.len() * 2).max(MIN_SWEEP_THRESHOLD);
        self.sweep_threshold.store(next, Ordering::Relaxed);
    }
}

impl Default for KeyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
