//! The request orchestrator.
//!
//! [`ImageFinder::find`] decides per request whether to hand back the raw
//! source, a cached rendition, or a freshly computed one. Fresh renditions
//! are returned immediately and persisted in the background; requests for the
//! same rendition that arrive while it is being persisted wait for it and
//! then read it from the cache instead of computing it again.

mod complete;
mod runner;
mod stats;

pub use complete::complete_key;
pub use runner::WriteBackRunner;
pub use stats::FinderStats;

use crate::codec::ImageCodec;
use crate::config::FinderConfig;
use crate::data::{BufferedImageData, ImageData};
use crate::error::{ResolverError, SsimError, StoreError};
use crate::key::{KeyRegistry, RenditionKey};
use crate::source::SourceResolver;
use crate::spec::ImageSpec;
use crate::store::{DirectoryStore, RenditionStore};
use stats::StatsCounters;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};

/// Finds, computes and caches image renditions.
pub struct ImageFinder {
    resolver: Arc<dyn SourceResolver>,
    codec: Arc<dyn ImageCodec>,
    store: Arc<dyn RenditionStore>,
    registry: KeyRegistry,
    runner: WriteBackRunner,
    stats: Arc<StatsCounters>,
    closed: AtomicBool,
}

impl ImageFinder {
    /// Assemble a finder from its collaborators.
    pub fn new(
        resolver: impl SourceResolver + 'static,
        codec: impl ImageCodec + 'static,
        store: impl RenditionStore + 'static,
        write_back_threads: usize,
    ) -> Result<Self, SsimError> {
        let runner = WriteBackRunner::new(write_back_threads).map_err(SsimError::Spawn)?;
        Ok(Self {
            resolver: Arc::new(resolver),
            codec: Arc::new(codec),
            store: Arc::new(store),
            registry: KeyRegistry::new(),
            runner,
            stats: Arc::new(StatsCounters::default()),
            closed: AtomicBool::new(false),
        })
    }

    /// Finder over a [`DirectoryStore`] opened from `config`.
    pub fn open(
        resolver: impl SourceResolver + 'static,
        codec: impl ImageCodec + 'static,
        config: &FinderConfig,
    ) -> Result<Self, SsimError> {
        let store = DirectoryStore::open(&config.store)?;
        Self::new(resolver, codec, store, config.write_back_threads)
    }

    /// Find the rendition of `uid` in `mime_type` at `width` x `height`.
    ///
    /// `None` and negative values mean "unconstrained". With
    /// `preserve_aspect_ratio`, the result fits inside the requested box.
    ///
    /// The returned data may hold a read lock on a cached rendition; release
    /// or drop it promptly.
    pub fn find(
        &self,
        uid: &str,
        mime_type: Option<&str>,
        width: i32,
        height: i32,
        preserve_aspect_ratio: bool,
    ) -> Result<Box<dyn ImageData>, SsimError> {
        StatsCounters::bump(&self.stats.requests);

        let key = self.registry.resolve(uid, mime_type, width, height);
        let raw = self.resolver.raw_image_data(uid)?;

        if key.is_unsized() && !self.resolver.serve_unmodified_from_cache(uid) {
            let mime_matches = key.mime_type().is_none() || key.mime_type() == raw.mime_type();
            if mime_matches {
                StatsCounters::bump(&self.stats.fast_path);
                debug!(uid, "Serving unmodified source");
                return Ok(raw);
            }
        }

        let mut source = SourceBytes::new(uid, raw.as_ref());

        let (complete, mut original) = if preserve_aspect_ratio || !key.is_complete() {
            let original = match self.store.original_spec(&key)? {
                Some(spec) => spec,
                None => {
                    let (w, h) = self.codec.dimensions(source.bytes()?)?;
                    ImageSpec {
                        width: Some(w),
                        height: Some(h),
                        ..raw.spec().clone()
                    }
                }
            };
            let complete = complete_key(&self.registry, &key, &original, preserve_aspect_ratio)?;
            (complete, Some(original))
        } else {
            (key, None)
        };

        let (Some(target_mime), Some(target_width), Some(target_height)) =
            (complete.mime_type(), complete.width(), complete.height())
        else {
            return Err(StoreError::InvalidKey(complete.to_string()).into());
        };

        let monitor = complete.monitor();
        let mut persisting = monitor.enter();
        if monitor.wait_until_settled(&mut persisting) {
            StatsCounters::bump(&self.stats.waits);
        }

        if let Some(cached) = self.store.retrieve_newer_than(&complete, raw.spec())? {
            StatsCounters::bump(&self.stats.cache_hits);
            debug!(key = %complete, "Serving cached rendition");
            return Ok(cached);
        }

        let decoded = self.codec.decode(source.bytes()?)?;
        let original = original.take().unwrap_or_else(|| {
            ImageSpec::new(
                raw.mime_type().map(str::to_string),
                raw.timestamp(),
                Some(decoded.width()),
                Some(decoded.height()),
            )
        });
        let bytes: Arc<[u8]> = self
            .codec
            .encode_scaled(&decoded, target_mime, target_width, target_height)?
            .into();

        StatsCounters::bump(&self.stats.recomputes);
        debug!(key = %complete, bytes = bytes.len(), "Computed rendition");

        *persisting = true;
        let posted = self.runner.post({
            let store = Arc::clone(&self.store);
            let stats = Arc::clone(&self.stats);
            let key = Arc::clone(&complete);
            let bytes = Arc::clone(&bytes);
            move || write_back(store.as_ref(), &stats, &key, &bytes, &original)
        });
        if let Err(e) = posted {
            // Nobody can be waiting: the flag was never visible outside this section
            *persisting = false;
            return Err(e);
        }
        drop(persisting);

        let spec = ImageSpec::new(
            Some(target_mime.to_string()),
            Some(SystemTime::now()),
            Some(target_width),
            Some(target_height),
        );
        Ok(Box::new(BufferedImageData::new(spec, bytes)))
    }

    /// Current counters.
    pub fn stats(&self) -> FinderStats {
        self.stats.snapshot()
    }

    /// Drain pending write-backs, then close the store. Idempotent.
    pub fn close(&self) -> Result<(), SsimError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.runner.close();
        self.store.close()?;
        Ok(())
    }
}

impl Drop for ImageFinder {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to close image finder");
        }
    }
}

/// Persist a computed rendition, then let waiters for it proceed.
fn write_back(
    store: &dyn RenditionStore,
    stats: &StatsCounters,
    key: &Arc<RenditionKey>,
    bytes: &[u8],
    original: &ImageSpec,
) {
    match store.store(key, bytes, original) {
        Ok(()) => StatsCounters::bump(&stats.write_backs_completed),
        Err(e) => {
            StatsCounters::bump(&stats.write_back_failures);
            warn!(key = %key, error = %e, "Write-back failed; rendition will be recomputed");
        }
    }
    key.monitor().settle();
}

/// Raw source bytes, read at most once per request.
struct SourceBytes<'a> {
    uid: &'a str,
    raw: &'a dyn ImageData,
    bytes: Option<Vec<u8>>,
}

impl<'a> SourceBytes<'a> {
    fn new(uid: &'a str, raw: &'a dyn ImageData) -> Self {
        Self {
            uid,
            raw,
            bytes: None,
        }
    }

    fn bytes(&mut self) -> Result<&[u8], ResolverError> {
        if self.bytes.is_none() {
            let bytes = self.raw.read_to_vec().map_err(|source| ResolverError::Io {
                uid: self.uid.to_string(),
                source,
            })?;
            self.bytes = Some(bytes);
        }
        Ok(self.bytes.as_deref().unwrap_or_default())
    }
}
