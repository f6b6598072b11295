//! Stub collaborators shared by the integration tests.

#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use parking_lot::Mutex;
use ssim::codec::{DecodedImage, ImageCodec, ImageCrateCodec};
use ssim::error::{CodecError, ResolverError, StoreError};
use ssim::source::SourceResolver;
use ssim::store::RenditionStore;
use ssim::{BufferedImageData, ImageData, ImageSpec, RenditionKey};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

/// Encode a solid PNG of the given size.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([10, 120, 200, 255]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Poll `condition` for up to five seconds.
pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[derive(Clone)]
struct Source {
    mime_type: Option<String>,
    modified: SystemTime,
    bytes: Arc<[u8]>,
}

/// In-memory sources whose timestamps tests can move.
#[derive(Clone, Default)]
pub struct StubResolver {
    sources: Arc<Mutex<HashMap<String, Source>>>,
    cache_unmodified: bool,
    pub lookups: Arc<AtomicUsize>,
}

impl StubResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serving_unmodified_from_cache(mut self) -> Self {
        self.cache_unmodified = true;
        self
    }

    /// Add a source last modified an hour ago.
    pub fn with_source(self, uid: &str, mime_type: Option<&str>, bytes: Vec<u8>) -> Self {
        self.sources.lock().insert(
            uid.to_string(),
            Source {
                mime_type: mime_type.map(str::to_string),
                modified: SystemTime::now() - Duration::from_secs(3600),
                bytes: bytes.into(),
            },
        );
        self
    }

    pub fn touch(&self, uid: &str, modified: SystemTime) {
        if let Some(source) = self.sources.lock().get_mut(uid) {
            source.modified = modified;
        }
    }
}

impl SourceResolver for StubResolver {
    fn raw_image_data(&self, uid: &str) -> Result<Box<dyn ImageData>, ResolverError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let source = self
            .sources
            .lock()
            .get(uid)
            .cloned()
            .ok_or_else(|| ResolverError::NotFound(uid.to_string()))?;
        let spec = ImageSpec::new(source.mime_type, Some(source.modified), None, None);
        Ok(Box::new(BufferedImageData::new(spec, source.bytes)))
    }

    fn serve_unmodified_from_cache(&self, _uid: &str) -> bool {
        self.cache_unmodified
    }
}

/// Real codec that counts (and optionally slows down) encodes.
#[derive(Clone, Default)]
pub struct CountingCodec {
    inner: ImageCrateCodec,
    delay: Duration,
    pub encodes: Arc<AtomicUsize>,
    pub decodes: Arc<AtomicUsize>,
}

impl CountingCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn encodes(&self) -> usize {
        self.encodes.load(Ordering::SeqCst)
    }
}

impl ImageCodec for CountingCodec {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, CodecError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        self.inner.decode(bytes)
    }

    fn dimensions(&self, bytes: &[u8]) -> Result<(u32, u32), CodecError> {
        self.inner.dimensions(bytes)
    }

    fn encode_scaled(
        &self,
        image: &DecodedImage,
        mime_type: &str,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, CodecError> {
        self.encodes.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        self.inner.encode_scaled(image, mime_type, width, height)
    }
}

/// Store that records every call and never holds anything.
#[derive(Clone, Default)]
pub struct RecordingStore {
    pub calls: Arc<AtomicUsize>,
    fail_writes: bool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every write fails.
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RenditionStore for RecordingStore {
    fn original_spec(&self, _key: &RenditionKey) -> Result<Option<ImageSpec>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }

    fn store(
        &self,
        key: &Arc<RenditionKey>,
        _bytes: &[u8],
        _original: &ImageSpec,
    ) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            Err(StoreError::InvalidKey(format!("refusing {}", key)))
        } else {
            Ok(())
        }
    }

    fn retrieve(
        &self,
        _key: &Arc<RenditionKey>,
    ) -> Result<Option<Box<dyn ImageData>>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }

    fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Reads through to `inner`; every write fails.
pub struct WriteFailingStore<S> {
    pub inner: S,
    pub failed_writes: Arc<AtomicUsize>,
}

impl<S: RenditionStore> WriteFailingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failed_writes: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl<S: RenditionStore> RenditionStore for WriteFailingStore<S> {
    fn original_spec(&self, key: &RenditionKey) -> Result<Option<ImageSpec>, StoreError> {
        self.inner.original_spec(key)
    }

    fn store(
        &self,
        key: &Arc<RenditionKey>,
        _bytes: &[u8],
        _original: &ImageSpec,
    ) -> Result<(), StoreError> {
        self.failed_writes.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::InvalidKey(format!("refusing {}", key)))
    }

    fn retrieve(
        &self,
        key: &Arc<RenditionKey>,
    ) -> Result<Option<Box<dyn ImageData>>, StoreError> {
        self.inner.retrieve(key)
    }

    fn retrieve_newer_than(
        &self,
        key: &Arc<RenditionKey>,
        source: &ImageSpec,
    ) -> Result<Option<Box<dyn ImageData>>, StoreError> {
        self.inner.retrieve_newer_than(key, source)
    }

    fn close(&self) -> Result<(), StoreError> {
        self.inner.close()
    }
}
