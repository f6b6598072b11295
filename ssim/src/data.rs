//! Image data handles returned by sources and by the cache.

use crate::spec::ImageSpec;
use std::io::{self, Cursor, Read};
use std::sync::Arc;
use std::time::SystemTime;

/// An image whose bytes can be streamed on demand.
///
/// Implementations must not buffer their payload before [`open`](Self::open)
/// is called; only the [`ImageSpec`] and content length are expected to be
/// cheap.
///
/// # Implementors
///
/// - [`BufferedImageData`] - freshly computed rendition held in memory
/// - [`CachedImageData`](crate::store::CachedImageData) - cache hit holding a read lock
/// - [`FileImageData`](crate::source::FileImageData) - raw source file
pub trait ImageData: Send {
    /// Intrinsic properties of this image.
    fn spec(&self) -> &ImageSpec;

    /// Length of the encoded bytes, if known.
    fn content_length(&self) -> Option<u64>;

    /// Open a reader over the encoded bytes.
    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>>;

    fn mime_type(&self) -> Option<&str> {
        self.spec().mime_type()
    }

    fn timestamp(&self) -> Option<SystemTime> {
        self.spec().timestamp()
    }

    fn width(&self) -> Option<u32> {
        self.spec().width
    }

    fn height(&self) -> Option<u32> {
        self.spec().height
    }

    /// Read the whole payload into memory.
    fn read_to_vec(&self) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.content_length().unwrap_or(0) as usize);
        self.open()?.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Give up any resources held on behalf of this handle.
    ///
    /// Idempotent. Cache hits hold a read lock on their rendition until
    /// released or dropped; no writer for that rendition can proceed until
    /// then.
    fn release(&mut self) {}
}

/// A rendition held entirely in memory.
#[derive(Debug, Clone)]
pub struct BufferedImageData {
    spec: ImageSpec,
    bytes: Arc<[u8]>,
}

impl BufferedImageData {
    pub fn new(spec: ImageSpec, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            spec,
            bytes: bytes.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl ImageData for BufferedImageData {
    fn spec(&self) -> &ImageSpec {
        &self.spec
    }

    fn content_length(&self) -> Option<u64> {
        Some(self.bytes.len() as u64)
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        Ok(Box::new(Cursor::new(&self.bytes[..])))
    }

    fn read_to_vec(&self) -> io::Result<Vec<u8>> {
        Ok(self.bytes.to_vec())
    }
}
