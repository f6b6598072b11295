//! Persistent storage of renditions.
//!
//! [`RenditionStore`] is the seam the finder talks to; [`DirectoryStore`] is
//! the on-disk implementation with its background cull.

mod daemon;
mod directory;
pub mod eviction;
pub mod layout;
mod locks;

pub use directory::{CachedImageData, DirectoryStore};
pub use eviction::CullReport;

use crate::data::ImageData;
use crate::error::StoreError;
use crate::key::RenditionKey;
use crate::spec::ImageSpec;
use std::sync::Arc;

/// Durable storage of renditions and the originals' metadata.
///
/// `store` and `retrieve` require a complete key.
pub trait RenditionStore: Send + Sync {
    /// The metadata record for the key's uid, or `None` if the uid has never
    /// been stored.
    fn original_spec(&self, key: &RenditionKey) -> Result<Option<ImageSpec>, StoreError>;

    /// Persist `bytes` as the rendition for `key`, replacing any previous
    /// content. The uid's metadata record is written from `original` only if
    /// it does not exist yet.
    fn store(
        &self,
        key: &Arc<RenditionKey>,
        bytes: &[u8],
        original: &ImageSpec,
    ) -> Result<(), StoreError>;

    /// The stored rendition for `key`, or `None` on a miss.
    ///
    /// The returned handle must be released (or dropped) promptly; writers of
    /// the same rendition wait for it.
    fn retrieve(&self, key: &Arc<RenditionKey>) -> Result<Option<Box<dyn ImageData>>, StoreError>;

    /// The stored rendition for `key` if it is newer than `source`.
    ///
    /// An older rendition is a miss. Stores that refresh recency on reads must
    /// not refresh a rejected one, or it would look fresh to a later request;
    /// the provided version is only correct for stores that never touch.
    fn retrieve_newer_than(
        &self,
        key: &Arc<RenditionKey>,
        source: &ImageSpec,
    ) -> Result<Option<Box<dyn ImageData>>, StoreError> {
        Ok(self
            .retrieve(key)?
            .filter(|cached| cached.spec().is_newer_than(source)))
    }

    /// Stop background work and refuse further operations. Idempotent.
    fn close(&self) -> Result<(), StoreError>;
}

impl<S: RenditionStore + ?Sized> RenditionStore for Arc<S> {
    fn original_spec(&self, key: &RenditionKey) -> Result<Option<ImageSpec>, StoreError> {
        (**self).original_spec(key)
    }

    fn store(
        &self,
        key: &Arc<RenditionKey>,
        bytes: &[u8],
        original: &ImageSpec,
    ) -> Result<(), StoreError> {
        (**self).store(key, bytes, original)
    }

    fn retrieve(&self, key: &Arc<RenditionKey>) -> Result<Option<Box<dyn ImageData>>, StoreError> {
        (**self).retrieve(key)
    }

    fn retrieve_newer_than(
        &self,
        key: &Arc<RenditionKey>,
        source: &ImageSpec,
    ) -> Result<Option<Box<dyn ImageData>>, StoreError> {
        (**self).retrieve_newer_than(key, source)
    }

    fn close(&self) -> Result<(), StoreError> {
        (**self).close()
    }
}
