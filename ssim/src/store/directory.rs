//! Directory-per-uid rendition store.

use super::daemon::CullDaemon;
use super::eviction::{self, CullReport};
use super::layout;
use super::locks::{LockId, LockTable, ReadLock};
use super::RenditionStore;
use crate::config::StoreConfig;
use crate::data::ImageData;
use crate::error::{ConfigError, SsimError, StoreError};
use crate::key::RenditionKey;
use crate::spec::ImageSpec;
use filetime::FileTime;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::fs::{self, File};
use std::io::{self, BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// State shared between the store and its cull daemon.
///
/// `closed` is the process-wide lock: normal operations hold it shared,
/// culling and closing hold it exclusively.
pub(crate) struct Shared {
    storage_dir: PathBuf,
    max_size_bytes: u64,
    closed: RwLock<bool>,
    locks: Arc<LockTable>,
}

impl Shared {
    pub(crate) fn new(storage_dir: PathBuf, max_size_bytes: u64) -> Self {
        Self {
            storage_dir,
            max_size_bytes,
            closed: RwLock::new(false),
            locks: LockTable::new(),
        }
    }

    pub(crate) fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Enter a normal operation, failing if the store is closed.
    ///
    /// Recursive so a pending cull cannot block new operations while a
    /// write-back inside the lock waits on a handle held by one of them.
    fn enter(&self) -> Result<RwLockReadGuard<'_, bool>, StoreError> {
        let guard = self.closed.read_recursive();
        if *guard {
            return Err(StoreError::Closed);
        }
        Ok(guard)
    }

    /// One cull cycle against the configured budget.
    pub(crate) fn cull(&self) -> Result<Option<CullReport>, StoreError> {
        self.cull_to(self.max_size_bytes)
    }

    fn cull_to(&self, budget: u64) -> Result<Option<CullReport>, StoreError> {
        let closed = self.closed.write();
        if *closed {
            return Err(StoreError::Closed);
        }
        eviction::cull(&self.storage_dir, budget)
            .map_err(|e| StoreError::io(&self.storage_dir, e))
    }

    /// Flip to closed once all in-flight operations have drained.
    ///
    /// Returns false if the store was already closed.
    pub(crate) fn mark_closed(&self) -> bool {
        let mut closed = self.closed.write();
        !std::mem::replace(&mut *closed, true)
    }
}

/// Persistent rendition store rooted at `<storage_root>/SsimCacheDir_v1`.
///
/// Each uid gets one directory holding its metadata record and one file per
/// rendition. Reads and writes of distinct renditions proceed concurrently;
/// a rendition's file is written exclusively and read shared.
pub struct DirectoryStore {
    shared: Arc<Shared>,
    daemon: Mutex<Option<CullDaemon>>,
}

impl DirectoryStore {
    /// Open (creating if needed) the store under `config.storage_root`.
    ///
    /// The root must be an existing, writable directory. The cull daemon is
    /// started when both the size budget and the interval are non-zero.
    pub fn open(config: &StoreConfig) -> Result<Self, SsimError> {
        validate_root(&config.storage_root)?;

        let storage_dir = layout::storage_dir(&config.storage_root);
        fs::create_dir_all(&storage_dir).map_err(|e| StoreError::io(&storage_dir, e))?;

        let shared = Arc::new(Shared::new(storage_dir, config.max_size_bytes));

        let daemon = if config.cull_enabled() {
            let daemon = CullDaemon::start(Arc::clone(&shared), config.cull_interval)
                .map_err(SsimError::Spawn)?;
            Some(daemon)
        } else {
            debug!("Culling disabled for rendition store");
            None
        };

        info!(
            storage_dir = %shared.storage_dir().display(),
            max_size_bytes = config.max_size_bytes,
            cull_interval_secs = config.cull_interval.as_secs(),
            "Opened rendition store"
        );

        Ok(Self {
            shared,
            daemon: Mutex::new(daemon),
        })
    }

    /// The versioned cache directory.
    pub fn storage_dir(&self) -> &Path {
        self.shared.storage_dir()
    }

    /// Run one cull cycle now against the configured budget.
    pub fn cull_now(&self) -> Result<Option<CullReport>, StoreError> {
        self.shared.cull()
    }

    /// Run one cull cycle now against an explicit budget.
    pub fn cull_to(&self, budget: u64) -> Result<Option<CullReport>, StoreError> {
        self.shared.cull_to(budget)
    }

    /// `(instance file count, instance bytes)`.
    pub fn disk_usage(&self) -> Result<(usize, u64), StoreError> {
        let _global = self.shared.enter()?;
        let files = eviction::collect_instance_files(self.storage_dir())
            .map_err(|e| StoreError::io(self.storage_dir(), e))?;
        Ok((files.len(), eviction::total_size(&files)))
    }

    /// Whether the background cull daemon is alive.
    pub fn is_culling(&self) -> bool {
        self.daemon.lock().as_ref().is_some_and(CullDaemon::is_running)
    }

    /// Open the instance file for `key` under a shared lock.
    ///
    /// Returns `None` on a miss or when `accept` rejects the stored spec. Only
    /// accepted instances have their mtime refreshed for the cull's recency
    /// order; the reported timestamp is always the one from before the touch.
    fn open_instance(
        &self,
        key: &Arc<RenditionKey>,
        accept: impl FnOnce(&ImageSpec) -> bool,
    ) -> Result<Option<Box<dyn ImageData>>, StoreError> {
        require_complete(key)?;
        let _global = self.shared.enter()?;

        let lock = self.shared.locks.read(LockId::Instance(Arc::clone(key)));
        let path = layout::instance_path(self.storage_dir(), key);

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        let metadata = file.metadata().map_err(|e| StoreError::io(&path, e))?;

        let spec = ImageSpec::new(
            key.mime_type().map(str::to_string),
            metadata.modified().ok(),
            key.width(),
            key.height(),
        );
        if !accept(&spec) {
            debug!(key = %key, "Cached rendition rejected; recency left as is");
            return Ok(None);
        }

        if let Err(e) = filetime::set_file_mtime(&path, FileTime::now()) {
            debug!(path = %path.display(), error = %e, "Failed to refresh instance mtime");
        }

        Ok(Some(Box::new(CachedImageData {
            spec,
            length: metadata.len(),
            file,
            lock,
        })))
    }

    /// Write the uid's metadata record unless one already exists.
    fn ensure_initialized(&self, uid: &str, original: &ImageSpec) -> Result<(), StoreError> {
        let path = layout::metadata_path(self.storage_dir(), uid);

        {
            let _shared = self.shared.locks.read(LockId::Uid(uid.to_string()));
            if path.exists() {
                return Ok(());
            }
        }

        let _exclusive = self.shared.locks.write(LockId::Uid(uid.to_string()));
        if path.exists() {
            return Ok(());
        }

        let dir = layout::uid_dir(self.storage_dir(), uid);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let record = serde_json::to_vec(original).map_err(|source| StoreError::Metadata {
            path: path.clone(),
            source,
        })?;
        write_atomically(&path, &record).map_err(|e| StoreError::io(&path, e))?;

        debug!(uid, "Initialized metadata record");
        Ok(())
    }
}

fn validate_root(root: &Path) -> Result<(), ConfigError> {
    let invalid = || ConfigError::StorageRoot {
        path: root.to_path_buf(),
    };
    let metadata = fs::metadata(root).map_err(|_| invalid())?;
    if !metadata.is_dir() || metadata.permissions().readonly() {
        return Err(invalid());
    }
    Ok(())
}

/// Write `bytes` to a hidden sibling and rename it over `path`.
///
/// Readers and a crash mid-write only ever see the old file or the complete
/// new one. The temporary name never matches an instance file, so the cull
/// skips leftovers.
fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{}.{}.tmp", name, std::process::id()));

    let result = fs::write(&temp, bytes).and_then(|()| fs::rename(&temp, path));
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

fn require_complete(key: &RenditionKey) -> Result<(), StoreError> {
    if key.is_complete() {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

impl RenditionStore for DirectoryStore {
    fn original_spec(&self, key: &RenditionKey) -> Result<Option<ImageSpec>, StoreError> {
        let _global = self.shared.enter()?;
        let _lock = self.shared.locks.read(LockId::Uid(key.uid().to_string()));

        let path = layout::metadata_path(self.storage_dir(), key.uid());
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Metadata { path, source })
    }

    fn store(
        &self,
        key: &Arc<RenditionKey>,
        bytes: &[u8],
        original: &ImageSpec,
    ) -> Result<(), StoreError> {
        require_complete(key)?;
        let _global = self.shared.enter()?;

        self.ensure_initialized(key.uid(), original)?;

        let _lock = self.shared.locks.write(LockId::Instance(Arc::clone(key)));
        let path = layout::instance_path(self.storage_dir(), key);
        write_atomically(&path, bytes).map_err(|e| StoreError::io(&path, e))?;

        debug!(key = %key, bytes = bytes.len(), "Stored rendition");
        Ok(())
    }

    fn retrieve(&self, key: &Arc<RenditionKey>) -> Result<Option<Box<dyn ImageData>>, StoreError> {
        self.open_instance(key, |_| true)
    }

    fn retrieve_newer_than(
        &self,
        key: &Arc<RenditionKey>,
        source: &ImageSpec,
    ) -> Result<Option<Box<dyn ImageData>>, StoreError> {
        self.open_instance(key, |cached| cached.is_newer_than(source))
    }

    fn close(&self) -> Result<(), StoreError> {
        if !self.shared.mark_closed() {
            return Ok(());
        }

        if let Some(mut daemon) = self.daemon.lock().take() {
            daemon.shutdown();
            daemon.join();
        }

        info!(storage_dir = %self.storage_dir().display(), "Closed rendition store");
        Ok(())
    }
}

impl Drop for DirectoryStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to close rendition store");
        }
    }
}

/// A cache hit.
///
/// Holds a shared lock on its rendition until [`release`](ImageData::release)
/// is called or the handle is dropped. While it is held, no write-back for
/// the same rendition can complete.
pub struct CachedImageData {
    spec: ImageSpec,
    length: u64,
    file: File,
    lock: ReadLock,
}

impl CachedImageData {
    pub fn is_released(&self) -> bool {
        self.lock.is_released()
    }

    fn check_held(&self) -> io::Result<()> {
        if self.is_released() {
            Err(io::Error::other(StoreError::Released))
        } else {
            Ok(())
        }
    }
}

impl ImageData for CachedImageData {
    fn spec(&self) -> &ImageSpec {
        &self.spec
    }

    fn content_length(&self) -> Option<u64> {
        Some(self.length)
    }

    /// Readers opened from one handle share a file cursor; use one at a time.
    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        self.check_held()?;
        let mut file = self.file.try_clone()?;
        file.seek(SeekFrom::Start(0))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn release(&mut self) {
        self.lock.release();
    }
}

impl std::fmt::Debug for CachedImageData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedImageData")
            .field("spec", &self.spec)
            .field("length", &self.length)
            .field("released", &self.is_released())
            .finish()
    }
}
