//! Raw source images.

use crate::data::ImageData;
use crate::error::ResolverError;
use crate::spec::ImageSpec;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

/// Looks up the raw, unmodified image behind a uid.
pub trait SourceResolver: Send + Sync {
    /// Metadata and a lazy byte stream for `uid`.
    ///
    /// Must not read the image payload; that happens when the caller opens
    /// the returned data.
    fn raw_image_data(&self, uid: &str) -> Result<Box<dyn ImageData>, ResolverError>;

    /// Whether unconstrained requests for `uid` should still be served
    /// through the cache instead of straight from the source.
    fn serve_unmodified_from_cache(&self, _uid: &str) -> bool {
        false
    }
}

/// Guess a mime type from a uid's file extension.
pub fn mime_type_from_uid(uid: &str) -> Option<&'static str> {
    let ext = Path::new(uid).extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        "ico" => "image/x-icon",
        _ => return None,
    };
    Some(mime)
}

/// Serves uids as relative paths under a root directory.
#[derive(Debug, Clone)]
pub struct FileSourceResolver {
    root: PathBuf,
}

impl FileSourceResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path for `uid`, or `None` if it would escape the root.
    fn path_for(&self, uid: &str) -> Option<PathBuf> {
        let relative = Path::new(uid);
        let stays_inside = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        (stays_inside && !uid.is_empty()).then(|| self.root.join(relative))
    }
}

impl SourceResolver for FileSourceResolver {
    fn raw_image_data(&self, uid: &str) -> Result<Box<dyn ImageData>, ResolverError> {
        let path = self
            .path_for(uid)
            .ok_or_else(|| ResolverError::NotFound(uid.to_string()))?;

        let metadata = match fs::metadata(&path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Err(ResolverError::NotFound(uid.to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ResolverError::NotFound(uid.to_string()))
            }
            Err(source) => {
                return Err(ResolverError::Io {
                    uid: uid.to_string(),
                    source,
                })
            }
        };

        let spec = ImageSpec::new(
            mime_type_from_uid(uid).map(str::to_string),
            metadata.modified().ok(),
            None,
            None,
        );

        Ok(Box::new(FileImageData {
            spec,
            path,
            length: metadata.len(),
        }))
    }
}

/// A source file on disk. Opened only when read.
#[derive(Debug, Clone)]
pub struct FileImageData {
    spec: ImageSpec,
    path: PathBuf,
    length: u64,
}

impl FileImageData {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ImageData for FileImageData {
    fn spec(&self) -> &ImageSpec {
        &self.spec
    }

    fn content_length(&self) -> Option<u64> {
        Some(self.length)
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        Ok(Box::new(BufReader::new(File::open(&self.path)?)))
    }
}
