//! On-disk naming for the directory store.
//!
//! ```text
//! <root>/SsimCacheDir_v1/<form-urlencoded uid>_cache/original_metadata.json
//! <root>/SsimCacheDir_v1/<form-urlencoded uid>_cache/instance_<w>_x_<h>_<mime with / as .>
//! ```
//!
//! Names are derived from the key alone, so no index is needed to find a
//! rendition. [`is_instance_file_name`] must stay in sync with
//! [`instance_file_name`]; the cull scan relies on it.

use crate::key::RenditionKey;
use std::path::{Path, PathBuf};
use url::form_urlencoded;

/// Basename of the versioned cache directory under the storage root.
pub const STORAGE_DIR_BASENAME: &str = "SsimCacheDir_v";

/// Bumped whenever the layout or record format changes incompatibly.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Prefix shared by every rendition instance file.
pub const INSTANCE_FILE_PREFIX: &str = "instance_";

/// Name of the per-uid metadata record.
pub const METADATA_FILE_NAME: &str = "original_metadata.json";

const UID_DIR_SUFFIX: &str = "_cache";
const UNDEFINED_MIME_TYPE: &str = "undefined.mime.type";

/// `<root>/SsimCacheDir_v<N>`
pub fn storage_dir(root: &Path) -> PathBuf {
    root.join(format!("{}{}", STORAGE_DIR_BASENAME, CACHE_FORMAT_VERSION))
}

/// Directory holding every file for `uid`.
pub fn uid_dir(storage_dir: &Path, uid: &str) -> PathBuf {
    storage_dir.join(uid_dir_name(uid))
}

/// Metadata record path for `uid`.
pub fn metadata_path(storage_dir: &Path, uid: &str) -> PathBuf {
    uid_dir(storage_dir, uid).join(METADATA_FILE_NAME)
}

/// Instance file path for a key.
pub fn instance_path(storage_dir: &Path, key: &RenditionKey) -> PathBuf {
    uid_dir(storage_dir, key.uid()).join(instance_file_name(key))
}

/// Reversible, filesystem-safe directory name for a uid.
pub fn uid_dir_name(uid: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(uid.as_bytes()).collect();
    format!("{}{}", encoded, UID_DIR_SUFFIX)
}

/// Recover the uid from a directory produced by [`uid_dir_name`].
pub fn uid_from_dir_name(name: &str) -> Option<String> {
    let encoded = name.strip_suffix(UID_DIR_SUFFIX)?;
    let query = format!("{}=", encoded);
    let (uid, _) = form_urlencoded::parse(query.as_bytes()).next()?;
    Some(uid.into_owned())
}

/// `instance_<w>_x_<h>_<mime>`
pub fn instance_file_name(key: &RenditionKey) -> String {
    let mime = key
        .mime_type()
        .map(|m| m.replace('/', "."))
        .unwrap_or_else(|| UNDEFINED_MIME_TYPE.to_string());
    format!(
        "{}{}_x_{}_{}",
        INSTANCE_FILE_PREFIX,
        key.raw_width(),
        key.raw_height(),
        mime
    )
}

pub fn is_instance_file_name(name: &str) -> bool {
    name.starts_with(INSTANCE_FILE_PREFIX)
}
