//! Intrinsic properties of an image.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Mime type, last-modified time and pixel dimensions of an image.
///
/// Every field may be unknown. This is the value persisted as a uid's
/// metadata record; the live variant with a byte stream is
/// [`ImageData`](crate::data::ImageData).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageSpec {
    pub mime_type: Option<String>,
    /// Last-modified time in milliseconds since the Unix epoch
    pub timestamp_millis: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ImageSpec {
    pub fn new(
        mime_type: Option<String>,
        timestamp: Option<SystemTime>,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Self {
        Self {
            mime_type,
            timestamp_millis: timestamp.map(to_millis),
            width,
            height,
        }
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn timestamp(&self) -> Option<SystemTime> {
        self.timestamp_millis
            .map(|ms| UNIX_EPOCH + Duration::from_millis(ms))
    }

    /// Both dimensions, if known.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        Some((self.width?, self.height?))
    }

    /// True when this image was modified strictly after `other`.
    ///
    /// An unknown timestamp on `other` counts as "never modified", so anything
    /// with a known timestamp is newer; an unknown timestamp here is never newer.
    pub fn is_newer_than(&self, other: &ImageSpec) -> bool {
        match (self.timestamp_millis, other.timestamp_millis) {
            (Some(mine), Some(theirs)) => mine > theirs,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// Millisecond resolution, clamped to the epoch for pre-1970 times.
pub(crate) fn to_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
