//! Turning a partial rendition request into a complete key.

use crate::error::CodecError;
use crate::key::{KeyRegistry, RenditionKey};
use crate::spec::ImageSpec;
use std::sync::Arc;

/// Resolve the missing parts of `key` against the original image.
///
/// - The mime type defaults to the original's.
/// - With no dimensions, the original size is used.
/// - With one dimension, the other follows the original aspect ratio.
/// - With both and `preserve_aspect_ratio`, the result is the largest size
///   with the original aspect ratio that fits inside the requested box.
///
/// Derived dimensions are rounded and never below 1.
pub fn complete_key(
    registry: &KeyRegistry,
    key: &RenditionKey,
    original: &ImageSpec,
    preserve_aspect_ratio: bool,
) -> Result<Arc<RenditionKey>, CodecError> {
    let mime_type = key
        .mime_type()
        .or_else(|| original.mime_type())
        .ok_or_else(|| CodecError::UnsupportedMimeType(format!("unknown for {}", key.uid())))?;

    let needs_original = key.width().is_none() || key.height().is_none() || preserve_aspect_ratio;
    let (width, height) = match (key.width(), key.height()) {
        (Some(w), Some(h)) if !needs_original => (w, h),
        requested => {
            let (ow, oh) = original.dimensions().ok_or_else(|| {
                CodecError::Decode(format!("dimensions of {} are unknown", key.uid()))
            })?;
            fit(requested, (ow, oh), preserve_aspect_ratio)
        }
    };

    Ok(registry.resolve(
        key.uid(),
        Some(mime_type),
        clamp_to_i32(width),
        clamp_to_i32(height),
    ))
}

fn fit(requested: (Option<u32>, Option<u32>), original: (u32, u32), preserve: bool) -> (u32, u32) {
    let (ow, oh) = (original.0.max(1) as f64, original.1.max(1) as f64);
    let scaled = |v: f64| (v.round() as u32).max(1);

    match requested {
        (None, None) => original,
        (Some(w), None) => (w, scaled(w as f64 * oh / ow)),
        (None, Some(h)) => (scaled(h as f64 * ow / oh), h),
        (Some(w), Some(h)) if preserve => {
            let factor = (w as f64 / ow).min(h as f64 / oh);
            (scaled(ow * factor), scaled(oh * factor))
        }
        (Some(w), Some(h)) => (w, h),
    }
}

fn clamp_to_i32(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}
