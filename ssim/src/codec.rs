//! Decoding, scaling and re-encoding of images.

use crate::error::CodecError;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;

/// A decoded source image, ready to be scaled any number of times.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    image: DynamicImage,
}

impl DecodedImage {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }
}

/// Pixel work behind the finder.
///
/// Target dimensions passed to [`encode_scaled`](Self::encode_scaled) are
/// already final; aspect-ratio policy is the caller's concern.
pub trait ImageCodec: Send + Sync {
    /// Decode an encoded image.
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, CodecError>;

    /// Pixel dimensions of an encoded image, decoding as little as possible.
    fn dimensions(&self, bytes: &[u8]) -> Result<(u32, u32), CodecError>;

    /// Resize `image` to exactly `width` x `height` and encode it as `mime_type`.
    fn encode_scaled(
        &self,
        image: &DecodedImage,
        mime_type: &str,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, CodecError>;

    /// Decode then [`encode_scaled`](Self::encode_scaled).
    fn scale(
        &self,
        bytes: &[u8],
        mime_type: &str,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, CodecError> {
        let image = self.decode(bytes)?;
        self.encode_scaled(&image, mime_type, width, height)
    }
}

/// [`ImageCodec`] on the `image` crate.
#[derive(Debug, Clone, Copy)]
pub struct ImageCrateCodec {
    filter: FilterType,
}

impl ImageCrateCodec {
    pub fn new() -> Self {
        Self {
            filter: FilterType::Triangle,
        }
    }

    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }
}

impl Default for ImageCrateCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageCodec for ImageCrateCodec {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, CodecError> {
        image::load_from_memory(bytes)
            .map(DecodedImage::new)
            .map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn dimensions(&self, bytes: &[u8]) -> Result<(u32, u32), CodecError> {
        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .into_dimensions()
            .map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn encode_scaled(
        &self,
        image: &DecodedImage,
        mime_type: &str,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, CodecError> {
        let format = ImageFormat::from_mime_type(mime_type)
            .ok_or_else(|| CodecError::UnsupportedMimeType(mime_type.to_string()))?;

        let (width, height) = (width.max(1), height.max(1));
        let source = image.as_dynamic();
        let scaled = if (source.width(), source.height()) == (width, height) {
            source.clone()
        } else {
            source.resize_exact(width, height, self.filter)
        };

        // Formats without an alpha channel reject RGBA buffers
        let scaled = match format {
            ImageFormat::Jpeg | ImageFormat::Bmp => DynamicImage::ImageRgb8(scaled.to_rgb8()),
            _ => scaled,
        };

        let mut out = Cursor::new(Vec::new());
        scaled
            .write_to(&mut out, format)
            .map_err(|e| CodecError::Encode {
                mime_type: mime_type.to_string(),
                reason: e.to_string(),
            })?;
        Ok(out.into_inner())
    }
}
