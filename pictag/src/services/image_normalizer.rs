//! Image decoding and normalization for inference input
//!
//! Source images arrive in any supported format and size; the model and
//! the thumbnail store both want bounded JPEG. Decode once, then encode
//! per bound (inference and thumbnail use different dimensions).

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::path::Path;

/// Bounded JPEG output of a normalization pass
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub jpeg_bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Image decoder and resizer
#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    jpeg_quality: u8,
}

impl ImageNormalizer {
    pub fn new(jpeg_quality: u8) -> Self {
        Self { jpeg_quality }
    }

    /// Decode a source image from disk
    pub fn decode(&self, path: &Path) -> image::ImageResult<DynamicImage> {
        image::open(path)
    }

    /// Bound an image to `max_dimension` and re-encode as JPEG
    ///
    /// Pixel dimensions pass through unchanged when both already fit;
    /// otherwise the longest edge is scaled down to `max_dimension`,
    /// preserving aspect ratio. Never upscales.
    pub fn normalize(
        &self,
        image: &DynamicImage,
        max_dimension: u32,
    ) -> image::ImageResult<NormalizedImage> {
        let max_dimension = max_dimension.max(1);
        let (width, height) = image.dimensions();
        let longest_edge = width.max(height);

        let resized;
        let bounded = if longest_edge > max_dimension {
            let scale = max_dimension as f32 / longest_edge as f32;
            let target_width = ((width as f32 * scale).round() as u32).max(1);
            let target_height = ((height as f32 * scale).round() as u32).max(1);
            resized = image.resize(target_width, target_height, FilterType::CatmullRom);
            &resized
        } else {
            image
        };

        let (final_width, final_height) = bounded.dimensions();

        // JPEG has no alpha channel, so flatten before encoding
        let rgb = DynamicImage::ImageRgb8(bounded.to_rgb8());
        let mut jpeg_bytes = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg_bytes, self.jpeg_quality);
        encoder.encode_image(&rgb)?;

        Ok(NormalizedImage {
            jpeg_bytes,
            width: final_width,
            height: final_height,
        })
    }
}
