//! Thumbnail rendering for image attachments.

use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// Scales images down to fit a bounding box, preserving aspect ratio.
///
/// PNG and JPEG sources keep their format; anything else is re-encoded as PNG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailRenderer {
    max_width: u32,
    max_height: u32,
}

impl ThumbnailRenderer {
    pub fn new(max_width: u32, max_height: u32) -> Self {
        Self {
            max_width,
            max_height,
        }
    }

    pub fn render(&self, data: &[u8]) -> Result<Vec<u8>, image::ImageError> {
        let source_format = image::guess_format(data)?;
        let source = image::load_from_memory_with_format(data, source_format)?;

        let thumbnail = if source.width() <= self.max_width && source.height() <= self.max_height {
            source
        } else {
            source.thumbnail(self.max_width, self.max_height)
        };

        let mut out = Cursor::new(Vec::new());
        match source_format {
            ImageFormat::Jpeg => {
                // JPEG has no alpha channel
                DynamicImage::ImageRgb8(thumbnail.to_rgb8()).write_to(&mut out, ImageFormat::Jpeg)?
            }
            _ => thumbnail.write_to(&mut out, ImageFormat::Png)?,
        }
        Ok(out.into_inner())
    }
}

impl Default for ThumbnailRenderer {
    fn default() -> Self {
        use crate::constants::storage::{DEFAULT_THUMBNAIL_HEIGHT, DEFAULT_THUMBNAIL_WIDTH};
        Self::new(DEFAULT_THUMBNAIL_WIDTH, DEFAULT_THUMBNAIL_HEIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([200, 10, 10])));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_large_image_is_scaled_into_box() {
        let renderer = ThumbnailRenderer::new(100, 55);
        let thumb = renderer.render(&png_bytes(400, 400)).unwrap();

        let decoded = image::load_from_memory(&thumb).unwrap();
        assert!(decoded.width() <= 100);
        assert!(decoded.height() <= 55);
        assert_eq!(image::guess_format(&thumb).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn test_small_image_kept_as_is() {
        let renderer = ThumbnailRenderer::new(100, 55);
        let thumb = renderer.render(&png_bytes(20, 10)).unwrap();
        assert_eq!(image::load_from_memory(&thumb).unwrap().dimensions(), (20, 10));
    }

    #[test]
    fn test_non_image_bytes_fail() {
        let renderer = ThumbnailRenderer::default();
        assert!(renderer.render(b"definitely not an image").is_err());
    }
}
