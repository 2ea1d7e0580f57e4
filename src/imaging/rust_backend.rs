//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::load_from_memory` (format sniffed from bytes) |
//! | Crop | `DynamicImage::crop_imm` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` filter |
//! | Cover | fill-resize (`calculate_fill_dimensions`) + centered `crop_imm` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (quality-aware) |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |
//! | Encode → PNG, WebP, TIFF | `DynamicImage::write_to` (lossless) |

use super::backend::{BackendError, Canvas, ImageBackend};
use super::calculations::{calculate_fill_dimensions, center_crop};
use super::params::{CropRect, OutputFormat, Quality};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageResult};
use std::io::Cursor;

/// AVIF encoder speed (1 = slowest/best, 10 = fastest).
const AVIF_SPEED: u8 = 6;

impl Canvas for DynamicImage {
    fn width(&self) -> u32 {
        DynamicImage::width(self)
    }

    fn height(&self) -> u32 {
        DynamicImage::height(self)
    }

    fn crop(self, rect: CropRect) -> Self {
        self.crop_imm(rect.x, rect.y, rect.width, rect.height)
    }

    fn resize(self, width: u32, height: u32) -> Self {
        self.resize_exact(width, height, FilterType::Lanczos3)
    }

    fn cover(self, width: u32, height: u32) -> Self {
        let source = (DynamicImage::width(&self), DynamicImage::height(&self));
        let fill = calculate_fill_dimensions(source, (width, height));
        let filled = if fill == source {
            self
        } else {
            self.resize_exact(fill.0, fill.1, FilterType::Lanczos3)
        };
        let rect = center_crop(fill, (width, height));
        filled.crop_imm(rect.x, rect.y, rect.width, rect.height)
    }
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert to a pixel layout the target encoder accepts.
///
/// JPEG has no alpha channel; the WebP and AVIF encoders only take 8-bit
/// RGB(A). PNG and TIFF accept the decoded layout as-is.
fn prepare_for(image: &DynamicImage, format: OutputFormat) -> Option<DynamicImage> {
    match format {
        OutputFormat::Jpeg => Some(DynamicImage::ImageRgb8(image.to_rgb8())),
        OutputFormat::Webp | OutputFormat::Avif => Some(if image.color().has_alpha() {
            DynamicImage::ImageRgba8(image.to_rgba8())
        } else {
            DynamicImage::ImageRgb8(image.to_rgb8())
        }),
        OutputFormat::Png | OutputFormat::Tiff => None,
    }
}

fn write_encoded(
    image: &DynamicImage,
    format: OutputFormat,
    quality: Quality,
    out: &mut Cursor<Vec<u8>>,
) -> ImageResult<()> {
    let q = quality.value() as u8;
    match format {
        OutputFormat::Jpeg => image.write_with_encoder(JpegEncoder::new_with_quality(out, q)),
        OutputFormat::Avif => {
            image.write_with_encoder(AvifEncoder::new_with_speed_quality(out, AVIF_SPEED, q))
        }
        OutputFormat::Png => image.write_to(out, ImageFormat::Png),
        OutputFormat::Webp => image.write_to(out, ImageFormat::WebP),
        OutputFormat::Tiff => image.write_to(out, ImageFormat::Tiff),
    }
}

impl ImageBackend for RustBackend {
    type Image = DynamicImage;

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, BackendError> {
        image::load_from_memory(bytes).map_err(|e| BackendError::DecodeFailed(e.to_string()))
    }

    fn encode(
        &self,
        image: &DynamicImage,
        format: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, BackendError> {
        let converted = prepare_for(image, format);
        let image = converted.as_ref().unwrap_or(image);

        let mut out = Cursor::new(Vec::new());
        write_encoded(image, format, quality, &mut out).map_err(|e| {
            BackendError::EncodeFailed {
                format,
                message: e.to_string(),
            }
        })?;
        Ok(out.into_inner())
    }
}
