//! Image processing backend traits and shared types.
//!
//! The cache never touches pixels itself. It talks to a codec through two
//! traits:
//!
//! - [`Canvas`]: a decoded image: report its size, crop, resize, cover.
//! - [`ImageBackend`]: turns bytes into a [`Canvas`] and back.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), pure Rust and built on the
//! `image` crate. Tests use the dimension-only `MockBackend` below.

use super::params::{CropRect, OutputFormat, Quality};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to decode image: {0}")]
    DecodeFailed(String),
    #[error("Failed to encode {format}: {message}")]
    EncodeFailed {
        format: OutputFormat,
        message: String,
    },
}

/// Image size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl From<Dimensions> for (u32, u32) {
    fn from(d: Dimensions) -> Self {
        (d.width, d.height)
    }
}

/// A decoded image that geometry strategies can transform.
///
/// Every operation consumes the image and returns the transformed one, so
/// strategies can chain them without cloning pixel buffers.
pub trait Canvas: Sized {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width(),
            height: self.height(),
        }
    }

    /// Cut out `rect`, which is guaranteed to lie inside the image.
    fn crop(self, rect: CropRect) -> Self;

    /// Resample to exactly `width` x `height`.
    fn resize(self, width: u32, height: u32) -> Self;

    /// Scale to fill `width` x `height`, then center-crop to exactly that size.
    fn cover(self, width: u32, height: u32) -> Self;
}

/// Codec capability: decode bytes into a [`Canvas`] and encode it back.
///
/// `Sync` so one backend can be shared across worker threads.
pub trait ImageBackend: Sync {
    type Image: Canvas;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Image, BackendError>;

    fn encode(
        &self,
        image: &Self::Image,
        format: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, BackendError>;
}
