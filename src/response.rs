//! Transport-free half of an HTTP image endpoint.
//!
//! An HTTP layer calls [`ImageCache::get_cached_image`](crate::image_cache::ImageCache::get_cached_image),
//! turns the path into an [`ImageResponse`], and maps
//! [`CacheError::is_not_found`](crate::image_cache::CacheError::is_not_found)
//! errors to 404. Cached derivatives never change under a given path, so
//! responses are marked cacheable for a year.

use crate::imaging::OutputFormat;
use std::fs;
use std::io;
use std::path::Path;

/// `Cache-Control` value sent with every derivative.
pub const CACHE_CONTROL: &str = "public, max-age=31536000";

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Body and headers for one derivative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResponse {
    pub body: Vec<u8>,
    pub content_type: &'static str,
    pub cache_control: &'static str,
}

impl ImageResponse {
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let body = fs::read(path)?;
        Ok(Self {
            body,
            content_type: content_type(path),
            cache_control: CACHE_CONTROL,
        })
    }
}

/// MIME type implied by a file's extension.
pub fn content_type(path: &Path) -> &'static str {
    OutputFormat::from_path(path)
        .map(OutputFormat::mime_type)
        .unwrap_or(FALLBACK_CONTENT_TYPE)
}
