//! Shared test utilities for the imgcache test suite.
//!
//! Builds an isolated cache layout in a temp directory and writes mock
//! originals that [`MockBackend`](crate::imaging::backend::tests::MockBackend)
//! can decode.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let fx = Fixture::new();
//! fx.original("public", "dawn.jpg", 2000, 1000);
//! let cache = fx.cache(MockBackend::new());
//!
//! let path = cache.get_cached_image("large", "dawn.jpg", &RequestParams::new()).unwrap();
//! assert_eq!(read_dimensions(&path), (1600, 800));
//! ```

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use crate::config::CacheConfig;
use crate::image_cache::ImageCache;
use crate::imaging::ImageBackend;
use crate::imaging::backend::tests::MockImage;

// =========================================================================
// Fixture setup
// =========================================================================

/// Temp directory with `public/` and `storage/` search dirs and a config
/// pointing at them. The cache root (`cache/`) is not created up front.
pub struct Fixture {
    pub tmp: TempDir,
    pub config: CacheConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let public = tmp.path().join("public");
        let storage = tmp.path().join("storage");
        fs::create_dir_all(&public).unwrap();
        fs::create_dir_all(&storage).unwrap();

        let config = CacheConfig {
            cache_path: tmp.path().join("cache"),
            lifetime: 60,
            paths: vec![public, storage],
            ..CacheConfig::default()
        };
        Self { tmp, config }
    }

    pub fn dir(&self, name: &str) -> PathBuf {
        self.tmp.path().join(name)
    }

    pub fn cache_root(&self) -> PathBuf {
        self.config.cache_path.clone()
    }

    /// Write a mock original of the given size into `dir` (`public` or `storage`).
    pub fn original(&self, dir: &str, name: &str, width: u32, height: u32) -> PathBuf {
        write_original(&self.dir(dir), name, width, height)
    }

    pub fn cache<B: ImageBackend>(&self, backend: B) -> ImageCache<B> {
        ImageCache::new(&self.config, backend)
    }
}

// =========================================================================
// File helpers
// =========================================================================

/// Write a `"WxH"` mock image at `dir/name`, creating parent directories.
pub fn write_original(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, MockImage::new(width, height).to_bytes()).unwrap();
    path
}

/// Dimensions of a mock image written by the cache.
pub fn read_dimensions(path: &Path) -> (u32, u32) {
    let image = MockImage::parse(&fs::read(path).unwrap())
        .unwrap_or_else(|| panic!("{} is not a mock image", path.display()));
    (image.width, image.height)
}

/// Push a file's modification time `by` into the past.
pub fn age(path: &Path, by: Duration) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - by).unwrap();
}
