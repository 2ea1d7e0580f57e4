//! The cache orchestrator.
//!
//! [`ImageCache`] ties the pieces together. For one request it:
//!
//! 1. looks up the template (unknown names are a hard error),
//! 2. validates the filename and normalizes the parameters,
//! 3. derives the key and cache path,
//! 4. serves the file if it exists and is younger than the lifetime,
//! 5. otherwise takes the per-key lock, re-checks, resolves the original,
//!    decodes, applies the template, encodes and writes atomically.
//!
//! ```text
//!            ┌──────────┐  fresh   ┌─────┐
//! request ──▶│ derive   │────────▶│ HIT │
//!            │ key/path │          └─────┘
//!            └────┬─────┘
//!                 │ missing / stale
//!                 ▼
//!        ┌─────────────────┐  fresh now   ┌─────┐
//!        │ per-key lock +  │────────────▶│ HIT │
//!        │ re-check        │              └─────┘
//!        └───────┬─────────┘
//!                ▼
//!   resolve → decode → apply → encode → temp file → rename
//! ```
//!
//! Nothing is ever deleted here and originals are only read. A failed
//! generation leaves whatever was on disk before (missing or stale) so the
//! next request retries.
//!
//! ## Concurrency
//!
//! `ImageCache` is `Sync` and meant to be shared by reference. Concurrent
//! misses for the same key are collapsed: one thread generates, the others
//! wait on the key's lock and then find a fresh file. Locks live in a table
//! of weak references, so a key's lock disappears once nobody holds it.

use crate::cache::{CacheLayout, CacheStatus, Freshness, derive_key, freshness};
use crate::config::CacheConfig;
use crate::imaging::{BackendError, ImageBackend, Quality};
use crate::params::RequestParams;
use crate::resolver::{OriginalResolver, ResolveError, validate_filename};
use crate::templates::{TemplateRegistry, UnknownTemplate};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, SystemTime};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error(transparent)]
    UnknownTemplate(#[from] UnknownTemplate),
    #[error("Invalid image filename: {0:?}")]
    InvalidFilename(String),
    #[error("Original image not found: {0}")]
    OriginalNotFound(String),
    #[error("Storage error at {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Image processing failed: {0}")]
    Backend(#[from] BackendError),
}

impl CacheError {
    /// Errors an HTTP layer should answer with 404.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CacheError::UnknownTemplate(_)
                | CacheError::InvalidFilename(_)
                | CacheError::OriginalNotFound(_)
        )
    }

    fn storage(path: &Path, source: io::Error) -> Self {
        CacheError::Storage {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<ResolveError> for CacheError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::InvalidFilename(name) => CacheError::InvalidFilename(name),
            ResolveError::NotFound(name) => CacheError::OriginalNotFound(name),
        }
    }
}

/// Result of one successful lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheOutcome {
    pub path: PathBuf,
    pub key: String,
    pub status: CacheStatus,
}

/// One mutex per cache key currently being generated.
#[derive(Debug, Default)]
struct KeyLocks {
    locks: Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl KeyLocks {
    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.get(key).and_then(Weak::upgrade) {
            return lock;
        }
        locks.retain(|_, weak| weak.strong_count() > 0);
        let lock = Arc::new(Mutex::new(()));
        locks.insert(key.to_string(), Arc::downgrade(&lock));
        lock
    }

    #[cfg(test)]
    fn live(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.values().filter(|w| w.strong_count() > 0).count()
    }
}

/// On-demand derivative cache over an [`ImageBackend`].
pub struct ImageCache<B: ImageBackend> {
    registry: TemplateRegistry,
    resolver: OriginalResolver,
    layout: CacheLayout,
    lifetime: Duration,
    quality: Quality,
    max_edge: u32,
    backend: B,
    locks: KeyLocks,
}

impl<B: ImageBackend> ImageCache<B> {
    pub fn new(config: &CacheConfig, backend: B) -> Self {
        Self::from_parts(
            config.template_registry(),
            config.resolver(),
            config.layout(),
            config.lifetime(),
            config.output.quality(),
            config.max_edge,
            backend,
        )
    }

    /// `max_edge` clamps every requested width, height and thumbnail size.
    pub fn from_parts(
        registry: TemplateRegistry,
        resolver: OriginalResolver,
        layout: CacheLayout,
        lifetime: Duration,
        quality: Quality,
        max_edge: u32,
        backend: B,
    ) -> Self {
        Self {
            registry,
            resolver,
            layout,
            lifetime,
            quality,
            max_edge,
            backend,
            locks: KeyLocks::default(),
        }
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Path of a fresh derivative, generating it if needed.
    pub fn get_cached_image(
        &self,
        template: &str,
        filename: &str,
        params: &RequestParams,
    ) -> Result<PathBuf, CacheError> {
        self.fetch(template, filename, params).map(|o| o.path)
    }

    /// Like [`get_cached_image`](Self::get_cached_image), reporting whether
    /// the file was served, generated or regenerated.
    pub fn fetch(
        &self,
        template_name: &str,
        filename: &str,
        params: &RequestParams,
    ) -> Result<CacheOutcome, CacheError> {
        let template = self.registry.get(template_name)?;
        validate_filename(filename)?;
        let params = template
            .effective_params(&params.normalize())
            .capped(self.max_edge);

        let key = derive_key(template_name, template, filename, &params);
        let path = self.layout.derive_path(template_name, filename, &key);

        let status = match freshness(&path, self.lifetime, SystemTime::now()) {
            Freshness::Fresh => {
                tracing::debug!(template = template_name, filename, %key, "cache hit");
                return Ok(CacheOutcome {
                    path,
                    key,
                    status: CacheStatus::Hit,
                });
            }
            Freshness::Stale => CacheStatus::Stale,
            Freshness::Missing => CacheStatus::Miss,
        };

        let lock = self.locks.lock_for(&key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if freshness(&path, self.lifetime, SystemTime::now()) == Freshness::Fresh {
            tracing::debug!(
                template = template_name,
                filename,
                %key,
                "cache hit after waiting for generation"
            );
            return Ok(CacheOutcome {
                path,
                key,
                status: CacheStatus::Hit,
            });
        }

        let original = self.resolver.resolve(filename)?;
        let bytes = fs::read(&original).map_err(|e| CacheError::storage(&original, e))?;
        let image = self.backend.decode(&bytes)?;
        let image = template.apply(image, &params);

        let format = self.layout.output_format(filename);
        let encoded = self.backend.encode(&image, format, self.quality)?;

        if let Err(e) = write_atomic(&path, &encoded) {
            tracing::warn!(path = %path.display(), error = %e, "failed to write derivative");
            return Err(CacheError::storage(&path, e));
        }

        tracing::info!(
            template = template_name,
            filename,
            %key,
            status = %status,
            bytes = encoded.len(),
            "derivative written"
        );

        Ok(CacheOutcome { path, key, status })
    }

    /// Fetch many originals through one template in parallel.
    ///
    /// Runs on the current rayon pool. Results keep the input order.
    pub fn fetch_many<S>(
        &self,
        template: &str,
        filenames: &[S],
        params: &RequestParams,
    ) -> Vec<Result<CacheOutcome, CacheError>>
    where
        S: AsRef<str> + Sync,
    {
        filenames
            .par_iter()
            .map(|filename| self.fetch(template, filename.as_ref(), params))
            .collect()
    }
}

/// Write `bytes` to `path` through a temp file in the same directory, so
/// readers see either the old file or the complete new one.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "cache path has no parent"))?;
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".imgcache-")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
