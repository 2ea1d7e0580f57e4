//! Cache keys, on-disk layout, freshness, and maintenance.
//!
//! The cache has no index. Each derivative is a plain image file whose path
//! is a pure function of the request, and whose modification time is the only
//! metadata. Everything in this module is either a pure function or a plain
//! filesystem query; the state machine that ties it together lives in
//! [`image_cache`](crate::image_cache).
//!
//! # Cache keys
//!
//! The cache is **request-addressed**: lookups are by what was asked for, not
//! by source content. The key is the SHA-256 of:
//!
//! - the template name and its canonical definition (`large:1600x900`), so
//!   reconfiguring a template's bounds moves it to fresh keys,
//! - the original's filename,
//! - the normalized `max_width`, `max_height` and canonical `coords`.
//!
//! Each field is length-prefixed and absent values are tagged, so no two
//! distinct inputs share an encoding.
//!
//! # Layout
//!
//! ```text
//! <cache_root>/
//! ├── large/
//! │   └── dawn-3f9a…c2.jpg        # <stem>-<key>.<ext>
//! └── thumbnail/
//!     └── dawn-81be…07.jpg
//! ```
//!
//! The stem keeps paths human-debuggable; the key keeps them unique.
//!
//! # Freshness
//!
//! An entry is fresh while `now - mtime < lifetime`. A modification time in
//! the future (clock skew, restored backups) counts as age zero.

use crate::imaging::OutputFormat;
use crate::params::TemplateParams;
use crate::templates::Template;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

/// Version tag hashed into every key. Bump to orphan all existing entries
/// when the key encoding changes.
const KEY_VERSION: &[u8] = b"imgcache-key-v1\0";

/// Length of a hex-encoded key.
pub const KEY_LEN: usize = 64;

/// Stem used when a filename has none (e.g. `.png`).
const FALLBACK_STEM: &str = "image";

fn update_field(hasher: &mut Sha256, value: &[u8]) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value);
}

fn update_optional(hasher: &mut Sha256, value: Option<&[u8]>) {
    match value {
        Some(bytes) => {
            hasher.update(b"\x01");
            update_field(hasher, bytes);
        }
        None => hasher.update(b"\x00"),
    }
}

/// SHA-256 key for one derivative, as 64 hex characters.
pub fn derive_key(
    template_name: &str,
    template: &Template,
    filename: &str,
    params: &TemplateParams,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(KEY_VERSION);
    update_field(&mut hasher, template_name.as_bytes());
    update_field(&mut hasher, template.to_string().as_bytes());
    update_field(&mut hasher, filename.as_bytes());
    update_optional(
        &mut hasher,
        params.max_width.map(u32::to_le_bytes).as_ref().map(|b| &b[..]),
    );
    update_optional(
        &mut hasher,
        params.max_height.map(u32::to_le_bytes).as_ref().map(|b| &b[..]),
    );
    update_optional(
        &mut hasher,
        params.coords.map(|c| c.to_string()).as_deref().map(str::as_bytes),
    );
    format!("{:x}", hasher.finalize())
}

/// Where derivatives live and what format they are written in.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
    format: Option<OutputFormat>,
}

impl CacheLayout {
    /// `format: None` keeps each original's own format.
    pub fn new(root: impl Into<PathBuf>, format: Option<OutputFormat>) -> Self {
        Self {
            root: root.into(),
            format,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Encoded format for a derivative of `filename`.
    ///
    /// The configured format wins; otherwise the original's extension, with
    /// JPEG for extensions that cannot be encoded.
    pub fn output_format(&self, filename: &str) -> OutputFormat {
        self.format
            .or_else(|| OutputFormat::from_path(Path::new(filename)))
            .unwrap_or(OutputFormat::Jpeg)
    }

    /// `<root>/<template>/<stem>-<key>.<ext>`
    pub fn derive_path(&self, template_name: &str, filename: &str, key: &str) -> PathBuf {
        let stem = Path::new(filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| FALLBACK_STEM.to_string());
        let ext = self.output_format(filename).extension();
        self.root
            .join(template_name)
            .join(format!("{stem}-{key}.{ext}"))
    }
}

/// State of a cache file relative to its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Missing,
    Fresh,
    Stale,
}

/// Check whether the file at `path` is still within `lifetime`.
pub fn freshness(path: &Path, lifetime: Duration, now: SystemTime) -> Freshness {
    let metadata = match std::fs::metadata(path) {
        Ok(m) if m.is_file() => m,
        _ => return Freshness::Missing,
    };
    let Ok(modified) = metadata.modified() else {
        return Freshness::Stale;
    };
    let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
    if age < lifetime {
        Freshness::Fresh
    } else {
        Freshness::Stale
    }
}

/// How a request was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Fresh entry served from disk.
    Hit,
    /// No entry existed; generated.
    Miss,
    /// Entry had expired; regenerated.
    Stale,
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CacheStatus::Hit => "cached",
            CacheStatus::Miss => "generated",
            CacheStatus::Stale => "regenerated",
        })
    }
}

/// Summary of cache performance for a batch of requests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub stale: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn record(&mut self, status: CacheStatus) {
        match status {
            CacheStatus::Hit => self.hits += 1,
            CacheStatus::Stale => self.stale += 1,
            CacheStatus::Miss => self.misses += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.hits + self.stale + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 || self.stale > 0 {
            if self.stale > 0 {
                write!(
                    f,
                    "{} cached, {} regenerated, {} generated ({} total)",
                    self.hits,
                    self.stale,
                    self.misses,
                    self.total()
                )
            } else {
                write!(
                    f,
                    "{} cached, {} generated ({} total)",
                    self.hits,
                    self.misses,
                    self.total()
                )
            }
        } else {
            write!(f, "{} generated", self.misses)
        }
    }
}

// ============================================================================
// Maintenance
// ============================================================================

/// Result of [`purge`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeStats {
    pub files: u64,
    pub bytes: u64,
}

/// Delete every cached derivative under `root`.
///
/// Emptied subdirectories are removed; `root` itself is kept. A missing root
/// is an empty cache, not an error.
pub fn purge(root: &Path) -> io::Result<PurgeStats> {
    let mut stats = PurgeStats::default();
    if !root.exists() {
        return Ok(stats);
    }

    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            // Concurrent writers may have repopulated it; leave it then.
            std::fs::remove_dir(entry.path()).ok();
        } else {
            let bytes = entry.metadata()?.len();
            std::fs::remove_file(entry.path())?;
            stats.files += 1;
            stats.bytes += bytes;
        }
    }

    tracing::info!(root = %root.display(), files = stats.files, bytes = stats.bytes, "cache purged");
    Ok(stats)
}

/// Disk usage of one template's directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateUsage {
    pub template: String,
    pub files: u64,
    pub bytes: u64,
}

/// Per-template disk usage, sorted by template name.
///
/// Files sitting directly in the root are reported under `"(root)"`.
pub fn usage(root: &Path) -> io::Result<Vec<TemplateUsage>> {
    let mut totals: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    if !root.exists() {
        return Ok(Vec::new());
    }

    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let template = match entry.depth() {
            1 => "(root)".to_string(),
            _ => entry
                .path()
                .strip_prefix(root)
                .ok()
                .and_then(|rel| rel.components().next())
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let slot = totals.entry(template).or_default();
        slot.0 += 1;
        slot.1 += entry.metadata()?.len();
    }

    Ok(totals
        .into_iter()
        .map(|(template, (files, bytes))| TemplateUsage {
            template,
            files,
            bytes,
        })
        .collect())
}
