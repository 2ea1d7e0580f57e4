//! Cache configuration module.
//!
//! Handles loading, validating, and merging `imgcache.toml`. Stock defaults
//! are serialized to a TOML table and the user file is merged on top of it
//! key-by-key, so a config file only needs the values it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! cache_path = "storage/cache/images"          # Derivative cache root
//! lifetime = 43200                             # Minutes before an entry is stale
//! max_edge = 4096                              # Largest edge a request may ask for
//! paths = ["public/images", "storage/images"]  # Original search order
//!
//! [output]
//! # format = "webp"   # Force an output format (omit = keep source format)
//! quality = 90        # Lossy encoder quality (1-100)
//!
//! [processing]
//! max_processes = 4   # Max parallel workers for `warm` (omit for auto = CPU cores)
//!
//! [templates.large]
//! kind = "large"      # crop | large | small | thumbnail
//! max_width = 1600
//! max_height = 900
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse. Override one template's bounds:
//!
//! ```toml
//! [templates.thumbnail]
//! max_width = 150
//! ```
//!
//! or register a new name for an existing strategy:
//!
//! ```toml
//! [templates.hero]
//! kind = "large"
//! max_width = 2400
//! max_height = 1200
//! ```
//!
//! Relative paths are resolved against the working directory. Unknown keys
//! are rejected to catch typos early.

use crate::cache::CacheLayout;
use crate::imaging::{OutputFormat, Quality};
use crate::resolver::OriginalResolver;
use crate::templates::{Template, TemplateKind, TemplateRegistry, is_single_component};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "imgcache.toml";

/// Default upper limit for requested derivative edges.
pub const DEFAULT_MAX_EDGE: u32 = 4096;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Cache configuration loaded from `imgcache.toml`.
///
/// All fields have defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Root directory for cached derivatives.
    pub cache_path: PathBuf,
    /// Entry lifetime in minutes.
    pub lifetime: u64,
    /// Directories searched for originals, in priority order.
    pub paths: Vec<PathBuf>,
    /// Upper limit in pixels for any requested width, height or thumbnail size.
    pub max_edge: u32,
    /// Encoder settings.
    pub output: OutputConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
    /// Template name → strategy and bounds.
    pub templates: BTreeMap<String, TemplateConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let templates = [
            TemplateKind::Crop,
            TemplateKind::Large,
            TemplateKind::Small,
            TemplateKind::Thumbnail,
        ]
        .into_iter()
        .map(|kind| (kind.as_str().to_string(), TemplateConfig::stock(kind)))
        .collect();

        Self {
            cache_path: PathBuf::from("storage/cache/images"),
            lifetime: 43_200,
            paths: vec![
                PathBuf::from("public/images"),
                PathBuf::from("storage/images"),
            ],
            max_edge: DEFAULT_MAX_EDGE,
            output: OutputConfig::default(),
            processing: ProcessingConfig::default(),
            templates,
        }
    }
}

impl CacheConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "cache_path must not be empty".into(),
            ));
        }
        if self.paths.is_empty() {
            return Err(ConfigError::Validation(
                "paths must list at least one directory".into(),
            ));
        }
        if !(1..=100).contains(&self.output.quality) {
            return Err(ConfigError::Validation(
                "output.quality must be 1-100".into(),
            ));
        }
        if self.max_edge == 0 {
            return Err(ConfigError::Validation("max_edge must be positive".into()));
        }
        for (name, template) in &self.templates {
            if !is_single_component(name) {
                return Err(ConfigError::Validation(format!(
                    "template name {name:?} must be a single path component"
                )));
            }
            let oversized = [template.max_width, template.max_height]
                .into_iter()
                .flatten()
                .any(|bound| bound > i64::from(self.max_edge));
            if oversized {
                return Err(ConfigError::Validation(format!(
                    "templates.{name} bounds must not exceed max_edge ({})",
                    self.max_edge
                )));
            }
        }
        Ok(())
    }

    /// Entry lifetime as a [`Duration`].
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime.saturating_mul(60))
    }

    /// Build the template registry from `[templates.*]`.
    ///
    /// Names are checked by [`validate`](Self::validate); any that would
    /// escape the cache root are skipped.
    pub fn template_registry(&self) -> TemplateRegistry {
        let mut registry = TemplateRegistry::new();
        for (name, template) in &self.templates {
            if let Err(e) = registry.register(name.clone(), template.template()) {
                tracing::warn!(error = %e, "skipping template");
            }
        }
        registry
    }

    pub fn resolver(&self) -> OriginalResolver {
        OriginalResolver::new(self.paths.clone())
    }

    pub fn layout(&self) -> CacheLayout {
        CacheLayout::new(self.cache_path.clone(), self.output.format)
    }
}

/// Encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Force every derivative into one format. `None` keeps the source format.
    pub format: Option<OutputFormat>,
    /// Quality for lossy encoders.
    pub quality: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: None,
            quality: 90,
        }
    }
}

impl OutputConfig {
    pub fn quality(&self) -> Quality {
        Quality::new(self.quality)
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// One `[templates.NAME]` table.
///
/// `kind` is required for new names; stock names inherit it from the
/// defaults layer. Non-positive bounds fall back to the kind's defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateConfig {
    pub kind: TemplateKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_height: Option<i64>,
}

impl TemplateConfig {
    pub fn stock(kind: TemplateKind) -> Self {
        Self {
            kind,
            max_width: None,
            max_height: None,
        }
    }

    pub fn template(&self) -> Template {
        Template::new(self.kind, self.max_width, self.max_height)
    }
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(CacheConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<CacheConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: CacheConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. A missing file yields the stock defaults.
pub fn load_config(path: &Path) -> Result<CacheConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    if overlay.is_none() {
        tracing::debug!(path = %path.display(), "no config file, using stock defaults");
    }
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `imgcache.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# imgcache Configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Relative paths are resolved against the working directory.
# Unknown keys will cause an error.

# Root directory for cached derivatives. Each template gets a subdirectory.
cache_path = "storage/cache/images"

# Minutes a derivative stays fresh. After that the next request regenerates
# it from the original. 0 regenerates on every request.
lifetime = 43200

# Directories searched for originals, first match wins.
paths = ["public/images", "storage/images"]

# Largest width, height or thumbnail size a request may ask for, in pixels.
# Larger requested values are clamped to this. Template bounds must not
# exceed it.
max_edge = 4096

# ---------------------------------------------------------------------------
# Encoding
# ---------------------------------------------------------------------------
[output]
# Force every derivative into one format: jpeg, png, webp, avif or tiff.
# When omitted, derivatives keep the original's format (JPEG if unknown).
# format = "webp"

# Quality for lossy encoders (JPEG, WebP, AVIF), 1-100.
quality = 90

# ---------------------------------------------------------------------------
# Parallel processing
# ---------------------------------------------------------------------------
[processing]
# Maximum number of parallel workers used by `imgcache warm`.
# When omitted, defaults to the number of CPU cores.
# Values larger than the core count are clamped down.
# max_processes = 4

# ---------------------------------------------------------------------------
# Templates
# ---------------------------------------------------------------------------
# Each [templates.NAME] table registers NAME with one of four strategies:
#
#   crop       Optional crop from request coords, then optional width/height
#              constraint. Bounds below are defaults for requests that
#              supply none.
#   large      Fit within max_width x max_height (default 1600x900).
#   small      Fit within max_width x max_height (default 800x450).
#   thumbnail  Fill and center-crop to a square of max_width (default 300).
#
# Per-request max_width/max_height override these bounds. Images are never
# upscaled, except that thumbnails always come out at their exact size.

[templates.crop]
kind = "crop"

[templates.large]
kind = "large"
# max_width = 1600
# max_height = 900

[templates.small]
kind = "small"
# max_width = 800
# max_height = 450

[templates.thumbnail]
kind = "thumbnail"
# max_width = 300
"##
}
