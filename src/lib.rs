//! # imgcache
//!
//! An on-demand image derivative cache. Ask for `(template, filename,
//! params)` and get back the path of a resized or cropped copy of the
//! original, generated on first request and served from disk after that.
//!
//! # Architecture
//!
//! ```text
//! caller ──▶ ImageCache ──▶ derive key/path ──▶ fresh? ──▶ path
//!                │
//!                └─ miss/stale ─▶ resolve original ─▶ decode ─▶ Template::apply
//!                                                          ─▶ encode ─▶ atomic write ─▶ path
//! ```
//!
//! There is no database. A derivative's path is a pure function of the
//! request and its modification time is the only metadata, so the cache can
//! be inspected, copied or wiped with ordinary file tools.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`image_cache`] | The orchestrator: hit/miss/stale state machine, per-key single-flight, atomic writes |
//! | [`cache`] | Cache keys, path layout, freshness, purge and usage |
//! | [`templates`] | The four geometry strategies and the name → template registry |
//! | [`params`] | Raw request parameters and their normalized form |
//! | [`resolver`] | Finds originals across ordered search directories |
//! | [`imaging`] | Pure dimension math plus the `ImageBackend`/`Canvas` codec seam |
//! | [`response`] | Content type and cache headers for serving a derivative |
//! | [`config`] | `imgcache.toml` loading, merging, and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Request-Addressed Keys
//!
//! Keys hash the request (template name and definition, filename, normalized
//! params), not the original's bytes. A hit never touches the original, which
//! is what makes hits cheap. The cost is that replacing an original in place
//! is only picked up once the entry expires or the cache is purged.
//!
//! Because the template's definition is part of the key, changing a
//! template's bounds in config moves it to new keys and old entries simply
//! age out.
//!
//! ## Lenient Parameters
//!
//! Non-positive widths and malformed coords are treated as "not supplied"
//! rather than rejected. A derivative URL with a typo still produces an
//! image, and every spelling of the same logical request shares one entry.
//!
//! ## Closed Template Set
//!
//! Templates are an enum, not a trait object. The four strategies share
//! nearly all of their math, and keeping the planning step a pure function
//! ([`templates::Template::plan`]) lets every geometry rule be tested without
//! pixels.
//!
//! ## Pure-Rust Imaging
//!
//! The production backend uses the `image` crate (Lanczos3 resampling, with
//! `rav1e` behind it for AVIF). No ImageMagick, no system libraries.

pub mod cache;
pub mod config;
pub mod image_cache;
pub mod imaging;
pub mod output;
pub mod params;
pub mod resolver;
pub mod response;
pub mod templates;

#[cfg(test)]
pub(crate) mod test_helpers;
