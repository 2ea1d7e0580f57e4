//! Locating originals across an ordered list of search directories.
//!
//! Originals are looked up by name, never by absolute path. The same name may
//! exist in several directories (e.g. a public upload folder and a private
//! storage folder); the first configured directory that holds a regular file
//! of that name wins. Order is the caller's to decide, so a site can shadow
//! stock images with its own.
//!
//! Names must be relative paths made only of normal components. `..`, leading
//! `/`, drive prefixes and empty names are rejected before any directory is
//! touched, so a request can never read outside the search directories.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Invalid image filename: {0:?}")]
    InvalidFilename(String),
    #[error("Original image not found: {0}")]
    NotFound(String),
}

/// Check that `filename` is a plain relative path.
pub fn validate_filename(filename: &str) -> Result<&Path, ResolveError> {
    let path = Path::new(filename);
    let mut components = path.components().peekable();
    if components.peek().is_none() {
        return Err(ResolveError::InvalidFilename(filename.to_string()));
    }
    if components.all(|c| matches!(c, Component::Normal(_))) {
        Ok(path)
    } else {
        Err(ResolveError::InvalidFilename(filename.to_string()))
    }
}

/// Ordered search over original-image directories.
#[derive(Debug, Clone)]
pub struct OriginalResolver {
    paths: Vec<PathBuf>,
}

impl OriginalResolver {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    /// Search directories in priority order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Path of the first regular file named `filename`.
    pub fn resolve(&self, filename: &str) -> Result<PathBuf, ResolveError> {
        let relative = validate_filename(filename)?;

        for dir in &self.paths {
            let candidate = dir.join(relative);
            if candidate.is_file() {
                tracing::debug!(filename, path = %candidate.display(), "original resolved");
                return Ok(candidate);
            }
            tracing::trace!(filename, dir = %dir.display(), "original not in search dir");
        }

        Err(ResolveError::NotFound(filename.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn dirs(tmp: &TempDir, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|n| {
                let d = tmp.path().join(n);
                fs::create_dir_all(&d).unwrap();
                d
            })
            .collect()
    }

    // =========================================================================
    // Filename validation
    // =========================================================================

    #[test]
    fn plain_names_are_valid() {
        assert!(validate_filename("photo.jpg").is_ok());
        assert!(validate_filename("albums/2024/photo.jpg").is_ok());
    }

    #[test]
    fn traversal_is_rejected() {
        for bad in ["../secret.jpg", "a/../../b.jpg", "/etc/passwd", "./x.jpg", ""] {
            assert!(
                matches!(validate_filename(bad), Err(ResolveError::InvalidFilename(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    // =========================================================================
    // Resolution order
    // =========================================================================

    #[test]
    fn first_directory_wins() {
        let tmp = TempDir::new().unwrap();
        let paths = dirs(&tmp, &["public", "storage"]);
        fs::write(paths[0].join("same.jpg"), "first").unwrap();
        fs::write(paths[1].join("same.jpg"), "second").unwrap();

        let resolver = OriginalResolver::new(paths.clone());
        let found = resolver.resolve("same.jpg").unwrap();
        assert_eq!(found, paths[0].join("same.jpg"));
        assert_eq!(fs::read_to_string(found).unwrap(), "first");
    }

    #[test]
    fn falls_through_to_later_directory() {
        let tmp = TempDir::new().unwrap();
        let paths = dirs(&tmp, &["public", "storage"]);
        fs::write(paths[1].join("only-here.png"), "x").unwrap();

        let resolver = OriginalResolver::new(paths.clone());
        assert_eq!(
            resolver.resolve("only-here.png").unwrap(),
            paths[1].join("only-here.png")
        );
    }

    #[test]
    fn directories_with_the_name_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let paths = dirs(&tmp, &["public", "storage"]);
        fs::create_dir_all(paths[0].join("photo.jpg")).unwrap();
        fs::write(paths[1].join("photo.jpg"), "x").unwrap();

        let resolver = OriginalResolver::new(paths.clone());
        assert_eq!(
            resolver.resolve("photo.jpg").unwrap(),
            paths[1].join("photo.jpg")
        );
    }

    #[test]
    fn nested_names_resolve() {
        let tmp = TempDir::new().unwrap();
        let paths = dirs(&tmp, &["public"]);
        fs::create_dir_all(paths[0].join("albums")).unwrap();
        fs::write(paths[0].join("albums/a.jpg"), "x").unwrap();

        let resolver = OriginalResolver::new(paths.clone());
        assert_eq!(
            resolver.resolve("albums/a.jpg").unwrap(),
            paths[0].join("albums/a.jpg")
        );
    }

    #[test]
    fn missing_everywhere_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let resolver = OriginalResolver::new(dirs(&tmp, &["a", "b"]));
        assert!(matches!(
            resolver.resolve("nope.jpg"),
            Err(ResolveError::NotFound(name)) if name == "nope.jpg"
        ));
    }

    #[test]
    fn missing_search_directory_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let present = dirs(&tmp, &["present"]);
        fs::write(present[0].join("x.jpg"), "x").unwrap();

        let resolver =
            OriginalResolver::new(vec![tmp.path().join("does-not-exist"), present[0].clone()]);
        assert!(resolver.resolve("x.jpg").is_ok());
    }
}
