//! CLI output formatting for all subcommands.
//!
//! # Information-First Display
//!
//! Every line leads with what the user asked about (the original's filename,
//! the template name) and shows cache paths as secondary context, relative to
//! the cache root when possible.
//!
//! # Output Format
//!
//! ## Warm
//!
//! ```text
//! 001 dawn.jpg → large/dawn-3f9a…c2.jpg (generated)
//! 002 dusk.jpg → large/dusk-81be…07.jpg (cached)
//! 003 gone.jpg
//!     Error: Original image not found: gone.jpg
//!
//! 1 cached, 1 generated (2 total), 1 failed
//! ```
//!
//! ## Stats
//!
//! ```text
//! large          12 files    3.4 MB
//! thumbnail      40 files  812.0 KB
//! total          52 files    4.2 MB
//! ```
//!
//! ## Templates
//!
//! ```text
//! crop       crop:*x*
//! large      large:1600x900
//! ```
//!
//! # Architecture
//!
//! Each subcommand has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::cache::{CacheStats, PurgeStats, TemplateUsage};
use crate::image_cache::{CacheError, CacheOutcome};
use crate::templates::TemplateRegistry;
use std::path::Path;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte count with one decimal (`812.0 KB`).
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Show `path` relative to `root` when it lives underneath it.
fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn plural(n: u64, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}

// ============================================================================
// get
// ============================================================================

/// Format the result of a single lookup: the absolute cache path.
pub fn format_get_output(outcome: &CacheOutcome) -> Vec<String> {
    vec![outcome.path.display().to_string()]
}

pub fn print_get_output(outcome: &CacheOutcome) {
    for line in format_get_output(outcome) {
        println!("{}", line);
    }
}

// ============================================================================
// warm
// ============================================================================

/// Format one warmed original.
pub fn format_warm_entry(
    index: usize,
    filename: &str,
    result: &Result<CacheOutcome, CacheError>,
    cache_root: &Path,
) -> Vec<String> {
    match result {
        Ok(outcome) => vec![format!(
            "{} {} \u{2192} {} ({})",
            format_index(index),
            filename,
            display_path(&outcome.path, cache_root),
            outcome.status
        )],
        Err(err) => vec![
            format!("{} {}", format_index(index), filename),
            format!("{}Error: {}", indent(1), err),
        ],
    }
}

/// Format a whole warm run, ending with the cache summary line.
pub fn format_warm_output<S: AsRef<str>>(
    filenames: &[S],
    results: &[Result<CacheOutcome, CacheError>],
    cache_root: &Path,
) -> Vec<String> {
    let mut lines = Vec::new();
    let mut stats = CacheStats::default();
    let mut failed = 0u64;

    for (i, (filename, result)) in filenames.iter().zip(results).enumerate() {
        lines.extend(format_warm_entry(i + 1, filename.as_ref(), result, cache_root));
        match result {
            Ok(outcome) => stats.record(outcome.status),
            Err(_) => failed += 1,
        }
    }

    lines.push(String::new());
    if failed > 0 {
        lines.push(format!("{}, {} failed", stats, failed));
    } else {
        lines.push(stats.to_string());
    }
    lines
}

pub fn print_warm_output<S: AsRef<str>>(
    filenames: &[S],
    results: &[Result<CacheOutcome, CacheError>],
    cache_root: &Path,
) {
    for line in format_warm_output(filenames, results, cache_root) {
        println!("{}", line);
    }
}

// ============================================================================
// purge / stats
// ============================================================================

pub fn format_purge_output(stats: &PurgeStats, cache_root: &Path) -> Vec<String> {
    vec![format!(
        "Purged {} ({}) from {}",
        plural(stats.files, "file"),
        format_bytes(stats.bytes),
        cache_root.display()
    )]
}

pub fn print_purge_output(stats: &PurgeStats, cache_root: &Path) {
    for line in format_purge_output(stats, cache_root) {
        println!("{}", line);
    }
}

/// Per-template usage table with a total row.
pub fn format_usage_output(usage: &[TemplateUsage]) -> Vec<String> {
    if usage.is_empty() {
        return vec!["Cache is empty".to_string()];
    }

    let width = usage
        .iter()
        .map(|u| u.template.len())
        .chain(std::iter::once("total".len()))
        .max()
        .unwrap_or(0);
    let row = |name: &str, files: u64, bytes: u64| {
        format!(
            "{:<width$}  {:>10}  {:>9}",
            name,
            plural(files, "file"),
            format_bytes(bytes),
        )
    };

    let mut lines: Vec<String> = usage
        .iter()
        .map(|u| row(&u.template, u.files, u.bytes))
        .collect();
    let files = usage.iter().map(|u| u.files).sum();
    let bytes = usage.iter().map(|u| u.bytes).sum();
    lines.push(row("total", files, bytes));
    lines
}

pub fn print_usage_output(usage: &[TemplateUsage]) {
    for line in format_usage_output(usage) {
        println!("{}", line);
    }
}

// ============================================================================
// templates
// ============================================================================

/// Registered names and their canonical definitions, sorted by name.
pub fn format_templates_output(registry: &TemplateRegistry) -> Vec<String> {
    let width = registry.names().map(str::len).max().unwrap_or(0);
    registry
        .iter()
        .map(|(name, template)| format!("{:<width$}  {}", name, template))
        .collect()
}

pub fn print_templates_output(registry: &TemplateRegistry) {
    for line in format_templates_output(registry) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
