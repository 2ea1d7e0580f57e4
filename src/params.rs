//! Request parameters and their normalized form.
//!
//! Callers hand the cache loosely-typed values ([`RequestParams`]): widths that
//! may be zero or negative, and a free-form `"x,y,w,h"` coords string. Before
//! anything else happens they are normalized into [`TemplateParams`]:
//!
//! - a width or height `<= 0` becomes "not supplied",
//! - a coords string that is not exactly four numeric values becomes
//!   "not supplied".
//!
//! Normalization never fails. Bad input degrades to "skip that part of the
//! transform", so a typo in a URL still yields an image.

use crate::imaging::{CropRect, clamp_crop};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseCoordsError {
    #[error("expected 4 comma-separated values, got {0}")]
    WrongArity(usize),
    #[error("not a number: {0:?}")]
    NotNumeric(String),
}

/// Raw per-request parameters, as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_height: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coords: Option<String>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_width(mut self, max_width: i64) -> Self {
        self.max_width = Some(max_width);
        self
    }

    pub fn with_max_height(mut self, max_height: i64) -> Self {
        self.max_height = Some(max_height);
        self
    }

    pub fn with_coords(mut self, coords: impl Into<String>) -> Self {
        self.coords = Some(coords.into());
        self
    }

    /// Build from optional URL path segments.
    ///
    /// Route shapes like `/img/{template}/{file}/{w?}/{h?}/{coords?}` force
    /// callers to fill skipped positions with a placeholder (usually `null`).
    /// Any segment that is not an integer is dropped, and a `null` or empty
    /// coords segment counts as absent.
    pub fn from_segments(
        max_width: Option<&str>,
        max_height: Option<&str>,
        coords: Option<&str>,
    ) -> Self {
        let number = |s: Option<&str>| s.and_then(|s| s.trim().parse::<i64>().ok());
        let coords = coords
            .map(str::trim)
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("null"))
            .map(str::to_string);

        Self {
            max_width: number(max_width),
            max_height: number(max_height),
            coords,
        }
    }

    /// Collapse raw input into the canonical parameter set.
    pub fn normalize(&self) -> TemplateParams {
        let coords = self.coords.as_deref().and_then(|raw| match raw.parse() {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::debug!(coords = raw, error = %e, "ignoring malformed coords");
                None
            }
        });

        TemplateParams {
            max_width: positive(self.max_width),
            max_height: positive(self.max_height),
            coords,
        }
    }
}

/// Keep strictly positive values only.
pub(crate) fn positive(value: Option<i64>) -> Option<u32> {
    value
        .filter(|&v| v > 0)
        .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
}

/// Normalized parameters: every field is either valid or absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TemplateParams {
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub coords: Option<Coords>,
}

impl TemplateParams {
    /// Clamp requested bounds to `max_edge` pixels.
    pub fn capped(self, max_edge: u32) -> Self {
        Self {
            max_width: self.max_width.map(|w| w.min(max_edge)),
            max_height: self.max_height.map(|h| h.min(max_edge)),
            ..self
        }
    }
}

/// Crop coordinates as supplied, before clamping to an image.
///
/// Values may be negative or overflow the image; [`Coords::clamp_to`] turns
/// them into a [`CropRect`] for a concrete image size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coords {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Coords {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Clamp against an image; `None` means "do not crop".
    pub fn clamp_to(&self, image: (u32, u32)) -> Option<CropRect> {
        clamp_crop(image, [self.x, self.y, self.width, self.height])
    }
}

/// Parse one coordinate token.
///
/// Integers, decimals and exponent forms are accepted; fractions truncate
/// toward zero. `inf`/`nan` are rejected.
fn parse_number(token: &str) -> Option<i64> {
    let token = token.trim();
    if let Ok(v) = token.parse::<i64>() {
        return Some(v);
    }
    token
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.trunc() as i64)
}

impl FromStr for Coords {
    type Err = ParseCoordsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split(',').collect();
        if tokens.len() != 4 {
            return Err(ParseCoordsError::WrongArity(tokens.len()));
        }

        let mut values = [0i64; 4];
        for (slot, token) in values.iter_mut().zip(&tokens) {
            *slot = parse_number(token)
                .ok_or_else(|| ParseCoordsError::NotNumeric(token.trim().to_string()))?;
        }

        let [x, y, width, height] = values;
        Ok(Self::new(x, y, width, height))
    }
}

/// Canonical `x,y,w,h` form, used in cache keys.
impl fmt::Display for Coords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}
