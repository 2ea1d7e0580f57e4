//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.
//! Rounding follows `f64::round` (half away from zero), and every computed
//! edge is at least one pixel.

use super::params::CropRect;

/// Divide an edge by a ratio, rounding to the nearest pixel.
fn scale_edge(edge: u32, ratio: f64) -> u32 {
    ((edge as f64 / ratio).round() as u32).max(1)
}

/// Validate and clamp raw `x,y,width,height` values against an image.
///
/// - Negative `x`/`y` are clamped to 0.
/// - A non-positive width or height rejects the crop.
/// - An origin outside the image rejects the crop.
/// - Width and height are shrunk so the rectangle ends inside the image.
///
/// # Examples
/// ```
/// # use imgcache::imaging::{CropRect, clamp_crop};
/// assert_eq!(
///     clamp_crop((500, 500), [400, 400, 300, 300]),
///     Some(CropRect { x: 400, y: 400, width: 100, height: 100 })
/// );
/// assert_eq!(clamp_crop((500, 500), [0, 0, 0, 0]), None);
/// ```
pub fn clamp_crop(image: (u32, u32), raw: [i64; 4]) -> Option<CropRect> {
    let (img_w, img_h) = (image.0 as i64, image.1 as i64);
    let [x, y, width, height] = raw;
    let x = x.max(0);
    let y = y.max(0);

    if width <= 0 || height <= 0 {
        return None;
    }
    if x >= img_w || y >= img_h {
        return None;
    }

    Some(CropRect {
        x: x as u32,
        y: y as u32,
        width: width.min(img_w - x) as u32,
        height: height.min(img_h - y) as u32,
    })
}

/// Fit dimensions inside a bounding box, preserving aspect ratio.
///
/// Returns `None` when the source already fits (this never upscales).
/// Otherwise both edges are divided by the larger of the two overflow
/// ratios, so the tighter bound decides.
///
/// # Examples
/// ```
/// # use imgcache::imaging::fit_within;
/// // 200x400 into 100x300: width ratio 2.0 beats height ratio 1.33
/// assert_eq!(fit_within((200, 400), (100, 300)), Some((100, 200)));
/// assert_eq!(fit_within((80, 40), (100, 300)), None);
/// ```
pub fn fit_within(source: (u32, u32), bounds: (u32, u32)) -> Option<(u32, u32)> {
    let (src_w, src_h) = source;
    let (max_w, max_h) = bounds;

    let width_ratio = src_w as f64 / max_w as f64;
    let height_ratio = src_h as f64 / max_h as f64;

    if width_ratio <= 1.0 && height_ratio <= 1.0 {
        return None;
    }

    let ratio = width_ratio.max(height_ratio);
    Some((scale_edge(src_w, ratio), scale_edge(src_h, ratio)))
}

/// Constrain only the width. The height is left as-is.
pub fn constrain_width(source: (u32, u32), max_width: u32) -> Option<(u32, u32)> {
    (source.0 > max_width).then_some((max_width, source.1))
}

/// Constrain only the height. The width is left as-is.
pub fn constrain_height(source: (u32, u32), max_height: u32) -> Option<(u32, u32)> {
    (source.1 > max_height).then_some((source.0, max_height))
}

/// Scale `source` to cover `target`, keeping its aspect ratio. One edge
/// matches the target and the other overflows it.
pub fn calculate_fill_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        // Source is wider: height will match, width will exceed
        let h = tgt_h;
        let w = ((h as f64 * src_aspect).round() as u32).max(tgt_w);
        (w, h)
    } else {
        // Source is taller: width will match, height will exceed
        let w = tgt_w;
        let h = ((w as f64 / src_aspect).round() as u32).max(tgt_h);
        (w, h)
    }
}

/// Centered crop of `target` size out of a `fill`-sized image.
pub fn center_crop(fill: (u32, u32), target: (u32, u32)) -> CropRect {
    let width = target.0.min(fill.0);
    let height = target.1.min(fill.1);
    CropRect {
        x: (fill.0 - width) / 2,
        y: (fill.1 - height) / 2,
        width,
        height,
    }
}
