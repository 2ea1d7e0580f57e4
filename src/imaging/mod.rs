//! Image processing in pure Rust, with no external tools.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::load_from_memory` |
//! | **Crop / Resize** | `crop_imm` / `resize_exact` (Lanczos3) |
//! | **Cover** | fill-resize + center crop |
//! | **Encode** | JPEG, PNG, WebP, TIFF, AVIF (rav1e) |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] / [`Canvas`] traits + [`RustBackend`]

pub mod backend;
mod calculations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Canvas, Dimensions, ImageBackend};
pub use calculations::{
    calculate_fill_dimensions, center_crop, clamp_crop, constrain_height, constrain_width,
    fit_within,
};
pub use params::{CropRect, OutputFormat, Quality};
pub use rust_backend::RustBackend;
