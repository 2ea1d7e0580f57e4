//! Named geometry templates and the registry that holds them.
//!
//! A template decides which pixels of an original survive and at what size.
//! Templates are a closed set ([`TemplateKind`]); each registered name maps to
//! one [`Template`] value carrying its registration-time bounds.
//!
//! | Kind | Crop (`coords`) | Resize rule | Defaults |
//! |---|---|---|---|
//! | `crop` | yes | fit both bounds, or constrain one axis | no bounds |
//! | `large` | yes | fit both bounds | 1600 x 900 |
//! | `small` | no | fit both bounds | 800 x 450 |
//! | `thumbnail` | no | cover to a `size x size` square (may upscale) | 300 |
//!
//! Callers clamp requested bounds with [`TemplateParams::capped`] before planning;
//! thumbnails are the one kind that upscales, so the clamp bounds their size.
//!
//! "Fit both bounds" divides both edges by the larger overflow ratio, so the
//! aspect ratio is kept and nothing is ever upscaled.
//!
//! ## Bound precedence
//!
//! For each bound: the request value if positive, else the registration
//! override if positive, else the kind's default.
//!
//! Planning ([`Template::plan`]) is pure arithmetic on dimensions. Applying
//! ([`Template::apply`]) executes the plan on any [`Canvas`].

use crate::imaging::{
    Canvas, CropRect, Dimensions, constrain_height, constrain_width, fit_within,
};
use crate::params::{TemplateParams, positive};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path};
use thiserror::Error;

/// Default bounds of the `large` template.
pub const LARGE_BOUNDS: (u32, u32) = (1600, 900);
/// Default bounds of the `small` template.
pub const SMALL_BOUNDS: (u32, u32) = (800, 450);
/// Default edge of the `thumbnail` template.
pub const THUMBNAIL_SIZE: u32 = 300;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown template: {0}")]
pub struct UnknownTemplate(pub String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("template name {0:?} must be a single path component")]
pub struct InvalidTemplateName(pub String);

/// Template names become directory names under the cache root.
pub(crate) fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

/// The closed set of geometry strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    Crop,
    Large,
    Small,
    Thumbnail,
}

impl TemplateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crop => "crop",
            Self::Large => "large",
            Self::Small => "small",
            Self::Thumbnail => "thumbnail",
        }
    }
}

/// A geometry strategy together with its registration-time bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Crop {
        max_width: Option<u32>,
        max_height: Option<u32>,
    },
    Large {
        max_width: u32,
        max_height: u32,
    },
    Small {
        max_width: u32,
        max_height: u32,
    },
    Thumbnail {
        size: u32,
    },
}

/// What a template will do to one particular image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformPlan {
    /// Optional crop, then optional exact resize.
    Fit {
        crop: Option<CropRect>,
        resize: Option<(u32, u32)>,
    },
    /// Scale to fill and center-crop to exactly this size.
    Cover { width: u32, height: u32 },
}

impl TransformPlan {
    /// Leaves the image untouched.
    pub fn is_identity(&self) -> bool {
        matches!(
            self,
            TransformPlan::Fit {
                crop: None,
                resize: None
            }
        )
    }

    /// Output dimensions when applied to an image of `source` size.
    pub fn output_dimensions(&self, source: Dimensions) -> Dimensions {
        match *self {
            TransformPlan::Fit { crop, resize } => {
                let (width, height) = resize
                    .or(crop.map(|r| (r.width, r.height)))
                    .unwrap_or((source.width, source.height));
                Dimensions { width, height }
            }
            TransformPlan::Cover { width, height } => Dimensions { width, height },
        }
    }
}

impl Template {
    /// Build a template from registration-time overrides.
    ///
    /// Non-positive overrides are ignored, falling back to the kind's
    /// defaults. `thumbnail` reads its size from `max_width`.
    pub fn new(kind: TemplateKind, max_width: Option<i64>, max_height: Option<i64>) -> Self {
        let max_width = positive(max_width);
        let max_height = positive(max_height);
        match kind {
            TemplateKind::Crop => Template::Crop {
                max_width,
                max_height,
            },
            TemplateKind::Large => Template::Large {
                max_width: max_width.unwrap_or(LARGE_BOUNDS.0),
                max_height: max_height.unwrap_or(LARGE_BOUNDS.1),
            },
            TemplateKind::Small => Template::Small {
                max_width: max_width.unwrap_or(SMALL_BOUNDS.0),
                max_height: max_height.unwrap_or(SMALL_BOUNDS.1),
            },
            TemplateKind::Thumbnail => Template::Thumbnail {
                size: max_width.unwrap_or(THUMBNAIL_SIZE),
            },
        }
    }

    /// Template with the kind's stock bounds.
    pub fn stock(kind: TemplateKind) -> Self {
        Self::new(kind, None, None)
    }

    pub fn kind(&self) -> TemplateKind {
        match self {
            Template::Crop { .. } => TemplateKind::Crop,
            Template::Large { .. } => TemplateKind::Large,
            Template::Small { .. } => TemplateKind::Small,
            Template::Thumbnail { .. } => TemplateKind::Thumbnail,
        }
    }

    /// Drop the parameters this kind never reads.
    ///
    /// Cache keys are derived from the result, so requests that differ only
    /// in ignored fields share one derivative.
    pub fn effective_params(&self, params: &TemplateParams) -> TemplateParams {
        match self {
            Template::Crop { .. } | Template::Large { .. } => *params,
            Template::Small { .. } => TemplateParams {
                coords: None,
                ..*params
            },
            Template::Thumbnail { .. } => TemplateParams {
                max_width: params.max_width,
                max_height: None,
                coords: None,
            },
        }
    }

    /// Compute the transform for an image of `source` size.
    pub fn plan(&self, source: Dimensions, params: &TemplateParams) -> TransformPlan {
        let dims = (source.width, source.height);
        let crop_for = |params: &TemplateParams| params.coords.and_then(|c| c.clamp_to(dims));

        match *self {
            Template::Crop {
                max_width,
                max_height,
            } => {
                let crop = crop_for(params);
                let current = crop.map(|r| (r.width, r.height)).unwrap_or(dims);
                let resize = match (
                    params.max_width.or(max_width),
                    params.max_height.or(max_height),
                ) {
                    (Some(w), Some(h)) => fit_within(current, (w, h)),
                    (Some(w), None) => constrain_width(current, w),
                    (None, Some(h)) => constrain_height(current, h),
                    (None, None) => None,
                };
                TransformPlan::Fit { crop, resize }
            }
            Template::Large {
                max_width,
                max_height,
            } => {
                let crop = crop_for(params);
                let current = crop.map(|r| (r.width, r.height)).unwrap_or(dims);
                let bounds = (
                    params.max_width.unwrap_or(max_width),
                    params.max_height.unwrap_or(max_height),
                );
                TransformPlan::Fit {
                    crop,
                    resize: fit_within(current, bounds),
                }
            }
            Template::Small {
                max_width,
                max_height,
            } => {
                let bounds = (
                    params.max_width.unwrap_or(max_width),
                    params.max_height.unwrap_or(max_height),
                );
                TransformPlan::Fit {
                    crop: None,
                    resize: fit_within(dims, bounds),
                }
            }
            Template::Thumbnail { size } => {
                let size = params.max_width.unwrap_or(size);
                TransformPlan::Cover {
                    width: size,
                    height: size,
                }
            }
        }
    }

    /// Plan against the image's own size and execute the plan.
    pub fn apply<C: Canvas>(&self, image: C, params: &TemplateParams) -> C {
        match self.plan(image.dimensions(), params) {
            TransformPlan::Fit { crop, resize } => {
                let image = match crop {
                    Some(rect) => image.crop(rect),
                    None => image,
                };
                match resize {
                    Some((width, height)) => image.resize(width, height),
                    None => image,
                }
            }
            TransformPlan::Cover { width, height } => image.cover(width, height),
        }
    }
}

/// Canonical definition string, e.g. `large:1600x900` or `crop:*x300`.
///
/// Part of every cache key, so changing a template's configured bounds
/// invalidates the derivatives it produced.
impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |b: Option<u32>| b.map_or_else(|| "*".to_string(), |v| v.to_string());
        match *self {
            Template::Crop {
                max_width,
                max_height,
            } => write!(f, "crop:{}x{}", bound(max_width), bound(max_height)),
            Template::Large {
                max_width,
                max_height,
            } => write!(f, "large:{max_width}x{max_height}"),
            Template::Small {
                max_width,
                max_height,
            } => write!(f, "small:{max_width}x{max_height}"),
            Template::Thumbnail { size } => write!(f, "thumbnail:{size}"),
        }
    }
}

/// Template name → [`Template`], built once at startup.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, Template>,
}

impl TemplateRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// `crop`, `large`, `small` and `thumbnail` with stock bounds.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for kind in [
            TemplateKind::Crop,
            TemplateKind::Large,
            TemplateKind::Small,
            TemplateKind::Thumbnail,
        ] {
            registry
                .templates
                .insert(kind.as_str().to_string(), Template::stock(kind));
        }
        registry
    }

    /// Register (or replace) a template under `name`.
    ///
    /// The name becomes a directory under the cache root, so it must be a
    /// single normal path component.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        template: Template,
    ) -> Result<(), InvalidTemplateName> {
        let name = name.into();
        if !is_single_component(&name) {
            return Err(InvalidTemplateName(name));
        }
        self.templates.insert(name, template);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Template, UnknownTemplate> {
        self.templates
            .get(name)
            .ok_or_else(|| UnknownTemplate(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Template)> {
        self.templates.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockImage;
    use crate::params::RequestParams;

    fn apply(template: Template, source: (u32, u32), params: RequestParams) -> (u32, u32) {
        let out = template.apply(MockImage::new(source.0, source.1), &params.normalize());
        (out.width, out.height)
    }

    fn crop(max_width: Option<i64>, max_height: Option<i64>) -> Template {
        Template::new(TemplateKind::Crop, max_width, max_height)
    }

    // =========================================================================
    // Crop template
    // =========================================================================

    #[test]
    fn crop_with_coordinates() {
        let params = RequestParams::new().with_coords("100,100,200,200");
        assert_eq!(apply(crop(None, None), (500, 500), params), (200, 200));
    }

    #[test]
    fn crop_and_resize_square() {
        let params = RequestParams::new()
            .with_max_width(100)
            .with_max_height(100)
            .with_coords("100,100,200,200");
        assert_eq!(apply(crop(None, None), (500, 500), params), (100, 100));
    }

    #[test]
    fn crop_dual_bound_keeps_aspect_ratio() {
        // 200x400 crop, bounds 100x300: width ratio 2.0 wins → 100x200
        let params = RequestParams::new()
            .with_max_width(100)
            .with_max_height(300)
            .with_coords("100,100,200,400");
        assert_eq!(apply(crop(None, None), (500, 500), params), (100, 200));
    }

    #[test]
    fn crop_width_only_leaves_height() {
        let params = RequestParams::new()
            .with_max_width(100)
            .with_coords("100,100,200,400");
        assert_eq!(apply(crop(None, None), (500, 500), params), (100, 400));
    }

    #[test]
    fn crop_height_only_leaves_width() {
        let params = RequestParams::new()
            .with_max_height(100)
            .with_coords("0,0,200,400");
        assert_eq!(apply(crop(None, None), (500, 500), params), (200, 100));
    }

    #[test]
    fn crop_invalid_coordinates_are_ignored() {
        let params = RequestParams::new().with_coords("invalid");
        assert_eq!(apply(crop(None, None), (500, 500), params), (500, 500));
    }

    #[test]
    fn crop_zero_rect_is_ignored() {
        let params = RequestParams::new().with_coords("0,0,0,0");
        assert_eq!(apply(crop(None, None), (500, 500), params), (500, 500));
    }

    #[test]
    fn crop_origin_outside_image_is_ignored() {
        let params = RequestParams::new().with_coords("600,0,50,50");
        assert_eq!(apply(crop(None, None), (500, 500), params), (500, 500));
    }

    #[test]
    fn crop_overflowing_rect_is_clamped() {
        let params = RequestParams::new().with_coords("-20,450,200,200");
        assert_eq!(apply(crop(None, None), (500, 500), params), (200, 50));
    }

    #[test]
    fn crop_non_positive_request_bounds_mean_no_constraint() {
        let params = RequestParams::new().with_max_width(0).with_max_height(-5);
        assert_eq!(apply(crop(None, None), (500, 500), params), (500, 500));
    }

    #[test]
    fn crop_never_upscales() {
        let params = RequestParams::new().with_max_width(1000).with_max_height(1000);
        assert_eq!(apply(crop(None, None), (500, 250), params), (500, 250));
    }

    #[test]
    fn crop_registration_bounds_apply_when_request_has_none() {
        assert_eq!(
            apply(crop(Some(100), Some(100)), (500, 250), RequestParams::new()),
            (100, 50)
        );
    }

    #[test]
    fn crop_request_bounds_override_registration() {
        let params = RequestParams::new().with_max_width(250).with_max_height(250);
        assert_eq!(
            apply(crop(Some(100), Some(100)), (500, 250), params),
            (250, 125)
        );
    }

    // =========================================================================
    // Large template
    // =========================================================================

    #[test]
    fn large_defaults_fit_1600x900() {
        let large = Template::stock(TemplateKind::Large);
        assert_eq!(apply(large, (3200, 1800), RequestParams::new()), (1600, 900));
        assert_eq!(apply(large, (1800, 3600), RequestParams::new()), (450, 900));
    }

    #[test]
    fn large_small_source_untouched() {
        let large = Template::stock(TemplateKind::Large);
        assert_eq!(apply(large, (640, 480), RequestParams::new()), (640, 480));
    }

    #[test]
    fn large_non_positive_bounds_fall_back_to_defaults() {
        let large = Template::stock(TemplateKind::Large);
        let params = RequestParams::new().with_max_width(-1).with_max_height(0);
        assert_eq!(apply(large, (3200, 1800), params), (1600, 900));
    }

    #[test]
    fn large_crops_before_fitting() {
        let large = Template::stock(TemplateKind::Large);
        let params = RequestParams::new()
            .with_max_width(100)
            .with_max_height(300)
            .with_coords("100,100,200,400");
        assert_eq!(apply(large, (500, 500), params), (100, 200));
    }

    #[test]
    fn large_registration_override() {
        let large = Template::new(TemplateKind::Large, Some(1000), Some(0));
        assert_eq!(
            large,
            Template::Large {
                max_width: 1000,
                max_height: 900
            }
        );
    }

    // =========================================================================
    // Small template
    // =========================================================================

    #[test]
    fn small_defaults_fit_800x450() {
        let small = Template::stock(TemplateKind::Small);
        assert_eq!(apply(small, (1600, 900), RequestParams::new()), (800, 450));
    }

    #[test]
    fn small_ignores_coords() {
        let small = Template::stock(TemplateKind::Small);
        let params = RequestParams::new().with_coords("0,0,100,100");
        assert_eq!(apply(small, (400, 300), params), (400, 300));
    }

    // =========================================================================
    // Thumbnail template
    // =========================================================================

    #[test]
    fn thumbnail_is_always_square() {
        let thumb = Template::stock(TemplateKind::Thumbnail);
        for source in [(1920, 1080), (300, 900), (300, 300)] {
            assert_eq!(apply(thumb, source, RequestParams::new()), (300, 300));
        }
    }

    #[test]
    fn thumbnail_upscales_small_source() {
        let thumb = Template::stock(TemplateKind::Thumbnail);
        assert_eq!(apply(thumb, (40, 20), RequestParams::new()), (300, 300));
    }

    #[test]
    fn thumbnail_size_from_request_width() {
        let thumb = Template::stock(TemplateKind::Thumbnail);
        let params = RequestParams::new().with_max_width(120).with_max_height(999);
        assert_eq!(apply(thumb, (1000, 500), params), (120, 120));
    }

    #[test]
    fn thumbnail_size_from_registration() {
        let thumb = Template::new(TemplateKind::Thumbnail, Some(150), None);
        assert_eq!(thumb, Template::Thumbnail { size: 150 });
        assert_eq!(apply(thumb, (1000, 500), RequestParams::new()), (150, 150));
    }

    // =========================================================================
    // Plans
    // =========================================================================

    #[test]
    fn plan_reports_output_dimensions_without_pixels() {
        let source = Dimensions {
            width: 500,
            height: 500,
        };
        let params = RequestParams::new()
            .with_max_width(100)
            .with_coords("100,100,200,400")
            .normalize();
        let plan = crop(None, None).plan(source, &params);
        assert_eq!(
            plan,
            TransformPlan::Fit {
                crop: Some(CropRect {
                    x: 100,
                    y: 100,
                    width: 200,
                    height: 400
                }),
                resize: Some((100, 400)),
            }
        );
        assert_eq!(
            plan.output_dimensions(source),
            Dimensions {
                width: 100,
                height: 400
            }
        );
    }

    #[test]
    fn plan_identity_when_nothing_to_do() {
        let source = Dimensions {
            width: 10,
            height: 10,
        };
        let plan = Template::stock(TemplateKind::Small).plan(source, &TemplateParams::default());
        assert!(plan.is_identity());
    }

    // =========================================================================
    // Display / registry
    // =========================================================================

    #[test]
    fn display_is_canonical_definition() {
        assert_eq!(Template::stock(TemplateKind::Large).to_string(), "large:1600x900");
        assert_eq!(Template::stock(TemplateKind::Small).to_string(), "small:800x450");
        assert_eq!(Template::stock(TemplateKind::Thumbnail).to_string(), "thumbnail:300");
        assert_eq!(crop(None, Some(300)).to_string(), "crop:*x300");
    }

    #[test]
    fn registry_defaults_contain_all_kinds() {
        let registry = TemplateRegistry::with_defaults();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["crop", "large", "small", "thumbnail"]
        );
        assert_eq!(registry.get("large").unwrap().kind(), TemplateKind::Large);
    }

    #[test]
    fn registry_unknown_template_is_an_error() {
        let registry = TemplateRegistry::with_defaults();
        assert_eq!(
            registry.get("huge"),
            Err(UnknownTemplate("huge".to_string()))
        );
    }

    #[test]
    fn registry_register_replaces() {
        let mut registry = TemplateRegistry::new();
        assert!(registry.is_empty());
        registry
            .register("hero", Template::stock(TemplateKind::Large))
            .unwrap();
        registry
            .register("hero", Template::new(TemplateKind::Small, Some(640), None))
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("hero").unwrap(),
            &Template::Small {
                max_width: 640,
                max_height: 450
            }
        );
    }

    #[test]
    fn registry_rejects_names_that_escape_the_cache_root() {
        let mut registry = TemplateRegistry::new();
        for bad in ["", "..", ".", "../x", "a/b", "/abs", "a\\b"] {
            assert_eq!(
                registry.register(bad, Template::stock(TemplateKind::Large)),
                Err(InvalidTemplateName(bad.to_string())),
                "{bad:?} should be rejected"
            );
        }
        assert!(registry.is_empty());
    }

    // =========================================================================
    // Effective params
    // =========================================================================

    fn full_params() -> TemplateParams {
        RequestParams::new()
            .with_max_width(120)
            .with_max_height(77)
            .with_coords("1,1,5,5")
            .normalize()
    }

    #[test]
    fn effective_params_small_drops_coords() {
        let small = Template::stock(TemplateKind::Small);
        let params = RequestParams::new().with_coords("1,1,5,5").normalize();
        assert_eq!(small.effective_params(&params), TemplateParams::default());
        assert_eq!(small.effective_params(&full_params()).max_height, Some(77));
    }

    #[test]
    fn effective_params_thumbnail_keeps_only_width() {
        let thumb = Template::stock(TemplateKind::Thumbnail);
        assert_eq!(
            thumb.effective_params(&full_params()),
            TemplateParams {
                max_width: Some(120),
                max_height: None,
                coords: None,
            }
        );
    }

    #[test]
    fn effective_params_crop_and_large_keep_everything() {
        for kind in [TemplateKind::Crop, TemplateKind::Large] {
            let template = Template::stock(kind);
            assert_eq!(template.effective_params(&full_params()), full_params());
        }
    }

    #[test]
    fn thumbnail_request_size_is_capped() {
        let thumb = Template::stock(TemplateKind::Thumbnail);
        let params = RequestParams::new().with_max_width(i64::MAX).normalize();
        let source = Dimensions {
            width: 10,
            height: 10,
        };
        assert_eq!(
            thumb.plan(source, &params.capped(4096)),
            TransformPlan::Cover {
                width: 4096,
                height: 4096
            }
        );
    }
}
