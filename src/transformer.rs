use std::fs;
use std::path::Path;

use enum_dispatch::enum_dispatch;
use image::imageops::{resize, FilterType};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::Raster;

/// Brightness shift of the canonical recipe, as a fraction of the 0..=255 range.
pub const STANDARD_BRIGHTNESS: f32 = -0.2;
/// Contrast change of the canonical recipe.
pub const STANDARD_CONTRAST: f32 = -0.3;
/// Largest width or height any step of a recipe may produce.
pub const MAX_SIDE: u32 = 16_384;

#[enum_dispatch]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ImageTransform {
    Brightness(Brightness),
    Contrast(Contrast),
    Rescale(Rescale),
}

/// A pure raster-to-raster step. Never mutates its input.
#[enum_dispatch(ImageTransform)]
pub trait GenericTransform {
    fn transform(&self, input: &Raster) -> Raster;
}

#[derive(Serialize, Deserialize)]
#[serde(remote = "FilterType")]
enum FilterOption {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

fn default_filter() -> FilterType {
    FilterType::Lanczos3
}

fn apply_lookup(input: &Raster, lookup: &[u8; 256]) -> Raster {
    let mut output = input.clone();
    for pixel in output.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = lookup[*channel as usize];
        }
    }
    output
}

fn clamp_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Shifts every channel by `change * 255`. `change` is in `-1.0..=1.0`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Brightness {
    pub change: f32,
}

impl GenericTransform for Brightness {
    fn transform(&self, input: &Raster) -> Raster {
        let shift = self.change * 255.0;
        let mut lookup = [0u8; 256];
        for (i, slot) in lookup.iter_mut().enumerate() {
            *slot = clamp_channel(i as f32 + shift);
        }
        apply_lookup(input, &lookup)
    }
}

/// Scales every channel around mid-grey by `1 + change`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contrast {
    pub change: f32,
}

impl GenericTransform for Contrast {
    fn transform(&self, input: &Raster) -> Raster {
        let gain = 1.0 + self.change;
        let mut lookup = [0u8; 256];
        for (i, slot) in lookup.iter_mut().enumerate() {
            *slot = clamp_channel(((i as f32 / 255.0 - 0.5) * gain + 0.5) * 255.0);
        }
        apply_lookup(input, &lookup)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rescale {
    pub factor: f64,
    #[serde(with = "FilterOption", default = "default_filter")]
    pub filter: FilterType,
}

impl Rescale {
    pub fn target_size(&self, width: u32, height: u32) -> (u32, u32) {
        let scale = |dim: u32| (dim as f64 * self.factor).round().max(1.0) as u32;
        (scale(width), scale(height))
    }
}

impl GenericTransform for Rescale {
    fn transform(&self, input: &Raster) -> Raster {
        let (width, height) = self.target_size(input.width(), input.height());
        resize(input, width, height, self.filter)
    }
}

/// An ordered list of transforms, applied first to last.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recipe {
    steps: Vec<ImageTransform>,
}

impl Recipe {
    pub fn new(steps: Vec<ImageTransform>) -> Self {
        Recipe { steps }
    }

    /// Brightness down, contrast down, then a Lanczos upscale by `resize_factor`.
    pub fn standard(resize_factor: f64) -> Self {
        Recipe::new(vec![
            Brightness {
                change: STANDARD_BRIGHTNESS,
            }
            .into(),
            Contrast {
                change: STANDARD_CONTRAST,
            }
            .into(),
            Rescale {
                factor: resize_factor,
                filter: FilterType::Lanczos3,
            }
            .into(),
        ])
    }

    /// Load a recipe from a JSON array such as
    /// `[{"op": "contrast", "change": -0.3}, {"op": "rescale", "factor": 3.0}]`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let to_error = |detail: String| Error::Recipe {
            path: path.to_path_buf(),
            detail,
        };
        let text = fs::read_to_string(path).map_err(|e| to_error(e.to_string()))?;
        let recipe: Recipe = serde_json::from_str(&text).map_err(|e| to_error(e.to_string()))?;
        recipe.validate().map_err(to_error)?;
        Ok(recipe)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        for step in &self.steps {
            match step {
                ImageTransform::Brightness(Brightness { change })
                | ImageTransform::Contrast(Contrast { change })
                    if !change.is_finite() || !(-1.0..=1.0).contains(change) =>
                {
                    return Err(format!("change {change} is outside -1.0..=1.0"));
                }
                ImageTransform::Rescale(Rescale { factor, .. })
                    if !factor.is_finite() || *factor <= 0.0 =>
                {
                    return Err(format!("rescale factor {factor} must be positive"));
                }
                ImageTransform::Rescale(Rescale { factor, .. }) if *factor > MAX_SIDE as f64 => {
                    return Err(format!("rescale factor {factor} exceeds {MAX_SIDE}"));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Dimensions `apply` produces for a `width` x `height` input.
    ///
    /// Fails on the first rescale whose result is wider or taller than
    /// [`MAX_SIDE`].
    pub fn output_size(&self, width: u32, height: u32) -> std::result::Result<(u32, u32), String> {
        let mut size = (width, height);
        for (index, step) in self.steps.iter().enumerate() {
            if let ImageTransform::Rescale(rescale) = step {
                size = rescale.target_size(size.0, size.1);
                if size.0 > MAX_SIDE || size.1 > MAX_SIDE {
                    return Err(format!(
                        "step {index} rescales {width}x{height} past {MAX_SIDE} px per side"
                    ));
                }
            }
        }
        Ok(size)
    }

    pub fn steps(&self) -> &[ImageTransform] {
        &self.steps
    }

    pub fn apply(&self, raster: &Raster) -> Raster {
        let mut result = raster.clone();
        for step in &self.steps {
            result = step.transform(&result);
        }
        result
    }
}
