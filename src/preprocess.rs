//! Turns a decoded captcha into the raster handed to the recognition backend.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::codec;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::transformer::Recipe;
use crate::Raster;

pub struct Preprocessor {
    recipe: Recipe,
    debug_image: PathBuf,
}

impl Preprocessor {
    pub fn new(recipe: Recipe, debug_image: impl Into<PathBuf>) -> Self {
        Preprocessor {
            recipe,
            debug_image: debug_image.into(),
        }
    }

    /// The standard recipe scaled by `config.resize_factor`, unless the
    /// configuration names a recipe file, which then replaces it entirely.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let recipe = match &config.recipe {
            Some(path) => {
                info!(path = %path.display(), "using transform recipe from file");
                Recipe::from_path(path)?
            }
            None => Recipe::standard(config.resize_factor),
        };
        Ok(Preprocessor::new(recipe, &config.debug_image))
    }

    pub fn debug_image(&self) -> &Path {
        &self.debug_image
    }

    /// Run the recipe and persist the result to the debug image path.
    ///
    /// A recipe that would grow the raster past [`MAX_SIDE`](crate::transformer::MAX_SIDE)
    /// is rejected before any resampling. A failed debug write is fatal.
    pub fn preprocess(&self, raster: &Raster) -> Result<Raster> {
        let (width, height) = raster.dimensions();
        self.recipe
            .output_size(width, height)
            .map_err(Error::InvalidConfig)?;
        let processed = self.recipe.apply(raster);
        debug!(
            from = ?raster.dimensions(),
            to = ?processed.dimensions(),
            steps = self.recipe.steps().len(),
            "preprocessed captcha"
        );
        codec::write_jpeg(&processed, &self.debug_image)?;
        info!(path = %self.debug_image.display(), "wrote debug image");
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn noisy(width: u32, height: u32) -> Raster {
        Raster::from_fn(width, height, |x, y| {
            let v = ((x * 31 + y * 17) % 256) as u8;
            Rgb([v, 255 - v, v / 2])
        })
    }

    #[test]
    fn doubles_a_100_by_40_captcha() {
        let dir = tempfile::tempdir().unwrap();
        let pre = Preprocessor::new(Recipe::standard(2.0), dir.path().join("tmp.jpeg"));
        let out = pre.preprocess(&noisy(100, 40)).unwrap();
        assert_eq!(out.dimensions(), (200, 80));
        assert!(pre.debug_image().exists());
    }

    #[test]
    fn output_size_is_rounded_product() {
        let dir = tempfile::tempdir().unwrap();
        for (w, h, r) in [(100, 40, 2.0), (33, 17, 1.5), (120, 45, 0.5), (9, 7, 3.3)] {
            let pre = Preprocessor::new(Recipe::standard(r), dir.path().join("tmp.jpeg"));
            let out = pre.preprocess(&noisy(w, h)).unwrap();
            let expected = (
                (w as f64 * r).round() as u32,
                (h as f64 * r).round() as u32,
            );
            assert_eq!(out.dimensions(), expected, "{w}x{h} * {r}");
        }
    }

    #[test]
    fn deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let pre = Preprocessor::new(Recipe::standard(2.0), dir.path().join("tmp.jpeg"));
        let source = noisy(64, 24);
        let first = pre.preprocess(&source).unwrap();
        let second = pre.preprocess(&source).unwrap();
        assert_eq!(first.as_raw(), second.as_raw());
    }

    #[test]
    fn oversized_result_is_rejected_before_resampling() {
        let dir = tempfile::tempdir().unwrap();
        let pre = Preprocessor::new(Recipe::standard(100.0), dir.path().join("tmp.jpeg"));
        let err = pre.preprocess(&noisy(200, 10)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)), "got: {err}");
        assert!(!pre.debug_image().exists());
    }

    #[test]
    fn debug_write_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let pre = Preprocessor::new(
            Recipe::standard(2.0),
            dir.path().join("no-such-dir").join("tmp.jpeg"),
        );
        let err = pre.preprocess(&noisy(10, 10)).unwrap_err();
        assert!(matches!(err, Error::DebugImageWrite { .. }), "got: {err}");
    }
}
