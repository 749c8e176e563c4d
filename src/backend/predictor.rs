use std::fs;
use std::path::Path;

use image::imageops::{crop_imm, grayscale, resize, FilterType};
use image::GrayImage;
use tracing::info;
use tract_onnx::prelude::*;

use super::{tract_detail, RecognitionBackend, TractSimplePlan};
use crate::error::RecognitionError;
use crate::Raster;

pub const MODEL_FILE: &str = "model.onnx";
pub const CHARSET_FILE: &str = "charset.json";

/// Symbols in the order the scan emitted them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SymbolSequence(Vec<String>);

impl SymbolSequence {
    pub fn new(symbols: Vec<String>) -> Self {
        SymbolSequence(symbols)
    }

    pub fn symbols(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Concatenate in order, no separator.
    pub fn into_text(self) -> String {
        self.0.concat()
    }
}

impl<S: Into<String>> FromIterator<S> for SymbolSequence {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        SymbolSequence(iter.into_iter().map(Into::into).collect())
    }
}

/// Maps a square grey window to an index into the charset.
pub trait Classify {
    fn classify(&self, window: &GrayImage) -> Result<usize, RecognitionError>;
}

impl<F> Classify for F
where
    F: Fn(&GrayImage) -> Result<usize, RecognitionError>,
{
    fn classify(&self, window: &GrayImage) -> Result<usize, RecognitionError> {
        self(window)
    }
}

/// Offsets of every window along a row of `width` pixels. Stride is half a
/// window and the last window always ends on the right edge.
fn window_offsets(width: u32, size: u32) -> Vec<u32> {
    let stride = (size / 2).max(1) as usize;
    let last = width.saturating_sub(size);
    let mut offsets: Vec<u32> = (0..=last).step_by(stride).collect();
    if offsets.last() != Some(&last) {
        offsets.push(last);
    }
    offsets
}

/// Grey copy of `raster` with height `size`, at least `size` wide.
fn fit_height(raster: &Raster, size: u32) -> GrayImage {
    let gray = grayscale(raster);
    let (width, height) = gray.dimensions();
    let scaled_width = (width as f64 * size as f64 / height as f64).round() as u32;
    resize(&gray, scaled_width.max(size), size, FilterType::CatmullRom)
}

/// Slide a `size` x `size` window across the raster and classify each stop.
///
/// Windows classified as the blank symbol (`""`) are dropped. Repeats of the
/// same symbol in adjacent windows collapse into one, unless a blank window
/// separates them.
pub fn scan<C: Classify + ?Sized>(
    classifier: &C,
    charset: &[String],
    raster: &Raster,
    size: u32,
) -> Result<SymbolSequence, RecognitionError> {
    if raster.width() == 0 || raster.height() == 0 {
        return Err(RecognitionError::EmptyRaster {
            width: raster.width(),
            height: raster.height(),
        });
    }
    let gray = fit_height(raster, size);

    let mut symbols = Vec::new();
    let mut last_class = None;
    for x in window_offsets(gray.width(), size) {
        let window = crop_imm(&gray, x, 0, size, size).to_image();
        let class = classifier.classify(&window)?;
        let symbol = charset.get(class).ok_or_else(|| {
            RecognitionError::MalformedOutput(format!(
                "class {class} is outside a charset of {} symbols",
                charset.len()
            ))
        })?;
        if symbol.is_empty() {
            last_class = None;
            continue;
        }
        if last_class == Some(class) {
            continue;
        }
        last_class = Some(class);
        symbols.push(symbol.clone());
    }
    Ok(SymbolSequence(symbols))
}

/// The ONNX classifier, compiled for one window size.
pub struct WindowClassifier {
    plan: TractSimplePlan,
    size: u32,
}

impl WindowClassifier {
    pub fn size(&self) -> u32 {
        self.size
    }
}

impl Classify for WindowClassifier {
    fn classify(&self, window: &GrayImage) -> Result<usize, RecognitionError> {
        let (width, height) = window.dimensions();
        let tensor: Tensor = tract_ndarray::Array4::from_shape_fn(
            (1_usize, 1_usize, height as usize, width as usize),
            |(_, _, y, x)| ((window[(x as _, y as _)][0] as f32 / 255.) - 0.5) / 0.5,
        )
        .into();
        let result = self
            .plan
            .run(tvec!(tensor))
            .map_err(|e| RecognitionError::Execution(tract_detail(e)))?;
        let logits = result
            .first()
            .ok_or_else(|| RecognitionError::MalformedOutput("classifier produced no output".into()))?
            .to_array_view::<f32>()
            .map_err(|e| RecognitionError::MalformedOutput(tract_detail(e)))?;
        logits
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(class, _)| class)
            .ok_or_else(|| RecognitionError::MalformedOutput("classifier produced no logits".into()))
    }
}

/// Sliding-window predictor loaded from a model directory holding
/// `model.onnx` and `charset.json`.
pub struct LocalPredictor {
    model: InferenceModel,
    charset: Vec<String>,
}

impl LocalPredictor {
    pub fn from_dir(dir: &Path) -> Result<Self, RecognitionError> {
        let load_error = |path: &Path, detail: String| RecognitionError::Load {
            path: path.to_path_buf(),
            detail,
        };

        let charset_path = dir.join(CHARSET_FILE);
        let charset_text =
            fs::read_to_string(&charset_path).map_err(|e| load_error(&charset_path, e.to_string()))?;
        let charset: Vec<String> = serde_json::from_str(&charset_text)
            .map_err(|e| load_error(&charset_path, e.to_string()))?;
        if charset.is_empty() {
            return Err(load_error(&charset_path, "charset is empty".into()));
        }

        let model_path = dir.join(MODEL_FILE);
        if !model_path.is_file() {
            return Err(load_error(&model_path, "file not found".into()));
        }
        let model = tract_onnx::onnx()
            .model_for_path(&model_path)
            .map_err(|e| load_error(&model_path, tract_detail(e)))?;

        Ok(LocalPredictor { model, charset })
    }

    /// Compile the model for square windows of side `size`.
    pub fn configure(&self, size: u32) -> Result<WindowClassifier, RecognitionError> {
        info!(height = size, width = size, "image size");
        let input_shape = tvec!(1, 1, size as usize, size as usize);
        let plan = self
            .model
            .clone()
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), input_shape))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| RecognitionError::Execution(tract_detail(e)))?;
        Ok(WindowClassifier { plan, size })
    }

    pub fn predict(&self, raster: &Raster, size: u32) -> Result<SymbolSequence, RecognitionError> {
        let classifier = self.configure(size)?;
        let symbols = scan(&classifier, &self.charset, raster, classifier.size())?;
        info!(length = symbols.len(), "scanned symbols");
        Ok(symbols)
    }
}

impl RecognitionBackend for LocalPredictor {
    fn name(&self) -> &'static str {
        "predictor"
    }

    fn recognize(&self, raster: &Raster, size_hint: u32) -> Result<String, RecognitionError> {
        Ok(self.predict(raster, size_hint)?.into_text())
    }
}
