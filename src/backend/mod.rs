//! Recognition backends: anything that can turn a preprocessed raster into text.

mod graph;
mod predictor;

pub use graph::InferenceGraph;
pub use predictor::{scan, Classify, LocalPredictor, SymbolSequence, WindowClassifier};

use std::sync::Arc;

use tract_onnx::prelude::*;

use crate::config::BackendChoice;
use crate::error::RecognitionError;
use crate::Raster;

type TractSimplePlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A recognition strategy.
///
/// `size_hint` is the side of the square recognition window. Backends that
/// read the whole image at once are free to ignore it.
pub trait RecognitionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn recognize(&self, raster: &Raster, size_hint: u32) -> Result<String, RecognitionError>;
}

impl BackendChoice {
    /// Load the artifacts for the chosen backend.
    pub fn load(&self) -> Result<Arc<dyn RecognitionBackend>, RecognitionError> {
        let backend: Arc<dyn RecognitionBackend> = match self {
            BackendChoice::Predictor { model_dir } => Arc::new(LocalPredictor::from_dir(model_dir)?),
            BackendChoice::Graph(spec) => Arc::new(InferenceGraph::load(spec)?),
        };
        Ok(backend)
    }
}

fn tract_detail(e: TractError) -> String {
    format!("{e:#}")
}
