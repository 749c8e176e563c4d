//! Recognise the text in simple captcha images.
//!
//! A run decodes the image, applies a [`Recipe`] of transforms, hands the
//! result to a [`RecognitionBackend`] through the fault-isolating [`Solver`]
//! and writes the answer to a file. See [`Pipeline`].

pub mod backend;
pub mod codec;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod preprocess;
pub mod solver;
pub mod transformer;

pub use backend::{InferenceGraph, LocalPredictor, RecognitionBackend, SymbolSequence};
pub use config::{BackendChoice, GraphSpec, PipelineConfig};
pub use error::{Error, RecognitionError, Result};
pub use pipeline::Pipeline;
pub use preprocess::Preprocessor;
pub use solver::{Recognition, Solver};
pub use transformer::{ImageTransform, Recipe};

/// Decoded image handed between pipeline stages.
pub type Raster = image::RgbImage;
