//! Run configuration, built once at process start and never mutated.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transformer::MAX_SIDE;

pub const DEFAULT_OUTPUT: &str = "output.txt";
pub const DEFAULT_RESIZE_FACTOR: f64 = 2.0;
/// Side of the square recognition window.
pub const DEFAULT_SIZE_HINT: u32 = 64;
pub const DEFAULT_DEBUG_IMAGE: &str = "tmp.jpeg";

pub const DEFAULT_PREDICTOR_DIR: &str = "tf_model";
pub const DEFAULT_GRAPH_DIR: &str = "tensorflow_savedmodel_captcha";
pub const DEFAULT_SERVING_TAG: &str = "serve";
pub const DEFAULT_INPUT_NODE: &str = "CAPTCHA/input_image_as_bytes";
pub const DEFAULT_OUTPUT_NODE: &str = "CAPTCHA/prediction";

/// Where the inference graph lives and which nodes to bind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphSpec {
    pub dir: PathBuf,
    pub serving_tag: String,
    pub input_node: String,
    pub output_node: String,
}

impl Default for GraphSpec {
    fn default() -> Self {
        GraphSpec {
            dir: PathBuf::from(DEFAULT_GRAPH_DIR),
            serving_tag: DEFAULT_SERVING_TAG.to_string(),
            input_node: DEFAULT_INPUT_NODE.to_string(),
            output_node: DEFAULT_OUTPUT_NODE.to_string(),
        }
    }
}

impl GraphSpec {
    /// One exported graph file per serving tag: `<dir>/<tag>.onnx`.
    pub fn model_path(&self) -> PathBuf {
        self.dir.join(format!("{}.onnx", self.serving_tag))
    }
}

/// The recognition strategy used for a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendChoice {
    /// Sliding-window classifier loaded from a model directory.
    Predictor { model_dir: PathBuf },
    /// Inference graph fed the encoded image bytes.
    Graph(GraphSpec),
}

impl Default for BackendChoice {
    fn default() -> Self {
        BackendChoice::Predictor {
            model_dir: PathBuf::from(DEFAULT_PREDICTOR_DIR),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub resize_factor: f64,
    pub size_hint: u32,
    pub debug_image: PathBuf,
    pub backend: BackendChoice,
    /// Upper bound on a single backend invocation. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// JSON transform recipe replacing the standard one.
    pub recipe: Option<PathBuf>,
}

impl PipelineConfig {
    /// A configuration with every optional field at its default.
    pub fn new(input: impl Into<PathBuf>) -> Self {
        PipelineConfig {
            input: input.into(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            resize_factor: DEFAULT_RESIZE_FACTOR,
            size_hint: DEFAULT_SIZE_HINT,
            debug_image: PathBuf::from(DEFAULT_DEBUG_IMAGE),
            backend: BackendChoice::default(),
            timeout: None,
            recipe: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.resize_factor.is_finite() || self.resize_factor <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "resize factor must be a positive number, got {}",
                self.resize_factor
            )));
        }
        // Even a one pixel captcha would come out wider than this.
        if self.resize_factor > MAX_SIDE as f64 {
            return Err(Error::InvalidConfig(format!(
                "resize factor {} exceeds {MAX_SIDE}",
                self.resize_factor
            )));
        }
        if self.size_hint == 0 {
            return Err(Error::InvalidConfig(
                "size hint must be at least 1".to_string(),
            ));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(Error::InvalidConfig(
                "timeout must be longer than zero".to_string(),
            ));
        }
        if self.input.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("input path is empty".to_string()));
        }
        Ok(())
    }
}
