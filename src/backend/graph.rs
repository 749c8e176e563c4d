use tracing::{debug, info};
use tract_onnx::prelude::*;

use super::{tract_detail, RecognitionBackend};
use crate::codec;
use crate::config::GraphSpec;
use crate::error::RecognitionError;
use crate::Raster;

/// A pre-trained graph that reads encoded image bytes and emits the text.
pub struct InferenceGraph {
    model: InferenceModel,
}

impl InferenceGraph {
    pub fn load(spec: &GraphSpec) -> Result<Self, RecognitionError> {
        let path = spec.model_path();
        let load_error = |detail: String| RecognitionError::Load {
            path: path.clone(),
            detail,
        };
        if !path.is_file() {
            return Err(load_error("file not found".into()));
        }
        let model = tract_onnx::onnx()
            .model_for_path(&path)
            .and_then(|model| model.with_input_names(vec![spec.input_node.as_str()]))
            .and_then(|model| model.with_output_names(vec![spec.output_node.as_str()]))
            .map_err(|e| load_error(tract_detail(e)))?;
        info!(path = %path.display(), tag = %spec.serving_tag, "loaded inference graph");
        Ok(InferenceGraph { model })
    }

    /// Bind `bytes` to the input node, run to the output node and decode the result.
    fn run(&self, bytes: &[u8]) -> Result<String, RecognitionError> {
        let input = Tensor::from_shape::<u8>(&[bytes.len()], bytes)
            .map_err(|e| RecognitionError::Encode(tract_detail(e)))?;
        let plan = self
            .model
            .clone()
            .with_input_fact(0, InferenceFact::dt_shape(u8::datum_type(), tvec!(bytes.len())))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| RecognitionError::Execution(tract_detail(e)))?;
        let outputs = plan
            .run(tvec!(input))
            .map_err(|e| RecognitionError::Execution(tract_detail(e)))?;
        match outputs.first() {
            Some(output) => decode_text(output),
            None => Err(RecognitionError::MalformedOutput(
                "graph produced no outputs".into(),
            )),
        }
    }
}

/// Read the single output value as text. Accepts a string tensor or UTF-8 bytes.
fn decode_text(output: &Tensor) -> Result<String, RecognitionError> {
    let malformed = |e: TractError| RecognitionError::MalformedOutput(tract_detail(e));
    match output.datum_type() {
        DatumType::String => {
            let values = output.as_slice::<String>().map_err(malformed)?;
            match values {
                [text] => Ok(text.clone()),
                _ => Err(RecognitionError::MalformedOutput(format!(
                    "expected one string, got {}",
                    values.len()
                ))),
            }
        }
        DatumType::U8 => {
            let bytes = output.as_slice::<u8>().map_err(malformed)?;
            String::from_utf8(bytes.to_vec())
                .map_err(|e| RecognitionError::MalformedOutput(e.to_string()))
        }
        other => Err(RecognitionError::MalformedOutput(format!(
            "unexpected output type {other:?}"
        ))),
    }
}

impl RecognitionBackend for InferenceGraph {
    fn name(&self) -> &'static str {
        "graph"
    }

    fn recognize(&self, raster: &Raster, _size_hint: u32) -> Result<String, RecognitionError> {
        let bytes =
            codec::encode_jpeg(raster).map_err(|e| RecognitionError::Encode(e.to_string()))?;
        debug!(bytes = bytes.len(), "encoded raster for graph input");
        let text = self.run(&bytes)?;
        info!(text = %text, "solved captcha text");
        Ok(text)
    }
}
