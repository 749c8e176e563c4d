use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::backend::RecognitionBackend;
use crate::codec;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::preprocess::Preprocessor;
use crate::solver::Solver;
use crate::Raster;

/// Decode, preprocess, solve, write. One captcha per run.
pub struct Pipeline {
    config: PipelineConfig,
    preprocessor: Preprocessor,
}

impl Pipeline {
    /// Validate the configuration and prepare the preprocessor. Nothing is
    /// read from or written to the input and output paths yet.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let preprocessor = Preprocessor::from_config(&config)?;
        Ok(Pipeline {
            config,
            preprocessor,
        })
    }

    /// Run with the backend named in the configuration.
    pub fn run(&self) -> Result<String> {
        let source = codec::decode(&self.config.input)?;
        let backend = self.config.backend.load().map_err(Error::BackendLoad)?;
        info!(backend = backend.name(), "loaded recognition backend");
        self.finish(&source, backend)
    }

    /// Run with an already constructed backend.
    pub fn run_with(&self, backend: Arc<dyn RecognitionBackend>) -> Result<String> {
        let source = codec::decode(&self.config.input)?;
        self.finish(&source, backend)
    }

    fn finish(&self, source: &Raster, backend: Arc<dyn RecognitionBackend>) -> Result<String> {
        let raster = self.preprocessor.preprocess(source)?;
        let text = Solver::new(backend)
            .with_timeout(self.config.timeout)
            .solve(&raster, self.config.size_hint);
        write_output(&self.config.output, &text)?;
        Ok(text)
    }
}

/// Write `text` verbatim, replacing any previous output.
fn write_output(path: &Path, text: &str) -> Result<()> {
    info!(path = %path.display(), "saving output to file");
    fs::write(path, text).map_err(|source| Error::OutputWrite {
        path: path.to_path_buf(),
        source,
    })
}
