use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use gotcha::config::{
    DEFAULT_DEBUG_IMAGE, DEFAULT_GRAPH_DIR, DEFAULT_INPUT_NODE, DEFAULT_OUTPUT,
    DEFAULT_OUTPUT_NODE, DEFAULT_PREDICTOR_DIR, DEFAULT_SERVING_TAG, DEFAULT_SIZE_HINT,
};
use gotcha::{BackendChoice, GraphSpec, Pipeline, PipelineConfig};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendArg {
    /// Sliding-window classifier from --model-dir.
    Predictor,
    /// Inference graph fed the encoded image bytes.
    Graph,
}

/// gotcha is a tool for recognizing simple captcha image files.
#[derive(Parser, Debug)]
#[command(name = "gotcha", version)]
struct Cli {
    /// File path of the captcha image.
    #[arg(short, long, env = "GOTCHA_INPUT")]
    input: PathBuf,

    /// File path for the recognized text.
    #[arg(short, long, env = "GOTCHA_OUTPUT", default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Resize factor applied to the captcha before recognition.
    #[arg(short, long, env = "GOTCHA_RESIZE", default_value_t = 2.0,
          value_parser = positive_factor)]
    resize: f64,

    /// Recognition backend.
    #[arg(long, env = "GOTCHA_BACKEND", value_enum, default_value = "predictor")]
    backend: BackendArg,

    /// Model directory. Defaults to tf_model for the predictor and
    /// tensorflow_savedmodel_captcha for the graph.
    #[arg(long, env = "GOTCHA_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    /// Side of the square recognition window.
    #[arg(long, env = "GOTCHA_SIZE_HINT", default_value_t = DEFAULT_SIZE_HINT,
          value_parser = clap::value_parser!(u32).range(1..))]
    size_hint: u32,

    /// Where the preprocessed image is written for inspection.
    #[arg(long, env = "GOTCHA_DEBUG_IMAGE", default_value = DEFAULT_DEBUG_IMAGE)]
    debug_image: PathBuf,

    /// Give up on recognition after this many seconds.
    #[arg(long, env = "GOTCHA_TIMEOUT", value_parser = positive_seconds)]
    timeout: Option<Duration>,

    /// JSON transform recipe replacing the built-in one.
    #[arg(long, env = "GOTCHA_RECIPE")]
    recipe: Option<PathBuf>,

    /// Serving tag of the inference graph.
    #[arg(long, env = "GOTCHA_SERVING_TAG", default_value = DEFAULT_SERVING_TAG)]
    serving_tag: String,

    /// Graph node receiving the encoded image bytes.
    #[arg(long, env = "GOTCHA_INPUT_NODE", default_value = DEFAULT_INPUT_NODE)]
    input_node: String,

    /// Graph node producing the text.
    #[arg(long, env = "GOTCHA_OUTPUT_NODE", default_value = DEFAULT_OUTPUT_NODE)]
    output_node: String,
}

fn positive_factor(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(format!("must be greater than zero, got {value}"))
    }
}

fn positive_seconds(s: &str) -> Result<Duration, String> {
    let secs = positive_factor(s)?;
    let timeout = Duration::try_from_secs_f64(secs)
        .map_err(|_| format!("{secs} seconds is out of range"))?;
    if timeout.is_zero() {
        return Err(format!("{secs} seconds rounds down to zero"));
    }
    Ok(timeout)
}

impl Cli {
    fn into_config(self) -> PipelineConfig {
        let backend = match self.backend {
            BackendArg::Predictor => BackendChoice::Predictor {
                model_dir: self
                    .model_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_PREDICTOR_DIR)),
            },
            BackendArg::Graph => BackendChoice::Graph(GraphSpec {
                dir: self
                    .model_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_GRAPH_DIR)),
                serving_tag: self.serving_tag,
                input_node: self.input_node,
                output_node: self.output_node,
            }),
        };
        PipelineConfig {
            input: self.input,
            output: self.output,
            resize_factor: self.resize,
            size_hint: self.size_hint,
            debug_image: self.debug_image,
            backend,
            timeout: self.timeout,
            recipe: self.recipe,
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.into_config();
    let input = config.input.clone();
    let output = config.output.clone();
    let pipeline = Pipeline::new(config).context("invalid configuration")?;
    pipeline.run().with_context(|| {
        format!(
            "failed to solve '{}' into '{}'",
            input.display(),
            output.display()
        )
    })?;
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gotcha=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_in_range() {
        assert_eq!(positive_seconds("1.5"), Ok(Duration::from_millis(1500)));
    }

    #[test]
    fn seconds_out_of_range() {
        for bad in ["0", "-3", "1e20", "inf", "NaN", "1e-12", "soon"] {
            assert!(positive_seconds(bad).is_err(), "{bad} accepted");
        }
    }

    #[test]
    fn timeout_reaches_config() {
        let cli = Cli::try_parse_from(["gotcha", "-i", "captcha.png", "--timeout", "2"]).unwrap();
        assert_eq!(cli.into_config().timeout, Some(Duration::from_secs(2)));
    }
}
