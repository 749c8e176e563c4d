//! Fault isolation around the recognition backend.
//!
//! The solver is the one place where a failure does not stop the run. Every
//! [`RecognitionError`] is logged and resolved to an empty answer, so a
//! captcha that cannot be read still yields an (empty) output file.
//!
//! A backend panic is only contained when a timeout is set, because the
//! backend then runs on a worker thread and the panic surfaces as
//! [`RecognitionError::WorkerPanicked`]. Without a timeout the backend runs
//! on the caller's thread and a panic unwinds through the run.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::backend::RecognitionBackend;
use crate::error::RecognitionError;
use crate::Raster;

/// Outcome of one recognition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognition {
    /// The backend returned non-empty text.
    Text(String),
    /// The backend succeeded but recognised nothing.
    Empty,
    Failed(RecognitionError),
}

impl Recognition {
    fn from_outcome(outcome: Result<String, RecognitionError>) -> Self {
        match outcome {
            Ok(text) if text.is_empty() => Recognition::Empty,
            Ok(text) => Recognition::Text(text),
            Err(e) => Recognition::Failed(e),
        }
    }

    /// The recognised text, or `""` for an empty or failed attempt.
    pub fn text(&self) -> &str {
        match self {
            Recognition::Text(text) => text,
            Recognition::Empty | Recognition::Failed(_) => "",
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Recognition::Text(text) => text,
            Recognition::Empty | Recognition::Failed(_) => String::new(),
        }
    }

    pub fn error(&self) -> Option<&RecognitionError> {
        match self {
            Recognition::Failed(e) => Some(e),
            _ => None,
        }
    }
}

pub struct Solver {
    backend: Arc<dyn RecognitionBackend>,
    timeout: Option<Duration>,
}

impl Solver {
    pub fn new(backend: Arc<dyn RecognitionBackend>) -> Self {
        Solver {
            backend,
            timeout: None,
        }
    }

    /// Bound every backend invocation by `timeout`. The backend then runs on
    /// a worker thread, which is abandoned if it does not answer in time.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the backend and report exactly what happened.
    pub fn resolve(&self, raster: &Raster, size_hint: u32) -> Recognition {
        if raster.width() == 0 || raster.height() == 0 {
            return Recognition::Failed(RecognitionError::EmptyRaster {
                width: raster.width(),
                height: raster.height(),
            });
        }
        let outcome = match self.timeout {
            None => self.backend.recognize(raster, size_hint),
            Some(timeout) => self.recognize_bounded(raster, size_hint, timeout),
        };
        Recognition::from_outcome(outcome)
    }

    /// Like [`Solver::resolve`], flattened to the text. Never fails.
    pub fn solve(&self, raster: &Raster, size_hint: u32) -> String {
        let recognition = self.resolve(raster, size_hint);
        if let Some(e) = recognition.error() {
            warn!(
                backend = self.backend.name(),
                kind = e.kind(),
                error = %e,
                "failed to solve"
            );
        }
        let text = recognition.into_text();
        info!(text = %text, "solved text");
        text
    }

    fn recognize_bounded(
        &self,
        raster: &Raster,
        size_hint: u32,
        timeout: Duration,
    ) -> Result<String, RecognitionError> {
        let (tx, rx) = mpsc::channel();
        let backend = Arc::clone(&self.backend);
        let raster = raster.clone();
        thread::Builder::new()
            .name("gotcha-backend".into())
            .spawn(move || {
                // the receiver is gone once the deadline has passed
                let _ = tx.send(backend.recognize(&raster, size_hint));
            })
            .map_err(|e| RecognitionError::Execution(format!("could not start worker: {e}")))?;

        match rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(RecognitionError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(RecognitionError::WorkerPanicked),
        }
    }
}
