// core/src/pipeline/error.rs

use thiserror::Error;

/// Failures raised by the engine itself rather than by a handler.
///
/// A pipeline's error type must be constructible from this (`E: From<PipelineError>`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
  #[error("pipeline '{pipeline}': required step '{step_name}' has no handlers")]
  HandlerMissing { pipeline: String, step_name: String },
}
