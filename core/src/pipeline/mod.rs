// core/src/pipeline/mod.rs

//! A small async step engine.
//!
//! Workflows such as checkout or payment completion are declared as a list of
//! named steps; the server attaches handlers to those steps and runs the
//! pipeline against a per-request context wrapped in [`ContextData`].

pub mod context;
pub mod control;
pub mod definition;
pub mod error;
mod execution;

pub use context::ContextData;
pub use control::{PipelineControl, PipelineResult};
pub use definition::{Handler, Phase, Pipeline, SkipCondition, StepDef};
pub use error::PipelineError;
