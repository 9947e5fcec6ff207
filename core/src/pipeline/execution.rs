// core/src/pipeline/execution.rs

//! `Pipeline::run`: walks the declared steps in order against one shared context.

use super::context::ContextData;
use super::control::{PipelineControl, PipelineResult};
use super::definition::{Phase, Pipeline};
use super::error::PipelineError;
use tracing::{event, instrument, Instrument, Level};

/// Outcome of running every handler registered for one phase of a step.
enum PhaseOutcome {
  Continue,
  Stopped,
}

impl<T, E> Pipeline<T, E>
where
  T: Send + Sync + 'static,
  E: std::error::Error + From<PipelineError> + Send + Sync + 'static,
{
  /// Executes every step against `ctx_data`.
  ///
  /// A step runs its `before`, `on` and `after` handlers in registration
  /// order. The first handler error aborts the run and is returned unchanged;
  /// a handler returning [`PipelineControl::Stop`] ends the run with
  /// [`PipelineResult::Stopped`].
  #[instrument(
    name = "Pipeline::run",
    skip_all,
    fields(pipeline = %self.name, num_steps = self.steps.len()),
    err(Display)
  )]
  pub async fn run(&self, ctx_data: ContextData<T>) -> Result<PipelineResult, E> {
    event!(Level::DEBUG, "Pipeline execution starting.");

    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_name = step_def.name.as_str();

      if let Some(skip_cond) = &step_def.skip_if {
        let skip = ctx_data.with(|data| skip_cond(data));
        if skip {
          event!(Level::DEBUG, step = step_name, "Step skipped by condition.");
          continue;
        }
      }

      let has_handlers = Phase::ALL
        .iter()
        .any(|phase| !self.handlers_for(step_name, *phase).is_empty());
      if !has_handlers {
        if step_def.optional {
          event!(Level::DEBUG, step = step_name, "Optional step has no handlers, skipping.");
          continue;
        }
        event!(Level::ERROR, step = step_name, "Required step has no handlers.");
        return Err(E::from(PipelineError::HandlerMissing {
          pipeline: self.name.clone(),
          step_name: step_def.name.clone(),
        }));
      }

      let step_span = tracing::info_span!("pipeline_step", step = step_name, step_index = step_idx);
      for phase in Phase::ALL {
        match self.run_phase(step_name, phase, &ctx_data).instrument(step_span.clone()).await? {
          PhaseOutcome::Continue => {}
          PhaseOutcome::Stopped => {
            event!(Level::INFO, step = step_name, phase = phase.as_str(), "Pipeline stopped by handler.");
            return Ok(PipelineResult::Stopped);
          }
        }
      }
    }

    event!(Level::DEBUG, "Pipeline execution completed.");
    Ok(PipelineResult::Completed)
  }

  async fn run_phase(&self, step_name: &str, phase: Phase, ctx_data: &ContextData<T>) -> Result<PhaseOutcome, E> {
    for (handler_idx, handler_fn) in self.handlers_for(step_name, phase).iter().enumerate() {
      match handler_fn(ctx_data.clone()).await {
        Ok(PipelineControl::Continue) => {}
        Ok(PipelineControl::Stop) => return Ok(PhaseOutcome::Stopped),
        Err(e) => {
          event!(
            Level::WARN,
            phase = phase.as_str(),
            handler_index = handler_idx,
            error = %e,
            "Handler failed."
          );
          return Err(e);
        }
      }
    }
    Ok(PhaseOutcome::Continue)
  }
}
