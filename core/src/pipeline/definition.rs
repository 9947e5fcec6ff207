// core/src/pipeline/definition.rs

//! `Pipeline<T, E>`: ordered named steps and the handlers attached to them.

use super::context::ContextData;
use super::control::PipelineControl;
use super::error::PipelineError;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed async handler operating on the shared context of a run.
pub type Handler<T, E> =
  Box<dyn Fn(ContextData<T>) -> Pin<Box<dyn Future<Output = Result<PipelineControl, E>> + Send>> + Send + Sync>;

/// Evaluated against the current state right before a step; `true` skips it.
pub type SkipCondition<T> = Arc<dyn Fn(&T) -> bool + Send + Sync + 'static>;

/// The three hook points of a step, executed in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
  Before,
  On,
  After,
}

impl Phase {
  pub const ALL: [Phase; 3] = [Phase::Before, Phase::On, Phase::After];

  pub fn as_str(self) -> &'static str {
    match self {
      Phase::Before => "before",
      Phase::On => "on",
      Phase::After => "after",
    }
  }
}

pub struct StepDef<T> {
  pub name: String,
  /// An optional step without handlers is skipped instead of failing the run.
  pub optional: bool,
  pub skip_if: Option<SkipCondition<T>>,
}

impl<T> std::fmt::Debug for StepDef<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StepDef")
      .field("name", &self.name)
      .field("optional", &self.optional)
      .field("skip_if_present", &self.skip_if.is_some())
      .finish()
  }
}

/// An async workflow over a context `T` whose handlers fail with `E`.
///
/// Steps are declared up front with [`Pipeline::new`]; handlers are attached
/// afterwards with [`Pipeline::before`], [`Pipeline::on`] and
/// [`Pipeline::after`]. Attaching to an undeclared step is a wiring mistake
/// and panics at construction time, never during a run.
pub struct Pipeline<T, E>
where
  T: Send + Sync + 'static,
  E: std::error::Error + From<PipelineError> + Send + Sync + 'static,
{
  pub(crate) name: String,
  pub(crate) steps: Vec<StepDef<T>>,
  pub(crate) handlers: HashMap<(String, Phase), Vec<Handler<T, E>>>,
}

impl<T, E> Pipeline<T, E>
where
  T: Send + Sync + 'static,
  E: std::error::Error + From<PipelineError> + Send + Sync + 'static,
{
  /// Declares a pipeline from `(step_name, optional)` pairs.
  pub fn new(name: impl Into<String>, step_defs: &[(&str, bool)]) -> Self {
    let steps = step_defs
      .iter()
      .map(|(step_name, optional)| StepDef {
        name: (*step_name).to_string(),
        optional: *optional,
        skip_if: None,
      })
      .collect();

    Self {
      name: name.into(),
      steps,
      handlers: HashMap::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn step_names(&self) -> impl Iterator<Item = &str> {
    self.steps.iter().map(|s| s.name.as_str())
  }

  /// Installs a skip condition on an existing step.
  ///
  /// # Panics
  /// If `step_name` was not declared.
  pub fn skip_if(&mut self, step_name: &str, condition: impl Fn(&T) -> bool + Send + Sync + 'static) -> &mut Self {
    let step = self.step_mut(step_name);
    step.skip_if = Some(Arc::new(condition));
    self
  }

  pub fn before<F, UserErr>(
    &mut self,
    step_name: &str,
    handler_fn: impl Fn(ContextData<T>) -> F + Send + Sync + 'static,
  ) -> &mut Self
  where
    F: Future<Output = Result<PipelineControl, UserErr>> + Send + 'static,
    UserErr: Into<E> + Send + Sync + 'static,
  {
    self.attach(step_name, Phase::Before, handler_fn)
  }

  pub fn on<F, UserErr>(
    &mut self,
    step_name: &str,
    handler_fn: impl Fn(ContextData<T>) -> F + Send + Sync + 'static,
  ) -> &mut Self
  where
    F: Future<Output = Result<PipelineControl, UserErr>> + Send + 'static,
    UserErr: Into<E> + Send + Sync + 'static,
  {
    self.attach(step_name, Phase::On, handler_fn)
  }

  pub fn after<F, UserErr>(
    &mut self,
    step_name: &str,
    handler_fn: impl Fn(ContextData<T>) -> F + Send + Sync + 'static,
  ) -> &mut Self
  where
    F: Future<Output = Result<PipelineControl, UserErr>> + Send + 'static,
    UserErr: Into<E> + Send + Sync + 'static,
  {
    self.attach(step_name, Phase::After, handler_fn)
  }

  fn attach<F, UserErr>(
    &mut self,
    step_name: &str,
    phase: Phase,
    handler_fn: impl Fn(ContextData<T>) -> F + Send + Sync + 'static,
  ) -> &mut Self
  where
    F: Future<Output = Result<PipelineControl, UserErr>> + Send + 'static,
    UserErr: Into<E> + Send + Sync + 'static,
  {
    let step_name = self.step_mut(step_name).name.clone();
    let boxed: Handler<T, E> = Box::new(move |ctx| {
      let fut = handler_fn(ctx);
      Box::pin(async move { fut.await.map_err(Into::into) })
    });
    self.handlers.entry((step_name, phase)).or_default().push(boxed);
    self
  }

  pub(crate) fn handlers_for(&self, step_name: &str, phase: Phase) -> &[Handler<T, E>] {
    self
      .handlers
      .get(&(step_name.to_string(), phase))
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }

  fn step_mut(&mut self, step_name: &str) -> &mut StepDef<T> {
    let pipeline_name = self.name.clone();
    match self.steps.iter_mut().find(|s| s.name == step_name) {
      Some(step) => step,
      None => panic!("pipeline '{}' has no step named '{}'", pipeline_name, step_name),
    }
  }
}
