// tests/pipeline_execution_tests.rs
mod common;

use common::*;
use protocol_zero_core::pipeline::{ContextData, Pipeline, PipelineControl, PipelineResult};
use serial_test::serial;

#[tokio::test]
#[serial]
async fn test_pipeline_runs_steps_in_order() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new("ordered", &[("step1", false), ("step2", false), ("step3", false)]);

  pipeline.on("step1", create_simple_handler("step1", " S1"));
  pipeline.on("step2", create_simple_handler("step2", " S2"));
  pipeline.on("step3", create_simple_handler("step3", " S3"));

  let ctx = ContextData::new(TestContext::default());
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap(), PipelineResult::Completed);
  let guard = ctx.read();
  assert_eq!(guard.counter, 3);
  assert_eq!(guard.message, " S1 S2 S3");
  assert_eq!(guard.steps_executed, vec!["step1", "step2", "step3"]);
}

#[tokio::test]
#[serial]
async fn test_before_on_after_run_in_phase_order() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new("phases", &[("only", false)]);

  pipeline.after("only", create_simple_handler("after", "C"));
  pipeline.on("only", create_simple_handler("on", "B"));
  pipeline.before("only", create_simple_handler("before", "A"));

  let ctx = ContextData::new(TestContext::default());
  pipeline.run(ctx.clone()).await.unwrap();

  assert_eq!(ctx.read().message, "ABC");
}

#[tokio::test]
#[serial]
async fn test_pipeline_stops_on_pipeline_control_stop() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new("stopping", &[("stepA", false), ("stopStep", false), ("stepC", false)]);

  pipeline.on("stepA", create_simple_handler("stepA", "A"));
  pipeline.on("stopStep", |ctx: ContextData<TestContext>| async move {
    ctx.write().steps_executed.push("stopStep".to_string());
    Ok::<_, TestError>(PipelineControl::Stop)
  });
  pipeline.on("stepC", create_simple_handler("stepC", "C"));

  let ctx = ContextData::new(TestContext::default());
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap(), PipelineResult::Stopped);
  let guard = ctx.read();
  assert_eq!(guard.message, "A");
  assert_eq!(guard.steps_executed, vec!["stepA", "stopStep"]);
}

#[tokio::test]
#[serial]
async fn test_stop_in_before_phase_skips_on_handlers() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new("early", &[("guarded", false)]);
  pipeline.before("guarded", create_simple_handler("guard", "G"));
  pipeline.on("guarded", create_simple_handler("work", "W"));

  let ctx = ContextData::new(TestContext {
    should_stop_at: Some("guard".to_string()),
    ..Default::default()
  });
  let result = pipeline.run(ctx.clone()).await.unwrap();

  assert_eq!(result, PipelineResult::Stopped);
  assert_eq!(ctx.read().message, "G");
}

#[tokio::test]
#[serial]
async fn test_pipeline_propagates_handler_error() {
  setup_tracing();
  let mut pipeline =
    Pipeline::<TestContext, TestError>::new("failing", &[("good_step", false), ("bad_step", false), ("another_step", false)]);

  pipeline.on("good_step", create_simple_handler("good_step", "Good"));
  pipeline.on("bad_step", create_failing_handler("bad_step", "I am a bad step!"));
  pipeline.on("another_step", create_simple_handler("another_step", "NeverRun"));

  let ctx = ContextData::new(TestContext::default());
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap_err(), TestError::Handler("I am a bad step!".to_string()));
  let guard = ctx.read();
  assert_eq!(guard.message, "Good");
  assert_eq!(guard.steps_executed, vec!["good_step", "bad_step"]);
}

#[tokio::test]
#[serial]
async fn test_pipeline_skips_step_if_condition_met() {
  setup_tracing();
  let mut pipeline =
    Pipeline::<TestContext, TestError>::new("skipping", &[("step1", false), ("step_to_skip", false), ("step3", false)]);

  pipeline.skip_if("step_to_skip", |data: &TestContext| data.counter > 0);
  pipeline.on("step1", create_simple_handler("step1", " S1"));
  pipeline.on("step_to_skip", create_simple_handler("step_to_skip", " SKIPPED"));
  pipeline.on("step3", create_simple_handler("step3", " S3"));

  let ctx = ContextData::new(TestContext::default());
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap(), PipelineResult::Completed);
  assert_eq!(ctx.read().steps_executed, vec!["step1", "step3"]);
}

#[tokio::test]
#[serial]
async fn test_optional_step_without_handlers_is_skipped() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new("optional", &[("step1", false), ("extra", true)]);
  pipeline.on("step1", create_simple_handler("step1", "1"));

  let ctx = ContextData::new(TestContext::default());
  assert_eq!(pipeline.run(ctx.clone()).await.unwrap(), PipelineResult::Completed);
  assert_eq!(ctx.read().counter, 1);
}

#[tokio::test]
#[serial]
async fn test_required_step_without_handlers_fails() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new("incomplete", &[("step1", false), ("missing", false)]);
  pipeline.on("step1", create_simple_handler("step1", "1"));

  let ctx = ContextData::new(TestContext::default());
  match pipeline.run(ctx.clone()).await {
    Err(TestError::Pipeline(msg)) => assert!(msg.contains("missing"), "unexpected message: {}", msg),
    other => panic!("expected a pipeline configuration error, got {:?}", other),
  }
  // Steps before the misconfigured one still ran.
  assert_eq!(ctx.read().counter, 1);
}

#[test]
#[should_panic(expected = "no step named 'nope'")]
fn test_registering_on_unknown_step_panics() {
  let mut pipeline = Pipeline::<TestContext, TestError>::new("wiring", &[("step1", false)]);
  pipeline.on("nope", create_simple_handler("nope", ""));
}

#[test]
fn test_step_names_keep_declaration_order() {
  let pipeline = Pipeline::<TestContext, TestError>::new("names", &[("b", false), ("a", true), ("c", false)]);
  assert_eq!(pipeline.step_names().collect::<Vec<_>>(), vec!["b", "a", "c"]);
  assert_eq!(pipeline.name(), "names");
}

#[test]
fn test_context_data_clones_share_state() {
  let ctx = ContextData::new(TestContext::default());
  let other = ctx.clone();
  other.update(|data| data.counter = 7);
  assert_eq!(ctx.with(|data| data.counter), 7);
  assert_eq!(ctx.snapshot().counter, 7);
}
