//! `try`/`catch` (`spec.md` §4.9): run the `try` block's tasks in sequence;
//! on an [`EngineError`] that isn't [`EngineError::Panic`] or a
//! continue-as-new in flight, run the `catch` block with the error exposed
//! to its scope and let it replace the outcome. A continue-as-new signal
//! from inside `try` propagates straight through without invoking `catch` —
//! it isn't a failure, it's a suspend-and-resume.

use crate::errors::EngineError;
use crate::model::{TaskNode, TryTask};
use crate::registry::{BuilderRegistry, TaskOutcome};
use crate::runtime_ctx::RuntimeCtx;
use crate::state::State;
use crate::value::Value;

pub async fn execute<'a>(
    registry: &'a BuilderRegistry,
    task: &'a TryTask,
    _node: &'a TaskNode,
    ctx: &'a dyn RuntimeCtx,
    _input: Value,
    state: &'a mut State,
) -> Result<TaskOutcome, EngineError> {
    match run_sequence(registry, &task.try_, ctx, state).await {
        Ok(outcome) => Ok(outcome),
        Err(EngineError::Panic) => Err(EngineError::Panic),
        Err(err) => {
            state
                .data
                .insert("error".to_string(), error_to_value(&err));
            run_sequence(registry, &task.catch_do, ctx, state).await
        }
    }
}

fn error_to_value(err: &EngineError) -> Value {
    match err {
        EngineError::Raised(dsl) => serde_json::json!({
            "type": dsl.r#type,
            "status": dsl.status,
            "title": dsl.title,
            "detail": dsl.detail,
            "instance": dsl.instance,
        }),
        EngineError::Activity(activity) => serde_json::json!({
            "type": activity.error_type,
            "detail": activity.message,
            "retryable": activity.retryable,
        }),
        other => serde_json::json!({ "type": "engine-error", "detail": other.to_string() }),
    }
}

async fn run_sequence(
    registry: &BuilderRegistry,
    tasks: &[TaskNode],
    ctx: &dyn RuntimeCtx,
    state: &mut State,
) -> Result<TaskOutcome, EngineError> {
    let mut last = Value::Null;
    for child in tasks {
        if !registry.should_run(child, state)? {
            continue;
        }
        registry.validate_input(child, &state.input)?;
        let outcome = registry
            .execute(child, ctx, state.input.clone(), state)
            .await?;
        match outcome {
            TaskOutcome::ContinueAsNew(carrier) => return Ok(TaskOutcome::ContinueAsNew(carrier)),
            TaskOutcome::Skipped => continue,
            TaskOutcome::Completed(raw) => {
                let processed = registry.process_task_output(child, &raw, state)?;
                state.record_task_data(&child.base.name, processed.clone());
                if let Some(exported) = registry.process_task_export(child, &processed, state)? {
                    state.record_task_export(&child.base.name, exported);
                }
                last = processed;
            }
        }
    }
    Ok(TaskOutcome::Completed(last))
}
