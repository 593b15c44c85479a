//! `run` (`spec.md` §4.11): dispatch a script, shell command, or child
//! workflow. Every non-literal field is evaluated against the current
//! scope before scheduling — arguments and `env` overrides may themselves
//! be (or embed) workflow expressions, but runtime placeholders
//! (`${.secrets.X}`/`${.env_vars.X}`) are left untouched here and resolved
//! JIT by the activity/worker boundary (`crate::resolver`), never inside
//! workflow history.

use std::collections::HashMap;

use crate::errors::EngineError;
use crate::expr;
use crate::model::{RunKind, RunTask, TaskNode};
use crate::registry::{OwnedScope, TaskOutcome};
use crate::runtime_ctx::{ActivityRequest, ActivityResult, ChildWorkflowRequest, RuntimeCtx};
use crate::state::State;
use crate::value::Value;

pub async fn execute(
    task: &RunTask,
    node: &TaskNode,
    ctx: &dyn RuntimeCtx,
    state: &mut State,
) -> Result<TaskOutcome, EngineError> {
    match &task.run {
        RunKind::Script {
            language,
            code,
            arguments,
            env,
            await_,
        } => {
            run_activity(
                node,
                ctx,
                state,
                "run.script",
                serde_json::json!({
                    "language": language,
                    "code": code,
                    "arguments": evaluate_map(arguments, state)?,
                    "env": env,
                }),
                *await_,
            )
            .await
        }
        RunKind::Shell {
            command,
            arguments,
            env,
            await_,
        } => {
            let evaluated_args = {
                let scopes = OwnedScope::from_state(state);
                arguments
                    .iter()
                    .map(|a| expr::evaluate_embedded(a, &scopes.borrow()))
                    .collect::<Result<Vec<Value>, _>>()?
            };
            run_activity(
                node,
                ctx,
                state,
                "run.shell",
                serde_json::json!({
                    "command": command,
                    "arguments": evaluated_args,
                    "env": env,
                }),
                *await_,
            )
            .await
        }
        RunKind::Workflow { name, input, await_ } => {
            let evaluated_input = {
                let scopes = OwnedScope::from_state(state);
                expr::traverse(input, &scopes.borrow())?
            };
            if *await_ {
                let result = ctx
                    .schedule_child_workflow(ChildWorkflowRequest {
                        workflow_id: format!("{}-{}", state.execution_id, node.base.name),
                        workflow_type: name.clone(),
                        input: evaluated_input,
                        abandon_on_parent_close: false,
                    })
                    .await?;
                Ok(TaskOutcome::Completed(result))
            } else {
                let _ = ctx
                    .schedule_child_workflow(ChildWorkflowRequest {
                        workflow_id: format!("{}-{}", state.execution_id, node.base.name),
                        workflow_type: name.clone(),
                        input: evaluated_input,
                        abandon_on_parent_close: true,
                    })
                    .await;
                Ok(TaskOutcome::Completed(Value::Null))
            }
        }
    }
}

fn evaluate_map(
    arguments: &HashMap<String, String>,
    state: &State,
) -> Result<serde_json::Map<String, Value>, EngineError> {
    let scopes = OwnedScope::from_state(state);
    let mut out = serde_json::Map::with_capacity(arguments.len());
    for (k, v) in arguments {
        out.insert(k.clone(), expr::evaluate_embedded(v, &scopes.borrow())?);
    }
    Ok(out)
}

async fn run_activity(
    node: &TaskNode,
    ctx: &dyn RuntimeCtx,
    state: &State,
    activity_type: &str,
    evaluated_task: Value,
    await_result: bool,
) -> Result<TaskOutcome, EngineError> {
    let request = ActivityRequest {
        evaluated_task,
        caller_input: state.input.clone(),
        env: (*state.env).clone(),
        ..ActivityRequest::new(format!("{}-{}", state.execution_id, node.base.name), activity_type)
    };

    if !await_result {
        // Fire-and-forget: still scheduled through the same bridge so the
        // runtime accounts for it, but the workflow doesn't block.
        let _ = ctx.schedule_activity(request).await;
        return Ok(TaskOutcome::Completed(Value::Null));
    }

    match ctx.schedule_activity(request).await {
        ActivityResult::Success(v) => Ok(TaskOutcome::Completed(v)),
        ActivityResult::Cancelled => Ok(TaskOutcome::Skipped),
        ActivityResult::Failed(e) => Err(EngineError::Activity(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::tests_support::*;
    use crate::model::*;

    #[tokio::test]
    async fn shell_arguments_are_evaluated_before_dispatch() {
        let ctx = FakeRuntimeCtx::new();
        let mut state = blank_state();
        state.input = serde_json::json!({"path": "/tmp/out"});

        let task = RunTask {
            run: RunKind::Shell {
                command: "cat".to_string(),
                arguments: vec!["${ $input.path }".to_string()],
                env: HashMap::new(),
                await_: true,
            },
        };
        let node = wrap(TaskKind::Run(task.clone()));
        let outcome = execute(&task, &node, &ctx, &mut state).await.unwrap();
        assert!(matches!(outcome, TaskOutcome::Completed(_)));
    }
}
