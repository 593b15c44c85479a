//! `call.function` (`spec.md` §4.13): dispatch either a named activity or
//! an agent turn. Agent calls are async-completion: the workflow schedules
//! an activity whose *task token* the activity-side bridge
//! (`workflow-activities::agent`) hands off to the backend control plane,
//! and the durable runtime resolves the activity only once the backend
//! reports the agent run finished — this builder never itself polls.

use crate::errors::EngineError;
use crate::expr;
use crate::model::{CallFunctionKind, CallFunctionTask, TaskNode};
use crate::registry::{OwnedScope, TaskOutcome};
use crate::runtime_ctx::{ActivityRequest, ActivityResult, RuntimeCtx};
use crate::state::State;

pub async fn execute(
    task: &CallFunctionTask,
    node: &TaskNode,
    ctx: &dyn RuntimeCtx,
    state: &mut State,
) -> Result<TaskOutcome, EngineError> {
    let (activity_type, evaluated_task) = match &task.call {
        CallFunctionKind::Activity { name, args } => {
            let scopes = OwnedScope::from_state(state);
            let evaluated_args = expr::traverse(args, &scopes.borrow())?;
            (
                name.clone(),
                serde_json::json!({ "name": name, "args": evaluated_args }),
            )
        }
        CallFunctionKind::Agent {
            scope,
            org,
            slug,
            message,
            env,
        } => {
            let evaluated_message = {
                let scopes = OwnedScope::from_state(state);
                expr::evaluate_embedded(message, &scopes.borrow())?
            };
            (
                "call.agent".to_string(),
                serde_json::json!({
                    "scope": scope,
                    "org": org,
                    "slug": slug,
                    "message": evaluated_message,
                    "env": env,
                }),
            )
        }
    };

    let request = ActivityRequest {
        evaluated_task,
        caller_input: state.input.clone(),
        env: (*state.env).clone(),
        ..ActivityRequest::new(
            format!("{}-{}", state.execution_id, node.base.name),
            activity_type,
        )
    };

    match ctx.schedule_activity(request).await {
        ActivityResult::Success(v) => Ok(TaskOutcome::Completed(v)),
        ActivityResult::Cancelled => Ok(TaskOutcome::Skipped),
        ActivityResult::Failed(e) => Err(EngineError::Activity(e)),
    }
}
