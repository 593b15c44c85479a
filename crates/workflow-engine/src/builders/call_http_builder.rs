//! `call.http` (`spec.md` §4.12): evaluate method/endpoint/headers/query/
//! body against the current scope and hand the request to the durable
//! runtime as an activity. The actual HTTP I/O — including JIT secret
//! resolution and output-scanning — lives in `workflow-activities::http`;
//! this builder only constructs the `ActivityRequest` envelope.

use crate::errors::EngineError;
use crate::expr;
use crate::model::{CallHttpTask, TaskNode};
use crate::registry::{OwnedScope, TaskOutcome};
use crate::runtime_ctx::{ActivityRequest, ActivityResult, RuntimeCtx};
use crate::state::State;
use crate::value::Value;

pub async fn execute(
    task: &CallHttpTask,
    node: &TaskNode,
    ctx: &dyn RuntimeCtx,
    state: &mut State,
) -> Result<TaskOutcome, EngineError> {
    let scopes = OwnedScope::from_state(state);
    let scope = scopes.borrow();

    let endpoint = expr::evaluate_embedded(&task.endpoint, &scope)?;
    let headers = expr::traverse(&Value::Object(task.headers.clone()), &scope)?;
    let query = expr::traverse(&Value::Object(task.query.clone()), &scope)?;
    let body = match &task.body {
        Some(b) => Some(expr::traverse(b, &scope)?),
        None => None,
    };

    let evaluated_task = serde_json::json!({
        "method": task.method,
        "endpoint": endpoint,
        "headers": headers,
        "query": query,
        "body": body,
        "output": output_mode_name(task.output),
        "redirect": task.redirect,
    });

    let request = ActivityRequest {
        evaluated_task,
        caller_input: state.input.clone(),
        env: (*state.env).clone(),
        ..ActivityRequest::new(
            format!("{}-{}", state.execution_id, node.base.name),
            "call.http",
        )
    };

    match ctx.schedule_activity(request).await {
        ActivityResult::Success(v) => Ok(TaskOutcome::Completed(v)),
        ActivityResult::Cancelled => Ok(TaskOutcome::Skipped),
        ActivityResult::Failed(e) => Err(EngineError::Activity(e)),
    }
}

fn output_mode_name(mode: crate::model::HttpOutputMode) -> &'static str {
    use crate::model::HttpOutputMode::*;
    match mode {
        Raw => "raw",
        Response => "response",
        Content => "content",
    }
}
