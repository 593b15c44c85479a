//! `call.agent` activity (`spec.md` §4.13): async-completion bridge.
//!
//! Unlike every other activity in this crate, this one does not resolve
//! its own result — it hands the durable runtime's task token to the
//! backend control plane and returns a sentinel telling the runtime the
//! activity is still pending. Resolution happens later when the backend
//! reports the agent run finished, via whatever completion callback
//! `workflow-worker`'s `RuntimeCtx` adapter exposes (out of scope here:
//! that's runtime plumbing, not activity logic). Grounded on the
//! async-completion/callback-token pattern implied by Temporal's activity
//! completion API as used in `worker/src/durable_worker.rs`.

use workflow_engine::errors::ActivityError;
use workflow_engine::value::Value;

use crate::backend::{self, AgentExecutionRequest};

/// Sentinel the workflow-side builder (and the adapting `RuntimeCtx`) must
/// recognize: "don't mark this activity complete, a later async
/// completion will."
pub const RESULT_PENDING: &str = "__agent_result_pending__";

pub async fn execute(evaluated_task: &Value, task_token: Vec<u8>) -> Result<Value, ActivityError> {
    let scope = evaluated_task["scope"]
        .as_str()
        .ok_or_else(|| ActivityError::non_retryable("missing agent scope"))?
        .to_string();
    let org = evaluated_task["org"]
        .as_str()
        .ok_or_else(|| ActivityError::non_retryable("missing agent org"))?
        .to_string();
    let slug = evaluated_task["slug"]
        .as_str()
        .ok_or_else(|| ActivityError::non_retryable("missing agent slug"))?
        .to_string();
    let message = evaluated_task["message"]
        .as_str()
        .ok_or_else(|| ActivityError::non_retryable("missing agent message"))?
        .to_string();

    let execution_id = backend::create_execution(AgentExecutionRequest {
        scope,
        org,
        slug,
        message,
        task_token,
    })
    .await?;

    Ok(serde_json::json!({
        "status": RESULT_PENDING,
        "execution_id": execution_id,
    }))
}
