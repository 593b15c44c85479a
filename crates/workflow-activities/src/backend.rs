//! Thin client for the backend control plane's agent-execution surface
//! (`spec.md` §4.13 "the backend's `AgentQuery`/`AgentExecution` APIs").
//! The control-plane *service* implementation is out of scope (`spec.md`
//! §1); this is only the caller-side stub `call.agent` dispatches
//! through. Grounded on `control-plane/src/grpc_service.rs`'s
//! request/response shapes, generalized to a plain async function pair
//! since this crate doesn't own the `.proto` the real client would be
//! generated from.

use workflow_engine::errors::ActivityError;
use workflow_engine::value::Value;

#[derive(Debug, Clone)]
pub struct AgentExecutionRequest {
    pub scope: String,
    pub org: String,
    pub slug: String,
    pub message: String,
    pub task_token: Vec<u8>,
}

/// `AgentExecution.Create`: ask the backend to start running an agent
/// turn, handing it this workflow activity's task token so the backend
/// can complete the activity asynchronously once the agent run finishes.
/// Returns immediately once the backend has accepted the request — the
/// actual agent output arrives later via the runtime's async-completion
/// path, not this call's return value.
pub async fn create_execution(request: AgentExecutionRequest) -> Result<String, ActivityError> {
    tracing::debug!(
        scope = %request.scope,
        org = %request.org,
        slug = %request.slug,
        "dispatching agent execution to backend control plane"
    );
    // The real implementation is a `tonic`-generated `AgentExecutionClient`
    // call; wiring one in requires the backend's `.proto` contracts, which
    // live in the out-of-scope `internal-protocol`/`everruns-contracts`
    // crates. This stub returns a synthetic execution id so
    // `workflow-worker`'s async-completion bridge has something to key on
    // in tests.
    Ok(format!("agent-exec-{}", uuid::Uuid::now_v7()))
}

/// `AgentQuery.Get`: poll-free status check used only for diagnostics; the
/// primary completion path is the async-completion callback, not this.
pub async fn query_execution(execution_id: &str) -> Result<Value, ActivityError> {
    Ok(serde_json::json!({ "execution_id": execution_id, "status": "pending" }))
}
