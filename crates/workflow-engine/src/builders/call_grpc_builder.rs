//! `call.grpc` (`spec.md` §4.12): evaluate arguments against the current
//! scope and dispatch through the durable runtime. Resolves Open Question
//! #1 (`DESIGN.md`): `proto` only accepts `file://`-scheme descriptor URIs,
//! since the workflow side never reaches out over the network itself —
//! any other scheme is a build-time configuration error, not an activity
//! failure.

use crate::errors::EngineError;
use crate::expr;
use crate::model::{CallGrpcTask, TaskNode};
use crate::registry::{OwnedScope, TaskOutcome};
use crate::runtime_ctx::{ActivityRequest, ActivityResult, RuntimeCtx};
use crate::state::State;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported proto descriptor scheme in `{0}`, only file:// is allowed")]
pub struct GrpcDescriptorError(pub String);

fn validate_proto_uri(uri: &str) -> Result<(), EngineError> {
    if uri.starts_with("file://") {
        return Ok(());
    }
    Err(EngineError::Configuration(
        GrpcDescriptorError(uri.to_string()).to_string(),
    ))
}

pub async fn execute(
    task: &CallGrpcTask,
    node: &TaskNode,
    ctx: &dyn RuntimeCtx,
    state: &mut State,
) -> Result<TaskOutcome, EngineError> {
    validate_proto_uri(&task.proto)?;

    let arguments = {
        let scopes = OwnedScope::from_state(state);
        expr::traverse(&task.arguments, &scopes.borrow())?
    };

    let evaluated_task = serde_json::json!({
        "host": task.host,
        "port": task.port,
        "service": task.service,
        "method": task.method,
        "proto": task.proto,
        "arguments": arguments,
    });

    let request = ActivityRequest {
        evaluated_task,
        caller_input: state.input.clone(),
        env: (*state.env).clone(),
        ..ActivityRequest::new(
            format!("{}-{}", state.execution_id, node.base.name),
            "call.grpc",
        )
    };

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

    #[tokio::test]
    async fn rejects_non_file_proto_scheme() {
        let ctx = FakeRuntimeCtx::new();
        let mut state = blank_state();
        let task = CallGrpcTask {
            host: "localhost".to_string(),
            port: 50051,
            service: "Greeter".to_string(),
            method: "SayHello".to_string(),
            proto: "https://example.com/greeter.proto".to_string(),
            arguments: serde_json::json!({}),
        };
        let node = wrap(crate::model::TaskKind::CallGrpc(task.clone()));
        let err = execute(&task, &node, &ctx, &mut state).await.unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[tokio::test]
    async fn accepts_file_scheme_and_dispatches() {
        let ctx = FakeRuntimeCtx::new();
        let mut state = blank_state();
        let task = CallGrpcTask {
            host: "localhost".to_string(),
            port: 50051,
            service: "Greeter".to_string(),
            method: "SayHello".to_string(),
            proto: "file:///etc/protos/greeter.proto".to_string(),
            arguments: serde_json::json!({"name": "world"}),
        };
        let node = wrap(crate::model::TaskKind::CallGrpc(task.clone()));
        let outcome = execute(&task, &node, &ctx, &mut state).await.unwrap();
        assert!(matches!(outcome, TaskOutcome::Completed(_)));
    }
}
