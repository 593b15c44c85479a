//! Leaf activity implementations for the tasks `workflow-engine`'s builders
//! schedule through [`workflow_engine::runtime_ctx::RuntimeCtx`]:
//! `call.http`, `call.grpc`, `run.script`/`run.shell`, and `call.agent`.
//!
//! This is where JIT secret/env-var resolution and output scanning
//! actually happen (`spec.md` §6): the workflow side never resolves
//! `${.secrets.X}`/`${.env_vars.X}` placeholders itself, so nothing
//! secret-shaped is ever recorded in durable workflow history. Every
//! activity function here resolves its own `evaluated_task` against the
//! env map it's handed, does its I/O, and scans the result for accidental
//! secret leakage before returning it to the runtime.

pub mod agent;
pub mod backend;
pub mod grpc;
pub mod http;
pub mod script;

use workflow_engine::errors::ActivityError;
use workflow_engine::state::EnvMap;
use workflow_engine::value::Value;

/// Resolve placeholders in `evaluated_task` against `env`, erroring out if
/// any referenced secret/env-var name is missing rather than silently
/// sending a literal `${...}` string over the wire.
pub(crate) fn resolve_task(evaluated_task: &Value, env: &EnvMap) -> Result<Value, ActivityError> {
    let missing = workflow_engine::resolver::collect_missing(evaluated_task, env);
    if !missing.is_empty() {
        return Err(ActivityError::non_retryable(format!(
            "missing runtime environment variables: {}",
            missing.join(", ")
        ))
        .with_type("MissingEnv"));
    }
    Ok(workflow_engine::resolver::resolve(evaluated_task, env))
}

/// Scan an activity's result for values that look like a secret before
/// handing it back to the workflow (advisory only — never mutates).
pub(crate) fn sanitize_result(result: &Value, env: &EnvMap) {
    workflow_engine::resolver::sanitize_output(result, env);
}
