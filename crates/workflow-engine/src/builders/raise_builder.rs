//! `raise` (`spec.md` §4.16): construct and throw the DSL-native error
//! envelope. Two error types are sentinels rather than ordinary catchable
//! errors: `"panic"` short-circuits to [`EngineError::Panic`] (never caught
//! by an enclosing `try`), everything else becomes a [`DslError`] that
//! `try`'s catch clause can inspect and recover from.

use crate::errors::{DslError, EngineError};
use crate::model::RaiseTask;
use crate::registry::TaskOutcome;
use crate::runtime_ctx::RuntimeCtx;
use crate::state::State;

const PANIC_SENTINEL: &str = "panic";

pub async fn execute(
    task: &RaiseTask,
    _node: &crate::model::TaskNode,
    ctx: &dyn RuntimeCtx,
    state: &State,
) -> Result<TaskOutcome, EngineError> {
    let _ = state;
    if task.error_type == PANIC_SENTINEL {
        return Err(EngineError::Panic);
    }

    let status = status_for(&task.error_type);
    let error = DslError {
        r#type: task.error_type.clone(),
        status,
        title: task.title.clone(),
        detail: task.detail.clone(),
        instance: ctx.execution_id(),
    };
    Err(EngineError::Raised(error))
}

fn status_for(error_type: &str) -> u16 {
    match error_type {
        "validation" => 400,
        "authentication" => 401,
        "authorization" => 403,
        "not-found" => 404,
        "timeout" => 408,
        "conflict" => 409,
        _ => 500,
    }
}
