//! `set` (`spec.md` §4.14): evaluate a literal/templated document and hand
//! it back as the task's output. Wrapped in [`RuntimeCtx::side_effect`] so a
//! workflow replay observes the same evaluated value rather than
//! re-evaluating (relevant once `set` expressions can reference anything
//! non-deterministic through custom functions).

use crate::errors::EngineError;
use crate::expr;
use crate::model::SetTask;
use crate::registry::{OwnedScope, TaskOutcome};
use crate::runtime_ctx::RuntimeCtx;
use crate::state::State;

pub async fn execute(
    task: &SetTask,
    ctx: &dyn RuntimeCtx,
    state: &mut State,
) -> Result<TaskOutcome, EngineError> {
    let scopes = OwnedScope::from_state(state);
    let evaluated = expr::traverse(&task.set, &scopes.borrow())?;
    let recorded = ctx.side_effect(Box::new(move || evaluated)).await;
    Ok(TaskOutcome::Completed(recorded))
}
