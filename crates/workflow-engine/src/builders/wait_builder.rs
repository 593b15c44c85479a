//! `wait` (`spec.md` §4.15): a deterministic timer. Cancellation observed
//! after the sleep call returns early is treated as a skip, not an error.

use crate::errors::EngineError;
use crate::expr;
use crate::model::WaitTask;
use crate::registry::TaskOutcome;
use crate::runtime_ctx::RuntimeCtx;
use crate::value::Value;

pub async fn execute(
    task: &WaitTask,
    ctx: &dyn RuntimeCtx,
) -> Result<TaskOutcome, EngineError> {
    let duration = expr::parse_duration(&task.duration)?;
    ctx.sleep(duration).await;
    if ctx.is_cancelled() {
        return Ok(TaskOutcome::Skipped);
    }
    Ok(TaskOutcome::Completed(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::tests_support::*;

    #[tokio::test]
    async fn sleeps_and_completes() {
        let ctx = FakeRuntimeCtx::new();
        let task = WaitTask {
            duration: "PT1S".to_string(),
        };
        let outcome = execute(&task, &ctx).await.unwrap();
        assert!(matches!(outcome, TaskOutcome::Completed(Value::Null)));
    }

    #[tokio::test]
    async fn cancellation_skips_instead_of_erroring() {
        let mut ctx = FakeRuntimeCtx::new();
        ctx.cancelled = true;
        let task = WaitTask {
            duration: "1s".to_string(),
        };
        let outcome = execute(&task, &ctx).await.unwrap();
        assert!(matches!(outcome, TaskOutcome::Skipped));
    }
}
