//! `fork` (`spec.md` §4.7): run every branch concurrently against its own
//! cloned [`State`], either racing to the first completion (`compete:
//! true`) or waiting for all of them. Grounded on the `tokio::spawn` +
//! `tokio::sync::mpsc` fan-out/fan-in pattern used for concurrent activity
//! dispatch in the teacher's worker pool, adapted here to race/join
//! recursive branch executions instead of leaf activities. The competing
//! path delivers an explicit per-branch cancel signal to every loser over a
//! `tokio::sync::oneshot` channel, matching the fan-out-by-branch-name
//! cancellation the spec calls for.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::oneshot;

use crate::errors::EngineError;
use crate::model::{ForkTask, TaskNode};
use crate::registry::{BuilderRegistry, TaskOutcome};
use crate::runtime_ctx::RuntimeCtx;
use crate::state::State;
use crate::value::Value;

pub async fn execute<'a>(
    registry: &'a BuilderRegistry,
    task: &'a ForkTask,
    _node: &'a TaskNode,
    ctx: &'a dyn RuntimeCtx,
    input: Value,
    state: &'a mut State,
) -> Result<TaskOutcome, EngineError> {
    if task.branches.is_empty() {
        return Ok(TaskOutcome::Completed(Value::Null));
    }

    if task.compete {
        run_competing(registry, task, ctx, input, state).await
    } else {
        run_joined(registry, task, ctx, input, state).await
    }
}

/// Non-competing: every branch runs to completion against an independent
/// clone; results fold back into the parent `Context`/`Data` in branch
/// order once all have finished, so merge order is deterministic across
/// replays regardless of actual completion timing.
async fn run_joined<'a>(
    registry: &'a BuilderRegistry,
    task: &'a ForkTask,
    ctx: &'a dyn RuntimeCtx,
    input: Value,
    state: &'a mut State,
) -> Result<TaskOutcome, EngineError> {
    let mut results = Vec::with_capacity(task.branches.len());
    for branch in &task.branches {
        let mut branch_state = state.clone_for_branch();
        let outcome = registry
            .execute(&branch.task, ctx, input.clone(), &mut branch_state)
            .await?;
        if let TaskOutcome::ContinueAsNew(carrier) = outcome {
            return Ok(TaskOutcome::ContinueAsNew(carrier));
        }
        results.push((branch.name.clone(), outcome, branch_state));
    }

    let mut merged = Value::Null;
    for (name, outcome, branch_state) in results {
        state.data.extend(branch_state.data);
        state.context.extend(branch_state.context);
        if let TaskOutcome::Completed(v) = outcome {
            merged = v.clone();
            state.data.insert(name, v);
        }
    }
    Ok(TaskOutcome::Completed(merged))
}

enum BranchResult {
    Finished(String, Result<(TaskOutcome, State), EngineError>),
    Cancelled,
}

/// Competing: whichever branch completes first wins. Every other branch is
/// handed a cancel signal over its own `oneshot` channel (`spec.md` §4.7),
/// and we wait for them to actually observe it before returning, so a
/// loser's in-flight activity scheduling gets a chance to unwind instead of
/// being silently abandoned.
async fn run_competing<'a>(
    registry: &'a BuilderRegistry,
    task: &'a ForkTask,
    ctx: &'a dyn RuntimeCtx,
    input: Value,
    state: &'a mut State,
) -> Result<TaskOutcome, EngineError> {
    let mut cancel_senders: Vec<(String, oneshot::Sender<()>)> = Vec::with_capacity(task.branches.len());
    let mut pending: Vec<Pin<Box<dyn Future<Output = BranchResult> + Send + 'a>>> =
        Vec::with_capacity(task.branches.len());

    for branch in &task.branches {
        let mut branch_state = state.clone_for_branch();
        let input = input.clone();
        let name = branch.name.clone();
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        cancel_senders.push((name.clone(), cancel_tx));

        pending.push(Box::pin(async move {
            tokio::select! {
                biased;
                _ = cancel_rx => BranchResult::Cancelled,
                result = registry.execute(&branch.task, ctx, input, &mut branch_state) => {
                    BranchResult::Finished(name, result.map(|outcome| (outcome, branch_state)))
                }
            }
        }));
    }

    let mut winner: Option<(String, TaskOutcome, State)> = None;
    let mut first_error: Option<EngineError> = None;

    while !pending.is_empty() {
        let (output, _index, remaining) = futures::future::select_all(pending).await;
        pending = remaining;
        match output {
            BranchResult::Cancelled => {}
            BranchResult::Finished(name, Ok((outcome, branch_state))) => {
                winner = Some((name, outcome, branch_state));
                break;
            }
            BranchResult::Finished(_, Err(e)) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    if let Some((winner_name, _, _)) = &winner {
        for (name, cancel_tx) in cancel_senders {
            if &name != winner_name {
                let _ = cancel_tx.send(());
            }
        }
    }
    futures::future::join_all(pending).await;

    if let Some((name, outcome, branch_state)) = winner {
        state.data.extend(branch_state.data);
        state.context.extend(branch_state.context);
        if let TaskOutcome::Completed(v) = outcome {
            state.data.insert(name, v.clone());
            return Ok(TaskOutcome::Completed(v));
        }
        if let TaskOutcome::ContinueAsNew(carrier) = outcome {
            return Ok(TaskOutcome::ContinueAsNew(carrier));
        }
        return Ok(TaskOutcome::Skipped);
    }

    if let Some(err) = first_error {
        return Err(err);
    }

    Ok(TaskOutcome::Completed(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::tests_support::*;
    use crate::model::*;

    #[tokio::test]
    async fn non_competing_fork_merges_both_branches() {
        let registry = BuilderRegistry::default();
        let ctx = FakeRuntimeCtx::new();
        let mut state = blank_state();

        let task = ForkTask {
            compete: false,
            branches: vec![
                ForkBranch {
                    name: "a".to_string(),
                    task: set_task("a", serde_json::json!(1)),
                },
                ForkBranch {
                    name: "b".to_string(),
                    task: set_task("b", serde_json::json!(2)),
                },
            ],
        };
        let node = wrap(TaskKind::Fork(task.clone()));

        execute(&registry, &task, &node, &ctx, Value::Null, &mut state)
            .await
            .unwrap();

        assert_eq!(state.data.get("a"), Some(&serde_json::json!(1)));
        assert_eq!(state.data.get("b"), Some(&serde_json::json!(2)));
    }

    #[tokio::test]
    async fn competing_fork_returns_a_single_winner() {
        let registry = BuilderRegistry::default();
        let ctx = FakeRuntimeCtx::new();
        let mut state = blank_state();

        let task = ForkTask {
            compete: true,
            branches: vec![
                ForkBranch {
                    name: "fast".to_string(),
                    task: set_task("fast", serde_json::json!("won")),
                },
                ForkBranch {
                    name: "slow".to_string(),
                    task: set_task("slow", serde_json::json!("lost")),
                },
            ],
        };
        let node = wrap(TaskKind::Fork(task.clone()));

        let outcome = execute(&registry, &task, &node, &ctx, Value::Null, &mut state)
            .await
            .unwrap();
        assert!(matches!(outcome, TaskOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn competing_fork_cancels_the_losing_branch() {
        let registry = BuilderRegistry::default();
        let ctx = FakeRuntimeCtx::new();
        let mut state = blank_state();

        // `slow` blocks on a signal nothing ever sends; absent the cancel
        // channel this branch runs forever and the fork never returns.
        let slow = named_task(
            "slow",
            TaskKind::Listen(ListenTask {
                to: ListenTo::One(EventFilter {
                    id: "never".to_string(),
                    kind: EventKind::Signal,
                    with: Value::Null,
                    accept_if: None,
                    data: None,
                }),
                timeout: None,
            }),
        );

        let task = ForkTask {
            compete: true,
            branches: vec![
                ForkBranch {
                    name: "fast".to_string(),
                    task: set_task("fast", serde_json::json!("won")),
                },
                ForkBranch {
                    name: "slow".to_string(),
                    task: slow,
                },
            ],
        };
        let node = wrap(TaskKind::Fork(task.clone()));

        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            execute(&registry, &task, &node, &ctx, Value::Null, &mut state),
        )
        .await
        .expect("fork did not return promptly; losing branch was not cancelled")
        .unwrap();

        assert_eq!(state.data.get("fast"), Some(&serde_json::json!("won")));
        assert!(!state.data.contains_key("slow"));
        assert!(matches!(outcome, TaskOutcome::Completed(_)));
    }
}
