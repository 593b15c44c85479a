//! `for` (`spec.md` §4.6): iterate over the evaluated `in` expression —
//! object (entries), array (items), or integer (range `0..n`) — binding
//! `each`/`at` into loop-local `$item`/`$index`, re-checking `while` before
//! every iteration, and running `do` against a per-iteration branch of
//! `State` that folds back into the parent on completion.

use tracing::warn;

use crate::errors::EngineError;
use crate::expr::{self};
use crate::model::{ForTask, TaskNode};
use crate::registry::{BuilderRegistry, OwnedScope, TaskOutcome};
use crate::runtime_ctx::RuntimeCtx;
use crate::state::State;
use crate::value::Value;

/// Entries paired with whether `in` resolved to a mapping (keyed output) or
/// a list/range (appended output), per the output-accumulation rule in
/// `spec.md` §4.6.
struct Resolved {
    entries: Vec<(Value, Value)>,
    from_mapping: bool,
}

fn resolve_iterable(in_value: &Value) -> Result<Resolved, EngineError> {
    match in_value {
        Value::Object(map) => Ok(Resolved {
            entries: map
                .iter()
                .map(|(k, v)| (Value::String(k.clone()), v.clone()))
                .collect(),
            from_mapping: true,
        }),
        Value::Array(items) => Ok(Resolved {
            entries: items
                .iter()
                .enumerate()
                .map(|(i, v)| (Value::from(i as u64), v.clone()))
                .collect(),
            from_mapping: false,
        }),
        Value::Number(n) => {
            let count = n
                .as_i64()
                .ok_or_else(|| EngineError::Iterable(format!("non-integer `in` value: {n}")))?;
            Ok(Resolved {
                entries: (0..count.max(0))
                    .map(|i| (Value::from(i as u64), Value::from(i)))
                    .collect(),
                from_mapping: false,
            })
        }
        other => Err(EngineError::Iterable(format!(
            "`in` must evaluate to an object, array, or integer, got: {other}"
        ))),
    }
}

pub async fn execute<'a>(
    registry: &'a BuilderRegistry,
    task: &'a ForTask,
    node: &'a TaskNode,
    ctx: &'a dyn RuntimeCtx,
    _input: Value,
    state: &'a mut State,
) -> Result<TaskOutcome, EngineError> {
    let in_value = {
        let scopes = OwnedScope::from_state(state);
        expr::evaluate(&task.in_expr, &scopes.borrow())?
    };
    let resolved = resolve_iterable(&in_value)?;

    let mut list_output: Vec<Value> = Vec::new();
    let mut map_output = serde_json::Map::new();

    for (index, item) in resolved.entries {
        // `while` is re-evaluated before every iteration, including the
        // first; a non-bool result stops the loop with a warning rather
        // than failing the workflow (`spec.md` §4.6).
        if let Some(while_expr) = &task.while_expr {
            let scopes = OwnedScope::from_state(state).with_loop_vars(Some(&item), Some(&index));
            match expr::evaluate_bool(while_expr, &scopes.borrow())? {
                Some(true) => {}
                Some(false) => break,
                None => {
                    warn!(task = %node.base.name, "`while` did not evaluate to a bool; stopping loop");
                    break;
                }
            }
        }

        let mut branch = state.clone_for_branch();
        branch.input = state.input.clone();
        // Bind this iteration's `$item`/`$index` onto the branch so every
        // child task's `OwnedScope::from_state` picks them up automatically
        // (`spec.md` §4.2, §4.6).
        branch.loop_item = Some(item.clone());
        branch.loop_index = Some(index.clone());

        let outcome = run_iteration(registry, task, ctx, &mut branch).await?;

        match outcome {
            TaskOutcome::ContinueAsNew(carrier) => return Ok(TaskOutcome::ContinueAsNew(carrier)),
            TaskOutcome::Skipped => continue,
            TaskOutcome::Completed(v) => {
                state.data = branch.data;
                state.context = branch.context;
                if resolved.from_mapping {
                    let key = index.as_str().map(str::to_string).unwrap_or_else(|| index.to_string());
                    map_output.insert(key, v);
                } else {
                    list_output.push(v);
                }
            }
        }
    }

    let output = if resolved.from_mapping {
        Value::Object(map_output)
    } else {
        Value::Array(list_output)
    };
    Ok(TaskOutcome::Completed(output))
}

async fn run_iteration(
    registry: &BuilderRegistry,
    task: &ForTask,
    ctx: &dyn RuntimeCtx,
    branch: &mut State,
) -> Result<TaskOutcome, EngineError> {
    let mut last = Value::Null;
    for child in &task.do_ {
        if !registry.should_run(child, branch)? {
            continue;
        }
        registry.validate_input(child, &branch.input)?;
        let outcome = registry
            .execute(child, ctx, branch.input.clone(), branch)
            .await?;
        match outcome {
            TaskOutcome::ContinueAsNew(c) => return Ok(TaskOutcome::ContinueAsNew(c)),
            TaskOutcome::Skipped => continue,
            TaskOutcome::Completed(raw) => {
                let processed = registry.process_task_output(child, &raw, branch)?;
                branch.record_task_data(&child.base.name, processed.clone());
                if let Some(exported) = registry.process_task_export(child, &processed, branch)? {
                    branch.record_task_export(&child.base.name, exported);
                }
                last = processed;
            }
        }
    }
    Ok(TaskOutcome::Completed(last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::tests_support::*;
    use crate::model::*;

    #[tokio::test]
    async fn iterates_array_and_binds_item() {
        let registry = BuilderRegistry::default();
        let ctx = FakeRuntimeCtx::new();
        let mut state = blank_state();
        state.input = serde_json::json!({"xs": [10, 20, 30]});

        let body = named_task(
            "square",
            TaskKind::Set(SetTask {
                set: serde_json::json!("${ $item }"),
            }),
        );
        let task = ForTask {
            in_expr: "$input.xs".to_string(),
            at: "index".to_string(),
            each: "item".to_string(),
            while_expr: None,
            do_: vec![body],
        };
        let node = wrap(TaskKind::For(task.clone()));

        let outcome = execute(&registry, &task, &node, &ctx, Value::Null, &mut state)
            .await
            .unwrap();
        match outcome {
            TaskOutcome::Completed(v) => assert_eq!(v, serde_json::json!([10, 20, 30])),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn binds_index_alongside_item() {
        let registry = BuilderRegistry::default();
        let ctx = FakeRuntimeCtx::new();
        let mut state = blank_state();
        state.input = serde_json::json!({"xs": ["a", "b"]});

        let body = named_task(
            "pair",
            TaskKind::Set(SetTask {
                set: serde_json::json!("${ $index }"),
            }),
        );
        let task = ForTask {
            in_expr: "$input.xs".to_string(),
            at: "index".to_string(),
            each: "item".to_string(),
            while_expr: None,
            do_: vec![body],
        };
        let node = wrap(TaskKind::For(task.clone()));

        let outcome = execute(&registry, &task, &node, &ctx, Value::Null, &mut state)
            .await
            .unwrap();
        assert_eq!(outcome_value(outcome), serde_json::json!([0, 1]));
    }

    #[tokio::test]
    async fn mapping_source_accumulates_keyed_output() {
        let registry = BuilderRegistry::default();
        let ctx = FakeRuntimeCtx::new();
        let mut state = blank_state();
        state.input = serde_json::json!({"xs": {"a": 1, "b": 2}});

        let body = named_task(
            "double",
            TaskKind::Set(SetTask {
                set: serde_json::json!("${ $item }"),
            }),
        );
        let task = ForTask {
            in_expr: "$input.xs".to_string(),
            at: "index".to_string(),
            each: "item".to_string(),
            while_expr: None,
            do_: vec![body],
        };
        let node = wrap(TaskKind::For(task.clone()));

        let outcome = execute(&registry, &task, &node, &ctx, Value::Null, &mut state)
            .await
            .unwrap();
        assert_eq!(outcome_value(outcome), serde_json::json!({"a": 1, "b": 2}));
    }

    #[tokio::test]
    async fn while_non_bool_warns_and_stops_without_error() {
        let registry = BuilderRegistry::default();
        let ctx = FakeRuntimeCtx::new();
        let mut state = blank_state();
        state.input = serde_json::json!({"xs": [1, 2, 3]});

        let body = set_task("noop", serde_json::json!(1));
        let task = ForTask {
            in_expr: "$input.xs".to_string(),
            at: "index".to_string(),
            each: "item".to_string(),
            while_expr: Some("$input.xs".to_string()),
            do_: vec![body],
        };
        let node = wrap(TaskKind::For(task.clone()));

        let outcome = execute(&registry, &task, &node, &ctx, Value::Null, &mut state)
            .await
            .unwrap();
        assert_eq!(outcome_value(outcome), serde_json::json!([]));
    }

    #[tokio::test]
    async fn while_false_stops_before_any_iteration() {
        let registry = BuilderRegistry::default();
        let ctx = FakeRuntimeCtx::new();
        let mut state = blank_state();
        state.input = serde_json::json!({"xs": [1, 2, 3]});

        let body = set_task("noop", serde_json::json!(1));
        let task = ForTask {
            in_expr: "$input.xs".to_string(),
            at: "index".to_string(),
            each: "item".to_string(),
            while_expr: Some("false".to_string()),
            do_: vec![body],
        };
        let node = wrap(TaskKind::For(task.clone()));

        let outcome = execute(&registry, &task, &node, &ctx, Value::Null, &mut state)
            .await
            .unwrap();
        assert_eq!(outcome_value(outcome), serde_json::json!([]));
    }

    fn outcome_value(outcome: TaskOutcome) -> Value {
        match outcome {
            TaskOutcome::Completed(v) => v,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
