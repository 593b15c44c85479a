//! `switch` (`spec.md` §4.8): evaluate cases in document order, run the
//! first whose `when` is true (or the single default case with no `when`),
//! and set the parent `do` sequencer's next-target jump via
//! `State.pending_flow` rather than mutating the immutable parsed
//! document.

use crate::errors::EngineError;
use crate::expr;
use crate::model::{FlowDirective, SwitchTask, TaskNode};
use crate::registry::{OwnedScope, TaskOutcome};
use crate::state::State;
use crate::value::Value;

pub async fn execute(
    _registry: &crate::registry::BuilderRegistry,
    task: &SwitchTask,
    _node: &TaskNode,
    state: &mut State,
) -> Result<TaskOutcome, EngineError> {
    let default_count = task.cases.iter().filter(|c| c.when.is_none()).count();
    if default_count > 1 {
        return Err(EngineError::Configuration(
            "switch may declare at most one default case (no `when`)".to_string(),
        ));
    }

    let mut matched = None;
    for case in &task.cases {
        match &case.when {
            None => {
                matched = Some(case);
                break;
            }
            Some(expr_str) => {
                let scopes = OwnedScope::from_state(state);
                match expr::evaluate_bool(expr_str, &scopes.borrow())? {
                    Some(true) => {
                        matched = Some(case);
                        break;
                    }
                    Some(false) => continue,
                    None => {
                        return Err(EngineError::Expression(crate::errors::ExpressionError(
                            format!("case `{}` when-clause did not evaluate to a bool", case.name),
                        )))
                    }
                }
            }
        }
    }

    let Some(case) = matched else {
        return Ok(TaskOutcome::Completed(Value::Null));
    };

    state.pending_flow = Some(FlowDirective::from_str_opt(case.then.as_deref()));
    Ok(TaskOutcome::Completed(Value::String(case.name.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::tests_support::*;
    use crate::model::*;
    use crate::registry::BuilderRegistry;

    #[tokio::test]
    async fn first_matching_case_wins_and_sets_pending_flow() {
        let registry = BuilderRegistry::default();
        let mut state = blank_state();
        state.input = serde_json::json!({"n": 5});

        let task = SwitchTask {
            cases: vec![
                SwitchCase {
                    name: "small".to_string(),
                    when: Some("$input.n < 3".to_string()),
                    then: Some("done".to_string()),
                },
                SwitchCase {
                    name: "big".to_string(),
                    when: Some("$input.n >= 3".to_string()),
                    then: Some("handle-big".to_string()),
                },
            ],
        };
        let node = wrap(TaskKind::Switch(task.clone()));

        let outcome = execute(&registry, &task, &node, &mut state).await.unwrap();
        match outcome {
            TaskOutcome::Completed(v) => assert_eq!(v, serde_json::json!("big")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(
            state.pending_flow,
            Some(FlowDirective::Jump("handle-big".to_string()))
        );
    }

    #[tokio::test]
    async fn rejects_multiple_default_cases() {
        let registry = BuilderRegistry::default();
        let mut state = blank_state();
        let task = SwitchTask {
            cases: vec![
                SwitchCase {
                    name: "a".to_string(),
                    when: None,
                    then: None,
                },
                SwitchCase {
                    name: "b".to_string(),
                    when: None,
                    then: None,
                },
            ],
        };
        let node = wrap(TaskKind::Switch(task.clone()));
        let err = execute(&registry, &task, &node, &mut state).await.unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }
}
