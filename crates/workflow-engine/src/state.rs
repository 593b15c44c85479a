//! Execution carrier (`spec.md` §3, §4.3).
//!
//! Grounded on the per-branch clone pattern in `worker::turn_workflow`
//! (`AtomContext` cloned per atom invocation) generalized to the engine's
//! `Data`/`Context`/`Output` triple. `Env` is shared by reference across
//! clones per the spec's "shared-resource policy" (§5): it's read-only
//! after workflow start.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::FlowDirective;
use crate::value::Value;

/// One entry of the runtime environment map (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvVar {
    pub value: String,
    pub is_secret: bool,
}

pub type EnvMap = HashMap<String, EnvVar>;

/// Per-workflow-invocation execution carrier.
///
/// `Data`/`Context`/`Output` are deep-copied on [`State::clone_for_branch`];
/// `Env` is an `Arc` shared across every clone, matching "Env may be shared
/// by reference when cloning State for branches" (`spec.md` §5).
#[derive(Debug, Clone)]
pub struct State {
    pub input: Value,
    pub data: serde_json::Map<String, Value>,
    pub context: serde_json::Map<String, Value>,
    pub env: Arc<EnvMap>,
    pub output: Option<Value>,
    pub can_start_from: Option<String>,
    pub execution_id: String,
    /// Set by the `switch` builder to steer the enclosing `do` sequencer's
    /// next-target jump without mutating the (immutable) parsed document
    /// (`spec.md` §4.8). Consumed and cleared by the sequencer after each
    /// child task.
    pub pending_flow: Option<FlowDirective>,
    /// Current `for` loop's `$item`/`$index` binding, set by the `for`
    /// builder on a branch before running the body (`spec.md` §4.6). `None`
    /// outside a loop body; expressions referencing `$item`/`$index` there
    /// fail with `ExpressionError`.
    pub loop_item: Option<Value>,
    pub loop_index: Option<Value>,
}

impl State {
    pub fn new(execution_id: impl Into<String>, input: Value, env: Arc<EnvMap>) -> Self {
        Self {
            input,
            data: serde_json::Map::new(),
            context: serde_json::Map::new(),
            env,
            output: None,
            can_start_from: None,
            execution_id: execution_id.into(),
            pending_flow: None,
            loop_item: None,
            loop_index: None,
        }
    }

    /// Seed a resumed invocation's cursor (post continue-as-new).
    pub fn with_resume_cursor(mut self, can_start_from: Option<String>) -> Self {
        self.can_start_from = can_start_from;
        self
    }

    /// Independent copy for a `fork` branch or `for` iteration: deep copy of
    /// `Data`/`Context`, cleared `Output`, shared `Env`.
    pub fn clone_for_branch(&self) -> Self {
        Self {
            input: self.input.clone(),
            data: self.data.clone(),
            context: self.context.clone(),
            env: Arc::clone(&self.env),
            output: None,
            can_start_from: self.can_start_from.clone(),
            execution_id: self.execution_id.clone(),
            pending_flow: None,
            loop_item: self.loop_item.clone(),
            loop_index: self.loop_index.clone(),
        }
    }

    pub fn clear_output(&mut self) {
        self.output = None;
    }

    /// JSON view of the four evaluation scopes consulted by the expression
    /// layer: `$input`, `$data`, `$context`, `$env`.
    pub fn scope_data(&self) -> Value {
        Value::Object(self.data.clone())
    }

    pub fn scope_context(&self) -> Value {
        Value::Object(self.context.clone())
    }

    pub fn scope_env(&self) -> Value {
        let map: serde_json::Map<String, Value> = self
            .env
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.value.clone())))
            .collect();
        Value::Object(map)
    }

    /// Merge a task result into `Data` under its task name (`spec.md`
    /// invariant: "`T` appears in `State.Data` iff `T` executed
    /// successfully and its `output.as` is not defined or evaluated
    /// non-null").
    pub fn record_task_data(&mut self, task_name: &str, value: Value) {
        if !value.is_null() {
            self.data.insert(task_name.to_string(), value);
        } else {
            self.data.remove(task_name);
        }
    }

    /// Store an `export.as` result under `Context[task.name]`, never
    /// overwriting the whole `Context` map (`spec.md` §4.3).
    pub fn record_task_export(&mut self, task_name: &str, value: Value) {
        if value.is_object() {
            self.context.insert(task_name.to_string(), value);
            return;
        }
        // Open Question #2 (DESIGN.md): non-mapping export while Context is
        // already a mapping stashes the prior context instead of losing it.
        if !self.context.is_empty() && !self.context.contains_key("__previous_context") {
            let previous = Value::Object(self.context.clone());
            self.context.clear();
            self.context.insert("__previous_context".to_string(), previous);
        }
        self.context.insert(task_name.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Arc<EnvMap> {
        Arc::new(HashMap::new())
    }

    #[test]
    fn clone_for_branch_deep_copies_data_and_clears_output() {
        let mut state = State::new("exec-1", Value::Null, env());
        state.data.insert("a".into(), Value::from(1));
        state.output = Some(Value::from("x"));

        let mut branch = state.clone_for_branch();
        assert_eq!(branch.output, None);
        branch.data.insert("b".into(), Value::from(2));

        assert!(!state.data.contains_key("b"));
        assert!(Arc::ptr_eq(&state.env, &branch.env));
    }

    #[test]
    fn record_task_data_removes_null_results() {
        let mut state = State::new("exec-1", Value::Null, env());
        state.record_task_data("t1", Value::from(5));
        assert_eq!(state.data.get("t1"), Some(&Value::from(5)));
        state.record_task_data("t1", Value::Null);
        assert!(!state.data.contains_key("t1"));
    }

    #[test]
    fn record_task_export_preserves_prior_context_on_non_mapping() {
        let mut state = State::new("exec-1", Value::Null, env());
        state.context.insert("prior".into(), Value::from(1));
        state.record_task_export("t2", Value::from("scalar"));
        assert!(state.context.contains_key("__previous_context"));
        assert_eq!(state.context.get("t2"), Some(&Value::from("scalar")));
    }
}
