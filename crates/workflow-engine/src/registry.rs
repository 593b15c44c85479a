//! Task builder dispatch (`spec.md` §4.1).
//!
//! Grounded on the dispatch-by-type-name registry in
//! `durable::engine::registry` and the per-kind lifecycle hooks in
//! `durable::engine::executor`, generalized from the single-workflow-type
//! callback state machines in `agent_run.rs`/`turn_workflow.rs` into a
//! builder-per-task-kind interpreter. Builders are plain async functions
//! (see `crate::builders`) rather than boxed `ExecutionFn` trait objects:
//! Rust's recursive-async story favors `Pin<Box<dyn Future>>` call sites
//! over constructing closures ahead of time, and the registry still
//! performs the exhaustive kind-match `Build()`/`ShouldRun()`/
//! `ParseMetadata()` dispatch the spec describes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::builders;
use crate::claim_check::{ClaimCheckManager, NoopClaimCheck};
use crate::errors::EngineError;
use crate::expr::{self, Scope};
use crate::model::{FlowDirective, TaskKind, TaskNode};
use crate::runtime_ctx::RuntimeCtx;
use crate::state::State;
use crate::value::Value;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of executing one task node.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Completed(Value),
    Skipped,
    ContinueAsNew(crate::runtime_ctx::ContinueAsNewCarrier),
}

/// Shared configuration consulted by every builder: the claim-check
/// decorator and the continue-as-new history-length override.
pub struct BuilderRegistry {
    pub claim_check: Arc<dyn ClaimCheckManager>,
    /// If the runtime's recorded history length exceeds this, the `do`
    /// sequencer triggers continue-as-new even without the runtime's own
    /// suggestion (`spec.md` §4.5 step 1).
    pub history_length_override: u64,
}

impl Default for BuilderRegistry {
    fn default() -> Self {
        Self {
            claim_check: Arc::new(NoopClaimCheck),
            history_length_override: u64::MAX,
        }
    }
}

impl BuilderRegistry {
    pub fn new(claim_check: Arc<dyn ClaimCheckManager>, history_length_override: u64) -> Self {
        Self {
            claim_check,
            history_length_override,
        }
    }

    /// `ShouldRun(State) → bool | Error` (`spec.md` §4.1).
    pub fn should_run(&self, node: &TaskNode, state: &State) -> Result<bool, EngineError> {
        match &node.base.if_expr {
            None => Ok(true),
            Some(expr_str) => {
                let scopes = OwnedScope::from_state(state);
                match expr::evaluate_bool(expr_str, &scopes.borrow())? {
                    Some(b) => Ok(b),
                    None => Err(EngineError::Expression(crate::errors::ExpressionError(
                        format!("`if` on task {} did not evaluate to a bool", node.base.name),
                    ))),
                }
            }
        }
    }

    /// `ParseMetadata(RuntimeCtx, State) → Error` (`spec.md` §4.1): deep
    /// clones `TaskBase.metadata`, evaluates embedded expressions, and
    /// extracts the `searchAttributes` sub-map.
    pub fn parse_metadata(
        &self,
        node: &TaskNode,
        state: &State,
    ) -> Result<serde_json::Map<String, Value>, EngineError> {
        let scopes = OwnedScope::from_state(state);
        let evaluated = expr::traverse(&Value::Object(node.base.metadata.clone()), &scopes.borrow())?;
        Ok(evaluated.as_object().cloned().unwrap_or_default())
    }

    pub fn never_skip_can(&self, node: &TaskNode) -> bool {
        node.kind.never_skip_can()
    }

    /// Validate `State.Input` against `task.input.schema` (`spec.md` §4.5
    /// step 5). `ValidationError` is non-retryable.
    pub fn validate_input(&self, node: &TaskNode, input: &Value) -> Result<(), EngineError> {
        let Some(schema) = &node.base.input.schema else {
            return Ok(());
        };
        validate_against_schema(schema, input)
            .map_err(|e| EngineError::Validation(crate::errors::ValidationError(e)))
    }

    pub fn validate_output(&self, node: &TaskNode, output: &Value) -> Result<(), EngineError> {
        let Some(schema) = &node.base.output.schema else {
            return Ok(());
        };
        validate_against_schema(schema, output)
            .map_err(|e| EngineError::Validation(crate::errors::ValidationError(e)))
    }

    pub fn validate_export(&self, node: &TaskNode, exported: &Value) -> Result<(), EngineError> {
        let Some(schema) = &node.base.export.schema else {
            return Ok(());
        };
        validate_against_schema(schema, exported)
            .map_err(|e| EngineError::Validation(crate::errors::ValidationError(e)))
    }

    /// `processTaskOutput`: apply `task.output.as`, validate against
    /// `task.output.schema`, and return the new `State.Output`
    /// (`spec.md` §4.3).
    pub fn process_task_output(
        &self,
        node: &TaskNode,
        raw: &Value,
        state: &State,
    ) -> Result<Value, EngineError> {
        let output = match &node.base.output.as_expr {
            Some(expr_str) => {
                let scopes = OwnedScope::from_state(state);
                expr::evaluate_embedded(expr_str, &scopes.borrow())?
            }
            None => raw.clone(),
        };
        self.validate_output(node, &output)?;
        Ok(output)
    }

    /// `processTaskExport`: apply `task.export.as`, validate, and return
    /// the value to be stored at `State.Context[task.name]`.
    pub fn process_task_export(
        &self,
        node: &TaskNode,
        output: &Value,
        state: &State,
    ) -> Result<Option<Value>, EngineError> {
        let Some(expr_str) = &node.base.export.as_expr else {
            return Ok(None);
        };
        let _ = output;
        let scopes = OwnedScope::from_state(state);
        let exported = expr::evaluate_embedded(expr_str, &scopes.borrow())?;
        self.validate_export(node, &exported)?;
        Ok(Some(exported))
    }

    /// Interpret `task.then`: returns the directive to apply after a task
    /// completes (`spec.md` §4.5 step 11). `switch` may instead set this
    /// on the parent `do`'s behalf (`spec.md` §4.8).
    pub fn then_directive(&self, node: &TaskNode) -> FlowDirective {
        node.base.then_directive()
    }

    /// Dispatch a task node by kind (`spec.md` §4.1 `Build`). This is the
    /// one recursive entry point every composite builder calls back into
    /// for its children.
    pub fn execute<'a>(
        &'a self,
        node: &'a TaskNode,
        ctx: &'a dyn RuntimeCtx,
        input: Value,
        state: &'a mut State,
    ) -> BoxFuture<'a, Result<TaskOutcome, EngineError>> {
        Box::pin(async move {
            debug!(task = %node.base.name, kind = node.kind.kind_name(), "dispatching task");
            match &node.kind {
                TaskKind::Do(t) => builders::do_builder::execute(self, t, node, ctx, input, state).await,
                TaskKind::For(t) => builders::for_builder::execute(self, t, node, ctx, input, state).await,
                TaskKind::Fork(t) => builders::fork_builder::execute(self, t, node, ctx, input, state).await,
                TaskKind::Switch(t) => builders::switch_builder::execute(self, t, node, state).await,
                TaskKind::Try(t) => builders::try_builder::execute(self, t, node, ctx, input, state).await,
                TaskKind::Listen(t) => builders::listen_builder::execute(t, node, ctx, state).await,
                TaskKind::Raise(t) => builders::raise_builder::execute(t, node, ctx, state).await,
                TaskKind::Run(t) => builders::run_builder::execute(t, node, ctx, state).await,
                TaskKind::Set(t) => builders::set_builder::execute(t, ctx, state).await,
                TaskKind::Wait(t) => builders::wait_builder::execute(t, ctx).await,
                TaskKind::CallHttp(t) => {
                    builders::call_http_builder::execute(t, node, ctx, state).await
                }
                TaskKind::CallGrpc(t) => {
                    builders::call_grpc_builder::execute(t, node, ctx, state).await
                }
                TaskKind::CallFunction(t) => {
                    builders::call_function_builder::execute(t, node, ctx, state).await
                }
            }
        })
    }
}

/// Owns the `$data`/`$context`/`$env` JSON views built from a `State` for
/// the duration of one expression evaluation, so [`Scope`] can borrow from
/// it without requiring `State` itself to store pre-built `Value`s.
pub struct OwnedScope<'a> {
    input: &'a Value,
    data: Value,
    context: Value,
    env: Value,
    item: Option<&'a Value>,
    index: Option<&'a Value>,
}

impl<'a> OwnedScope<'a> {
    pub fn from_state(state: &'a State) -> Self {
        Self {
            input: &state.input,
            data: state.scope_data(),
            context: state.scope_context(),
            env: state.scope_env(),
            item: state.loop_item.as_ref(),
            index: state.loop_index.as_ref(),
        }
    }

    pub fn with_loop_vars(mut self, item: Option<&'a Value>, index: Option<&'a Value>) -> Self {
        self.item = item;
        self.index = index;
        self
    }

    pub fn borrow(&self) -> Scope<'_> {
        Scope {
            input: self.input,
            data: &self.data,
            context: &self.context,
            env: &self.env,
            item: self.item,
            index: self.index,
        }
    }
}

fn validate_against_schema(schema: &Value, instance: &Value) -> Result<(), String> {
    jsonschema::validate(schema, instance).map_err(|e| e.to_string())
}
