//! The durable-runtime interface the core consumes (`spec.md` §6).
//!
//! The durable runtime itself is an external collaborator and out of scope
//! to build (`spec.md` §1). This module only specifies the shape of the
//! interface the Task Builder / Executor calls through: schedule
//! activity/child-workflow, timer, side-effect, continue-as-new,
//! query/signal/update, cancellation.
//!
//! Modeled as an `#[async_trait]` rather than the teacher's callback-driven
//! `Workflow` trait (see `durable::workflow::Workflow` /
//! `durable::activity::Activity`) — see `SPEC_FULL.md` §4 and
//! `DESIGN.md` for the rationale: an async seam lets `do`/`for`/`fork`/`try`
//! compose by ordinary function composition instead of a hand-rolled
//! continuation stack, while still only resuming at the suspension points
//! `spec.md` §5 enumerates.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Map;

use crate::errors::{ActivityError, EngineError};
use crate::state::EnvMap;
use crate::value::Value;

/// `(EvaluatedTaskNode, CallerInput, RuntimeEnvMap)` — the activity input
/// envelope from `spec.md` §3. `activity_type` names the activity to
/// dispatch to inside the worker's registry.
#[derive(Debug, Clone)]
pub struct ActivityRequest {
    pub activity_id: String,
    pub activity_type: String,
    pub evaluated_task: Value,
    pub caller_input: Value,
    pub env: EnvMap,
    pub start_to_close_timeout: Option<Duration>,
    pub task_queue: Option<String>,
    pub search_attributes: Map<String, Value>,
}

impl ActivityRequest {
    pub fn new(activity_id: impl Into<String>, activity_type: impl Into<String>) -> Self {
        Self {
            activity_id: activity_id.into(),
            activity_type: activity_type.into(),
            evaluated_task: Value::Null,
            caller_input: Value::Null,
            env: HashMap::new(),
            start_to_close_timeout: None,
            task_queue: None,
            search_attributes: Map::new(),
        }
    }
}

/// What scheduling an activity resolved to. `Cancelled` is distinct from
/// `Failed` so leaf builders can implement "cancellation propagates as
/// skipped, no error" (`spec.md` §4.5 step 8, §7).
#[derive(Debug, Clone)]
pub enum ActivityResult {
    Success(Value),
    Cancelled,
    Failed(ActivityError),
}

#[derive(Debug, Clone)]
pub struct ChildWorkflowRequest {
    pub workflow_id: String,
    pub workflow_type: String,
    pub input: Value,
    /// `true`: parent-close policy is abandon (used for `run.workflow`
    /// with `await=false`); `false`: parent waits/cancels on close.
    pub abandon_on_parent_close: bool,
}

/// The reconstructed invocation envelope handed back to the host after a
/// `do` sequencer decides to continue-as-new (`spec.md` §4.5 step 1).
///
/// Resolves Open Question #3 (`spec.md` §9): the resume cursor travels as a
/// dedicated carrier field rather than a magic `__continue_as_new_from__`
/// key inside user-visible `Data`.
#[derive(Debug, Clone)]
pub struct ContinueAsNewCarrier {
    pub start_from: String,
    pub initial_data: Map<String, Value>,
    pub initial_context: Map<String, Value>,
}

#[async_trait]
pub trait SignalChannel: Send + Sync {
    async fn recv(&self) -> Value;
}

pub type QueryHandler = std::sync::Arc<dyn Fn(Value) -> Result<Value, EngineError> + Send + Sync>;
pub type UpdateHandler = std::sync::Arc<dyn Fn(Value) -> Result<Value, EngineError> + Send + Sync>;

/// The durable-runtime primitives the engine consumes.
#[async_trait]
pub trait RuntimeCtx: Send + Sync {
    fn execution_id(&self) -> String;

    /// Number of history events recorded so far; compared against a
    /// configured override to decide whether to continue-as-new
    /// (`spec.md` §4.5 step 1).
    fn history_length(&self) -> u64;

    /// `true` if the runtime itself is suggesting continue-as-new.
    fn continue_as_new_suggested(&self) -> bool;

    fn is_cancelled(&self) -> bool;

    async fn schedule_activity(&self, request: ActivityRequest) -> ActivityResult;

    async fn schedule_child_workflow(
        &self,
        request: ChildWorkflowRequest,
    ) -> Result<Value, EngineError>;

    /// Deterministic timer sleep; cancellation is observed via
    /// [`RuntimeCtx::is_cancelled`] after the call returns early.
    async fn sleep(&self, duration: Duration);

    /// One-shot deterministic computation: the first computed value is
    /// persisted so replays see the same result (`spec.md` §4.14, §9).
    async fn side_effect(&self, compute: Box<dyn FnOnce() -> Value + Send>) -> Value;

    fn set_query_handler(&self, name: &str, handler: QueryHandler) -> Result<(), EngineError>;

    fn get_signal_channel(&self, name: &str) -> Box<dyn SignalChannel>;

    fn set_update_handler(&self, name: &str, handler: UpdateHandler) -> Result<(), EngineError>;

    /// Awaits `AllHandlersFinished` before continue-as-new so update/signal
    /// handlers drain cleanly (`spec.md` §5).
    async fn await_all_handlers_finished(&self);

    /// Opaque bytes identifying this activity invocation, used by
    /// `call.agent`'s async-completion bridge (`spec.md` §4.13).
    fn task_token(&self) -> Vec<u8>;
}
