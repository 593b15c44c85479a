//! Shared construction helpers for builder unit tests.
//!
//! Builder modules each carry their own focused `#[cfg(test)]` suite; this
//! module exists so none of them have to re-derive a blank [`State`] or a
//! fake [`RuntimeCtx`] from scratch.
#![cfg(test)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{ActivityError, EngineError};
use crate::model::*;
use crate::runtime_ctx::{
    ActivityRequest, ActivityResult, ChildWorkflowRequest, ContinueAsNewCarrier, QueryHandler,
    RuntimeCtx, SignalChannel, UpdateHandler,
};
use crate::state::{EnvMap, State};
use crate::value::Value;

pub fn blank_state() -> State {
    State::new("exec-test", Value::Null, Arc::new(EnvMap::new()))
}

fn base(name: &str) -> TaskBase {
    TaskBase {
        name: name.to_string(),
        if_expr: None,
        input: InputSpec::default(),
        output: OutputSpec::default(),
        export: ExportSpec::default(),
        metadata: serde_json::Map::new(),
        then: None,
    }
}

pub fn named_task(name: &str, kind: TaskKind) -> TaskNode {
    TaskNode {
        id: name.to_string(),
        base: base(name),
        kind,
    }
}

pub fn wrap(kind: TaskKind) -> TaskNode {
    named_task("root", kind)
}

pub fn set_task(name: &str, value: Value) -> TaskNode {
    named_task(name, TaskKind::Set(SetTask { set: value }))
}

pub fn with_export(mut node: TaskNode, expr: &str) -> TaskNode {
    node.base.export.as_expr = Some(expr.to_string());
    node
}

pub fn with_if(mut node: TaskNode, expr: &str) -> TaskNode {
    node.base.if_expr = Some(expr.to_string());
    node
}

pub fn with_then(mut node: TaskNode, then: &str) -> TaskNode {
    node.base.then = Some(then.to_string());
    node
}

/// An in-memory [`RuntimeCtx`] fake: no real activities, no real timers.
/// `schedule_activity` echoes back `evaluated_task` wrapped under `result`
/// so call.* builder tests can assert on the request they built without a
/// network round trip.
pub struct FakeRuntimeCtx {
    pub history_length: u64,
    pub continue_as_new_suggested: bool,
    pub cancelled: bool,
    update_handlers: Mutex<HashMap<String, UpdateHandler>>,
}

impl FakeRuntimeCtx {
    pub fn new() -> Self {
        Self {
            history_length: 0,
            continue_as_new_suggested: false,
            cancelled: false,
            update_handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Invokes a previously-registered `update` handler as the durable
    /// runtime would when the caller's update arrives, letting tests drive
    /// `listen`'s blocking-on-update wait from outside.
    pub fn fire_update(&self, name: &str, payload: Value) -> Result<Value, EngineError> {
        let handler = self
            .update_handlers
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("no update handler registered for {name}"));
        handler(payload)
    }
}

struct NeverSignal;

#[async_trait]
impl SignalChannel for NeverSignal {
    async fn recv(&self) -> Value {
        std::future::pending::<()>().await;
        unreachable!()
    }
}

#[async_trait]
impl RuntimeCtx for FakeRuntimeCtx {
    fn execution_id(&self) -> String {
        "exec-test".to_string()
    }

    fn history_length(&self) -> u64 {
        self.history_length
    }

    fn continue_as_new_suggested(&self) -> bool {
        self.continue_as_new_suggested
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    async fn schedule_activity(&self, request: ActivityRequest) -> ActivityResult {
        ActivityResult::Success(serde_json::json!({
            "echo": request.evaluated_task,
        }))
    }

    async fn schedule_child_workflow(
        &self,
        request: ChildWorkflowRequest,
    ) -> Result<Value, EngineError> {
        Ok(request.input)
    }

    async fn sleep(&self, _duration: Duration) {}

    async fn side_effect(&self, compute: Box<dyn FnOnce() -> Value + Send>) -> Value {
        compute()
    }

    fn set_query_handler(&self, _name: &str, _handler: QueryHandler) -> Result<(), EngineError> {
        Ok(())
    }

    fn get_signal_channel(&self, _name: &str) -> Box<dyn SignalChannel> {
        Box::new(NeverSignal)
    }

    fn set_update_handler(&self, name: &str, handler: UpdateHandler) -> Result<(), EngineError> {
        self.update_handlers
            .lock()
            .unwrap()
            .insert(name.to_string(), handler);
        Ok(())
    }

    async fn await_all_handlers_finished(&self) {}

    fn task_token(&self) -> Vec<u8> {
        b"fake-task-token".to_vec()
    }
}

pub fn failing_activity_error(message: &str) -> ActivityError {
    ActivityError::retryable(message)
}

pub fn env_map(entries: &[(&str, &str, bool)]) -> EnvMap {
    let mut map = HashMap::new();
    for (k, v, secret) in entries {
        map.insert(
            k.to_string(),
            crate::state::EnvVar {
                value: v.to_string(),
                is_secret: *secret,
            },
        );
    }
    map
}
