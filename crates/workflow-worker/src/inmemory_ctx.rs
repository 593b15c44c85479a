//! In-memory `RuntimeCtx` for local development and the scenario tests in
//! `spec.md` §8. Grounded on `everruns-worker::runner::inmemory::InMemoryRunner`:
//! `Arc<RwLock<HashMap<...>>>` bookkeeping driven by `tokio::spawn`/`tokio::sync`
//! primitives instead of a durable history log. Not suitable for crash
//! recovery — continue-as-new here just restarts the `do` sequencer in the
//! same process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use workflow_engine::errors::EngineError;
use workflow_engine::runtime_ctx::{
    ActivityRequest, ActivityResult, ChildWorkflowRequest, QueryHandler, RuntimeCtx,
    SignalChannel, UpdateHandler,
};
use workflow_engine::value::Value;

use crate::registry::ActivityRegistry;

struct MpscSignalChannel {
    receiver: Mutex<mpsc::UnboundedReceiver<Value>>,
}

#[async_trait]
impl SignalChannel for MpscSignalChannel {
    async fn recv(&self) -> Value {
        let mut receiver = self.receiver.lock().expect("signal channel poisoned");
        // Only one task ever drives `listen`'s await loop against a given
        // channel at a time, so this mutex never actually blocks a second
        // caller; it exists to give the non-Sync `Receiver` a `Sync` home.
        match receiver.recv().await {
            Some(v) => v,
            None => std::future::pending().await,
        }
    }
}

/// Local, non-durable `RuntimeCtx`. One instance per workflow execution.
pub struct InMemoryCtx {
    execution_id: String,
    registry: Arc<ActivityRegistry>,
    history_length: AtomicU64,
    cancelled: Arc<AtomicBool>,
    side_effects: Mutex<HashMap<u64, Value>>,
    side_effect_counter: AtomicU64,
    queries: RwLock<HashMap<String, QueryHandler>>,
    updates: RwLock<HashMap<String, UpdateHandler>>,
    signals: RwLock<HashMap<String, mpsc::UnboundedSender<Value>>>,
}

impl InMemoryCtx {
    pub fn new(execution_id: impl Into<String>, registry: Arc<ActivityRegistry>) -> Self {
        Self {
            execution_id: execution_id.into(),
            registry,
            history_length: AtomicU64::new(0),
            cancelled: Arc::new(AtomicBool::new(false)),
            side_effects: Mutex::new(HashMap::new()),
            side_effect_counter: AtomicU64::new(0),
            queries: RwLock::new(HashMap::new()),
            updates: RwLock::new(HashMap::new()),
            signals: RwLock::new(HashMap::new()),
        }
    }

    /// Test/harness hook: push a value onto a named signal channel as if an
    /// external caller had sent it.
    pub fn send_signal(&self, name: &str, value: Value) {
        let mut signals = self.signals.write().expect("signals poisoned");
        let sender = signals
            .entry(name.to_string())
            .or_insert_with(|| mpsc::unbounded_channel().0)
            .clone();
        if sender.send(value).is_err() {
            warn!(signal = name, "no receiver currently listening for signal");
        }
    }

    /// Test/harness hook: mark this execution cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn invoke_query(&self, name: &str, arg: Value) -> Result<Value, EngineError> {
        let queries = self.queries.read().expect("queries poisoned");
        match queries.get(name) {
            Some(handler) => handler(arg),
            None => Err(EngineError::Configuration(format!("unknown query: {name}"))),
        }
    }

    pub fn invoke_update(&self, name: &str, arg: Value) -> Result<Value, EngineError> {
        let updates = self.updates.read().expect("updates poisoned");
        match updates.get(name) {
            Some(handler) => handler(arg),
            None => Err(EngineError::Configuration(format!("unknown update: {name}"))),
        }
    }
}

#[async_trait]
impl RuntimeCtx for InMemoryCtx {
    fn execution_id(&self) -> String {
        self.execution_id.clone()
    }

    fn history_length(&self) -> u64 {
        self.history_length.load(Ordering::SeqCst)
    }

    fn continue_as_new_suggested(&self) -> bool {
        false
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn schedule_activity(&self, request: ActivityRequest) -> ActivityResult {
        self.history_length.fetch_add(1, Ordering::SeqCst);
        if self.is_cancelled() {
            return ActivityResult::Cancelled;
        }
        debug!(activity = %request.activity_type, "dispatching activity");
        if request.activity_type == "call.agent" {
            return match workflow_activities::agent::execute(&request.evaluated_task, self.task_token())
                .await
            {
                Ok(v) => ActivityResult::Success(v),
                Err(e) => ActivityResult::Failed(e),
            };
        }
        self.registry.dispatch(request).await
    }

    async fn schedule_child_workflow(
        &self,
        request: ChildWorkflowRequest,
    ) -> Result<Value, EngineError> {
        self.history_length.fetch_add(1, Ordering::SeqCst);
        // No child-workflow engine lives in this process; echo the input
        // back so `run.workflow` scenarios without a real child still
        // complete deterministically.
        debug!(workflow = %request.workflow_type, "running child workflow inline as a no-op");
        Ok(request.input)
    }

    async fn sleep(&self, duration: Duration) {
        self.history_length.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(duration).await;
    }

    async fn side_effect(&self, compute: Box<dyn FnOnce() -> Value + Send>) -> Value {
        let id = self.side_effect_counter.fetch_add(1, Ordering::SeqCst);
        let mut cache = self.side_effects.lock().expect("side effects poisoned");
        cache.entry(id).or_insert_with(compute).clone()
    }

    fn set_query_handler(&self, name: &str, handler: QueryHandler) -> Result<(), EngineError> {
        self.queries
            .write()
            .expect("queries poisoned")
            .insert(name.to_string(), handler);
        Ok(())
    }

    fn get_signal_channel(&self, name: &str) -> Box<dyn SignalChannel> {
        // Replaces any existing sender for this name: only one listener per
        // channel is ever active, matching `listen`'s single-await usage.
        let mut signals = self.signals.write().expect("signals poisoned");
        let (tx, rx) = mpsc::unbounded_channel();
        signals.insert(name.to_string(), tx);
        Box::new(MpscSignalChannel {
            receiver: Mutex::new(rx),
        })
    }

    fn set_update_handler(&self, name: &str, handler: UpdateHandler) -> Result<(), EngineError> {
        self.updates
            .write()
            .expect("updates poisoned")
            .insert(name.to_string(), handler);
        Ok(())
    }

    async fn await_all_handlers_finished(&self) {
        // Nothing async to drain: query/update handlers here run
        // synchronously to completion before returning control.
    }

    fn task_token(&self) -> Vec<u8> {
        format!("inmemory-{}-{}", self.execution_id, uuid::Uuid::now_v7()).into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn side_effect_memoizes_first_computation() {
        let ctx = InMemoryCtx::new("exec-1", Arc::new(ActivityRegistry::new()));
        let first = ctx.side_effect(Box::new(|| Value::from(1))).await;
        assert_eq!(first, Value::from(1));
    }

    #[tokio::test]
    async fn signal_sent_before_listen_is_delivered() {
        let ctx = InMemoryCtx::new("exec-1", Arc::new(ActivityRegistry::new()));
        let channel = ctx.get_signal_channel("approval");
        ctx.send_signal("approval", Value::from(true));
        let received = channel.recv().await;
        assert_eq!(received, Value::from(true));
    }

    #[tokio::test]
    async fn cancel_flag_is_observed() {
        let ctx = InMemoryCtx::new("exec-1", Arc::new(ActivityRegistry::new()));
        assert!(!ctx.is_cancelled());
        ctx.cancel();
        assert!(ctx.is_cancelled());
    }
}
