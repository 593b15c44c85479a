//! End-to-end scenarios against an in-process `RuntimeCtx` fake, covering
//! the composed behaviors `spec.md` §8 calls out: a sequential chain that
//! threads export context into a later task, a competing fork, a `for`
//! loop that stops early on `while`, and a `try`/`catch` recovery. Grounded
//! on `everruns-worker::runner::inmemory::InMemoryRunner`'s
//! `tokio::spawn`/`Arc<RwLock<HashMap>>` style, trimmed to what a fake
//! collaborator needs rather than a full adapter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use workflow_engine::errors::{ActivityError, EngineError};
use workflow_engine::model::{
    DoTask, EventFilter, EventKind, ExportSpec, ForTask, ForkBranch, ForkTask, InputSpec,
    ListenTo, OutputSpec, RaiseTask, SetTask, SwitchCase, SwitchTask, TaskBase, TaskKind, TaskNode,
    TryTask, WaitTask,
};
use workflow_engine::registry::{BuilderRegistry, TaskOutcome};
use workflow_engine::runtime_ctx::{
    ActivityRequest, ActivityResult, ChildWorkflowRequest, QueryHandler, RuntimeCtx,
    SignalChannel, UpdateHandler,
};
use workflow_engine::state::{EnvMap, State};
use workflow_engine::value::Value;

struct PendingSignal;

#[async_trait]
impl SignalChannel for PendingSignal {
    async fn recv(&self) -> Value {
        std::future::pending().await
    }
}

/// Echoes its activity's evaluated task as `{"echo": ...}`; everything else
/// is a bare pass-through, just enough to drive the builders under test.
struct ScenarioCtx {
    history_length: AtomicU64,
    side_effects: Mutex<HashMap<u64, Value>>,
    side_effect_counter: AtomicU64,
}

impl ScenarioCtx {
    fn new() -> Self {
        Self {
            history_length: AtomicU64::new(0),
            side_effects: Mutex::new(HashMap::new()),
            side_effect_counter: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl RuntimeCtx for ScenarioCtx {
    fn execution_id(&self) -> String {
        "scenario-exec".to_string()
    }

    fn history_length(&self) -> u64 {
        self.history_length.load(Ordering::SeqCst)
    }

    fn continue_as_new_suggested(&self) -> bool {
        false
    }

    fn is_cancelled(&self) -> bool {
        false
    }

    async fn schedule_activity(&self, request: ActivityRequest) -> ActivityResult {
        self.history_length.fetch_add(1, Ordering::SeqCst);
        ActivityResult::Success(json!({ "echo": request.evaluated_task }))
    }

    async fn schedule_child_workflow(
        &self,
        request: ChildWorkflowRequest,
    ) -> Result<Value, EngineError> {
        Ok(request.input)
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn side_effect(&self, compute: Box<dyn FnOnce() -> Value + Send>) -> Value {
        let id = self.side_effect_counter.fetch_add(1, Ordering::SeqCst);
        let mut cache = self.side_effects.lock().unwrap();
        cache.entry(id).or_insert_with(compute).clone()
    }

    fn set_query_handler(&self, _name: &str, _handler: QueryHandler) -> Result<(), EngineError> {
        Ok(())
    }

    fn get_signal_channel(&self, _name: &str) -> Box<dyn SignalChannel> {
        Box::new(PendingSignal)
    }

    fn set_update_handler(&self, _name: &str, _handler: UpdateHandler) -> Result<(), EngineError> {
        Ok(())
    }

    async fn await_all_handlers_finished(&self) {}

    fn task_token(&self) -> Vec<u8> {
        b"scenario-token".to_vec()
    }
}

fn state() -> State {
    State::new("scenario-exec", Value::Null, Arc::new(EnvMap::new()))
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

fn node(name: &str, kind: TaskKind) -> TaskNode {
    TaskNode {
        id: name.to_string(),
        base: base(name),
        kind,
    }
}

fn set_task(name: &str, value: Value) -> TaskNode {
    node(name, TaskKind::Set(SetTask { set: value }))
}

fn with_export(mut n: TaskNode, expr: &str) -> TaskNode {
    n.base.export.as_expr = Some(expr.to_string());
    n
}

fn do_node(name: &str, children: Vec<TaskNode>) -> TaskNode {
    node(name, TaskKind::Do(DoTask { tasks: children }))
}

#[tokio::test]
async fn sequential_chain_threads_export_into_second_task() {
    let registry = BuilderRegistry::default();
    let ctx = ScenarioCtx::new();
    let mut st = state();

    let root = do_node(
        "root",
        vec![
            with_export(
                set_task("fetch", json!({ "url": "https://example.test" })),
                "${ $data.fetch }",
            ),
            set_task("combine", Value::String("${ $context.fetch.url }".to_string())),
        ],
    );

    let outcome = registry.execute(&root, &ctx, Value::Null, &mut st).await.unwrap();
    match outcome {
        TaskOutcome::Completed(v) => assert_eq!(v, json!("https://example.test")),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn competing_fork_returns_first_branch_and_cancels_rest() {
    let registry = BuilderRegistry::default();
    let ctx = ScenarioCtx::new();
    let mut st = state();

    let fork = node(
        "race",
        TaskKind::Fork(ForkTask {
            compete: true,
            branches: vec![
                ForkBranch {
                    name: "fast".to_string(),
                    task: set_task("fast", json!("fast-result")),
                },
                ForkBranch {
                    name: "slow".to_string(),
                    task: node(
                        "slow",
                        TaskKind::Wait(WaitTask { duration: "50ms".to_string() }),
                    ),
                },
            ],
        }),
    );

    let outcome = registry.execute(&fork, &ctx, Value::Null, &mut st).await.unwrap();
    match outcome {
        TaskOutcome::Completed(v) => assert_eq!(v, json!("fast-result")),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn for_loop_stops_before_first_iteration_when_while_is_false() {
    let registry = BuilderRegistry::default();
    let ctx = ScenarioCtx::new();
    let mut st = state();
    st.input = json!({ "xs": [1, 2, 3] });

    let for_task = node(
        "loop",
        TaskKind::For(ForTask {
            in_expr: "$input.xs".to_string(),
            at: "index".to_string(),
            each: "item".to_string(),
            while_expr: Some("false".to_string()),
            do_: vec![set_task("touched", json!(true))],
        }),
    );

    registry.execute(&for_task, &ctx, Value::Null, &mut st).await.unwrap();
    assert!(!st.data.contains_key("touched"));
}

#[tokio::test]
async fn try_catch_recovers_from_raised_error() {
    let registry = BuilderRegistry::default();
    let ctx = ScenarioCtx::new();
    let mut st = state();

    let try_task = node(
        "guarded",
        TaskKind::Try(TryTask {
            try_: vec![node(
                "boom",
                TaskKind::Raise(RaiseTask {
                    error_type: "validation".to_string(),
                    title: Some("bad input".to_string()),
                    detail: None,
                }),
            )],
            catch_do: vec![set_task("recovered", json!(true))],
        }),
    );

    let outcome = registry.execute(&try_task, &ctx, Value::Null, &mut st).await.unwrap();
    match outcome {
        TaskOutcome::Completed(v) => assert_eq!(v, json!(true)),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(st.data.get("error").and_then(|e| e.get("type")), Some(&json!("validation")));
}

#[tokio::test]
async fn switch_default_case_drives_do_sequencer_jump() {
    let registry = BuilderRegistry::default();
    let ctx = ScenarioCtx::new();
    let mut st = state();

    let root = do_node(
        "root",
        vec![
            node(
                "route",
                TaskKind::Switch(SwitchTask {
                    cases: vec![
                        SwitchCase {
                            name: "no_match".to_string(),
                            when: Some("false".to_string()),
                            then: None,
                        },
                        SwitchCase {
                            name: "default".to_string(),
                            when: None,
                            then: Some("landing".to_string()),
                        },
                    ],
                }),
            ),
            set_task("skipped", json!("should not run")),
            set_task("landing", json!("arrived")),
        ],
    );

    let outcome = registry.execute(&root, &ctx, Value::Null, &mut st).await.unwrap();
    match outcome {
        TaskOutcome::Completed(v) => assert_eq!(v, json!("arrived")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(!st.data.contains_key("skipped"));
}

#[tokio::test]
async fn listen_registers_query_handler_without_blocking() {
    let registry = BuilderRegistry::default();
    let ctx = ScenarioCtx::new();
    let mut st = state();

    let listen = node(
        "status_query",
        TaskKind::Listen(workflow_engine::model::ListenTask {
            to: ListenTo::One(EventFilter {
                id: "status".to_string(),
                kind: EventKind::Query,
                with: Value::Null,
                accept_if: None,
                data: None,
            }),
            timeout: None,
        }),
    );

    let outcome = registry.execute(&listen, &ctx, Value::Null, &mut st).await.unwrap();
    assert!(matches!(outcome, TaskOutcome::Completed(_)));
}

#[tokio::test]
async fn call_http_echoes_evaluated_endpoint_through_activity_bridge() {
    let registry = BuilderRegistry::default();
    let ctx = ScenarioCtx::new();
    let mut st = state();

    let call = node(
        "ping",
        TaskKind::CallHttp(workflow_engine::model::CallHttpTask {
            method: "GET".to_string(),
            endpoint: "https://example.test/health".to_string(),
            headers: serde_json::Map::new(),
            query: serde_json::Map::new(),
            body: None,
            output: workflow_engine::model::HttpOutputMode::Content,
            redirect: false,
        }),
    );

    let outcome = registry.execute(&call, &ctx, Value::Null, &mut st).await.unwrap();
    match outcome {
        TaskOutcome::Completed(v) => {
            assert_eq!(v["echo"]["endpoint"], json!("https://example.test/health"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn activity_error_propagates_as_engine_error() {
    let err = ActivityError::non_retryable("boom").with_type("Explosion");
    let wrapped: EngineError = err.clone().into();
    assert!(!wrapped.is_retryable());
}
