//! `listen` (`spec.md` §4.10): register signal/query/update handlers and
//! await events per the `to` clause (`all`/`any`/`one`), honoring each
//! filter's `acceptIf` predicate and an overall timeout (default one
//! minute). Always [`TaskKind::never_skip_can`]: handlers must be
//! reinstalled on every replay/resume, not just the first pass.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::timeout as tokio_timeout;

use crate::errors::EngineError;
use crate::expr;
use crate::model::{EventFilter, EventKind, ListenTask, ListenTo, TaskNode};
use crate::registry::{OwnedScope, TaskOutcome};
use crate::runtime_ctx::RuntimeCtx;
use crate::state::State;
use crate::value::Value;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-`update`-filter completion flag: the runtime invokes the registered
/// [`UpdateHandler`](crate::runtime_ctx::UpdateHandler) synchronously and
/// independent of this task, so the task-side wait has to observe it through
/// a shared flag rather than a channel recv.
struct UpdateFlag {
    value: StdMutex<Option<Value>>,
    notify: Notify,
}

impl UpdateFlag {
    fn new() -> Self {
        Self {
            value: StdMutex::new(None),
            notify: Notify::new(),
        }
    }

    fn set(&self, value: Value) {
        *self.value.lock().unwrap() = Some(value);
        self.notify.notify_waiters();
    }

    async fn wait(&self) -> Value {
        loop {
            let notified = self.notify.notified();
            if let Some(v) = self.value.lock().unwrap().take() {
                return v;
            }
            notified.await;
        }
    }
}

pub async fn execute(
    task: &ListenTask,
    _node: &TaskNode,
    ctx: &dyn RuntimeCtx,
    state: &mut State,
) -> Result<TaskOutcome, EngineError> {
    let deadline = match &task.timeout {
        Some(s) => expr::parse_duration(s)?,
        None => DEFAULT_TIMEOUT,
    };

    let filters: Vec<&EventFilter> = match &task.to {
        ListenTo::All(fs) | ListenTo::Any(fs) => fs.iter().collect(),
        ListenTo::One(f) => vec![f],
    };

    // `signal` and `update` are the blocking event kinds (`spec.md` §4.10):
    // both register callbacks whose completion this task waits on. `query`
    // resolves synchronously whenever the runtime invokes it, independent of
    // this task's own completion, and never blocks it.
    let mut update_flags: HashMap<String, Arc<UpdateFlag>> = HashMap::new();
    for filter in &filters {
        if let Some(flag) = register_handler(filter, ctx)? {
            update_flags.insert(filter.id.clone(), flag);
        }
    }

    let blocking_filters: Vec<&EventFilter> = filters
        .iter()
        .copied()
        .filter(|f| matches!(f.kind, EventKind::Signal | EventKind::Update))
        .collect();

    if blocking_filters.is_empty() {
        return Ok(TaskOutcome::Completed(Value::Null));
    }

    let awaited = match &task.to {
        ListenTo::One(_) => await_any(&blocking_filters, ctx, &update_flags, state, deadline).await?,
        ListenTo::Any(_) => await_any(&blocking_filters, ctx, &update_flags, state, deadline).await?,
        ListenTo::All(_) => await_all(&blocking_filters, ctx, &update_flags, state, deadline).await?,
    };

    Ok(TaskOutcome::Completed(awaited))
}

/// Registers `query`/`update` handlers. Returns the `update` filter's
/// completion flag so the blocking wait below can observe it; `query` has no
/// flag since it never blocks this task.
fn register_handler(
    filter: &EventFilter,
    ctx: &dyn RuntimeCtx,
) -> Result<Option<Arc<UpdateFlag>>, EngineError> {
    match filter.kind {
        EventKind::Query => {
            let response = filter.data.clone().unwrap_or(Value::Null);
            ctx.set_query_handler(
                &filter.id,
                std::sync::Arc::new(move |_args| Ok(response.clone())),
            )?;
            Ok(None)
        }
        EventKind::Update => {
            let response = filter.data.clone().unwrap_or(Value::Null);
            let flag = Arc::new(UpdateFlag::new());
            let flag_for_handler = Arc::clone(&flag);
            ctx.set_update_handler(
                &filter.id,
                std::sync::Arc::new(move |args| {
                    flag_for_handler.set(args.clone());
                    Ok(response.clone())
                }),
            )?;
            Ok(Some(flag))
        }
        EventKind::Signal => Ok(None),
    }
}

async fn recv_filter(
    filter: &EventFilter,
    ctx: &dyn RuntimeCtx,
    update_flags: &HashMap<String, Arc<UpdateFlag>>,
) -> Value {
    match filter.kind {
        EventKind::Signal => ctx.get_signal_channel(&filter.id).recv().await,
        EventKind::Update => update_flags
            .get(&filter.id)
            .expect("update filter registered in execute() before awaiting")
            .wait()
            .await,
        EventKind::Query => std::future::pending::<Value>().await,
    }
}

async fn await_any(
    filters: &[&EventFilter],
    ctx: &dyn RuntimeCtx,
    update_flags: &HashMap<String, Arc<UpdateFlag>>,
    state: &State,
    deadline: Duration,
) -> Result<Value, EngineError> {
    let fut = async {
        loop {
            for filter in filters {
                let payload = recv_filter(filter, ctx, update_flags).await;
                if accepts(filter, &payload, state)? {
                    return Ok(payload);
                }
            }
        }
    };
    tokio_timeout(deadline, fut)
        .await
        .map_err(|_| EngineError::Timeout("listen: no accepted event before deadline".to_string()))?
}

async fn await_all(
    filters: &[&EventFilter],
    ctx: &dyn RuntimeCtx,
    update_flags: &HashMap<String, Arc<UpdateFlag>>,
    state: &State,
    deadline: Duration,
) -> Result<Value, EngineError> {
    let fut = async {
        let mut collected: HashMap<String, Value> = HashMap::new();
        while collected.len() < filters.len() {
            for filter in filters {
                if collected.contains_key(&filter.id) {
                    continue;
                }
                let payload = recv_filter(filter, ctx, update_flags).await;
                if accepts(filter, &payload, state)? {
                    collected.insert(filter.id.clone(), payload);
                }
            }
        }
        Ok::<_, EngineError>(Value::Object(
            collected.into_iter().collect::<serde_json::Map<_, _>>(),
        ))
    };
    tokio_timeout(deadline, fut)
        .await
        .map_err(|_| EngineError::Timeout("listen: not all events arrived before deadline".to_string()))?
}

fn accepts(filter: &EventFilter, payload: &Value, state: &State) -> Result<bool, EngineError> {
    let Some(predicate) = &filter.accept_if else {
        return Ok(true);
    };
    let scopes = OwnedScope::from_state(state).with_loop_vars(Some(payload), None);
    match expr::evaluate_bool(predicate, &scopes.borrow())? {
        Some(b) => Ok(b),
        None => Err(EngineError::Expression(crate::errors::ExpressionError(
            "`acceptIf` did not evaluate to a bool".to_string(),
        ))),
    }
}
