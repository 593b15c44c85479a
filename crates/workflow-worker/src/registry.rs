//! Process-global activity dispatch table. Grounded on
//! `durable::engine::registry`'s type-name-keyed registry, generalized to
//! map each of the engine's built-in leaf activity types (`call.http`,
//! `call.grpc`, `run.shell`, `run.script`, `call.agent`) onto its
//! implementation in `workflow_activities`. Custom `call.function`
//! activities (user-registered, outside this crate's fixed set) are left
//! for a future `register()` extension point; dispatching one today is a
//! configuration error, not a panic.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use reqwest::Client;

use workflow_engine::errors::ActivityError;
use workflow_engine::runtime_ctx::{ActivityRequest, ActivityResult};

type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

static HTTP_CLIENT: Lazy<Client> = Lazy::new(Client::new);

const BUILTIN_ACTIVITY_TYPES: &[&str] =
    &["call.http", "call.grpc", "run.shell", "run.script", "call.agent"];

pub struct ActivityRegistry {
    custom: HashMap<String, Arc<CustomActivity>>,
}

type CustomActivity =
    dyn Fn(ActivityRequest) -> BoxFuture<'static, ActivityResult> + Send + Sync + 'static;

impl Default for ActivityRegistry {
    fn default() -> Self {
        Self {
            custom: HashMap::new(),
        }
    }
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user-defined `call.function` activity by name. The
    /// built-in bridge types above can't be overridden this way.
    pub fn register(
        &mut self,
        activity_type: impl Into<String>,
        handler: impl Fn(ActivityRequest) -> BoxFuture<'static, ActivityResult> + Send + Sync + 'static,
    ) {
        self.custom.insert(activity_type.into(), Arc::new(handler));
    }

    pub async fn dispatch(&self, request: ActivityRequest) -> ActivityResult {
        if let Some(handler) = self.custom.get(&request.activity_type) {
            return handler(request).await;
        }

        match request.activity_type.as_str() {
            "call.http" => run(workflow_activities::http::execute(
                &HTTP_CLIENT,
                &request.evaluated_task,
                &request.env,
            ))
            .await,
            "call.grpc" => {
                run(workflow_activities::grpc::execute(&request.evaluated_task, &request.env)).await
            }
            "run.shell" => {
                run(workflow_activities::script::execute_shell(
                    &request.evaluated_task,
                    &request.env,
                ))
                .await
            }
            "run.script" => {
                run(workflow_activities::script::execute_script(
                    &request.evaluated_task,
                    &request.env,
                ))
                .await
            }
            "call.agent" => {
                // Both shipped `RuntimeCtx` adapters intercept `call.agent`
                // before reaching this registry, since only they can supply
                // the task token the async-completion bridge needs. This
                // branch only fires for a hand-rolled adapter that forwards
                // `call.agent` here without a token.
                ActivityResult::Failed(
                    ActivityError::non_retryable(
                        "call.agent must be dispatched through a RuntimeCtx adapter that supplies a task token",
                    )
                    .with_type("MissingTaskToken"),
                )
            }
            other => ActivityResult::Failed(
                ActivityError::non_retryable(format!("unknown activity type: {other}"))
                    .with_type("UnknownActivityType"),
            ),
        }
    }

    pub fn known_builtin_types() -> &'static [&'static str] {
        BUILTIN_ACTIVITY_TYPES
    }
}

async fn run<F>(fut: F) -> ActivityResult
where
    F: std::future::Future<Output = Result<workflow_engine::value::Value, ActivityError>>,
{
    match fut.await {
        Ok(v) => ActivityResult::Success(v),
        Err(e) => ActivityResult::Failed(e),
    }
}
