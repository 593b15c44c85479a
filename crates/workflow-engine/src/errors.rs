//! Error taxonomy (`spec.md` §7).
//!
//! Two enums, mirroring the shape of `durable::workflow::WorkflowError`
//! (workflow-side) and `durable::activity::ActivityError` (activity-side)
//! from the teacher, both `message`/`retryable`-bearing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::Value;

/// Activity-side error, returned by leaf activities (`call.http`,
/// `call.grpc`, `run.*`, `call.agent`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityError {
    pub message: String,
    pub error_type: Option<String>,
    pub retryable: bool,
    pub details: Option<Value>,
}

impl ActivityError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: None,
            retryable: true,
            details: None,
        }
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: None,
            retryable: false,
            details: None,
        }
    }

    pub fn with_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for ActivityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ActivityError {}

/// The DSL-native error envelope raised by `raise` and surfaced to callers
/// of a failed workflow execution (`spec.md` §6 "Error envelope").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DslError {
    pub r#type: String,
    pub status: u16,
    pub title: Option<String>,
    pub detail: Option<String>,
    pub instance: String,
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("expression error: {0}")]
pub struct ExpressionError(pub String);

#[derive(Debug, Error, Clone, PartialEq)]
#[error("validation error: {0}")]
pub struct ValidationError(pub String);

/// Top-level error type threaded through the Task Builder / Executor.
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    #[error("unsupported task kind: {0}")]
    UnsupportedTaskKind(String),

    #[error("build error in task {task}: {cause}")]
    BuildError { task: String, cause: String },

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("next target not found: {0}")]
    Flow(String),

    #[error("iterable error: {0}")]
    Iterable(String),

    #[error("missing runtime environment variables: {0:?}")]
    MissingEnv(Vec<String>),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error(transparent)]
    Activity(#[from] ActivityError),

    #[error("raised: {0:?}")]
    Raised(DslError),

    #[error("panic sentinel triggered")]
    Panic,
}

impl EngineError {
    /// Whether the runtime should retry the enclosing activity/workflow
    /// step. Matches the retryable/non-retryable split in `spec.md` §7.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Activity(e) => e.retryable,
            EngineError::Timeout(_) => true,
            _ => false,
        }
    }
}
