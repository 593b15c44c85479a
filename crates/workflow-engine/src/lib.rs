//! Task Builder / Executor core of the serverless-workflow execution engine.
//!
//! This crate contains everything `spec.md` calls "core": the per-task-kind
//! state machine, the expression layer, the `State` carrier, JIT secret/env
//! resolution, and the control-flow builders (`do`, `for`, `fork`, `switch`,
//! `try`, `listen`, `run`, `set`, `wait`, `raise`, `call.*`). It does not
//! host a durable runtime; it consumes one through [`runtime_ctx::RuntimeCtx`].

pub mod builders;
pub mod claim_check;
pub mod errors;
pub mod expr;
pub mod model;
pub mod registry;
pub mod reliability;
pub mod resolver;
pub mod runtime_ctx;
pub mod state;
pub mod value;

pub mod prelude {
    pub use crate::claim_check::{ClaimCheckManager, NoopClaimCheck};
    pub use crate::errors::{ActivityError, EngineError, ExpressionError};
    pub use crate::model::*;
    pub use crate::registry::{BuilderRegistry, TaskOutcome};
    pub use crate::runtime_ctx::{
        ActivityRequest, ActivityResult, ContinueAsNewCarrier, RuntimeCtx,
    };
    pub use crate::state::{EnvVar, State};
    pub use crate::value::Value;
}
