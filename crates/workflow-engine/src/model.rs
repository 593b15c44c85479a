//! The typed task tree the DSL parser produces (`spec.md` §3).
//!
//! The parser itself is an external collaborator (out of scope); this
//! module only defines the shape the core consumes. Grounded on the
//! tagged-union action shape in `durable::workflow::action` and the
//! per-kind state enums in `everruns-worker`'s Temporal workflows,
//! generalized into one closed sum over every task kind.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::value::Value;

/// `task.then`: continue, terminate, or jump to a named task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowDirective {
    Continue,
    End,
    Jump(String),
}

impl FlowDirective {
    pub fn from_str_opt(s: Option<&str>) -> Self {
        match s {
            None | Some("continue") => FlowDirective::Continue,
            Some("end") | Some("exit") => FlowDirective::End,
            Some(other) => FlowDirective::Jump(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowDirective::End)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputSpec {
    pub schema: Option<Value>,
    #[serde(rename = "from")]
    pub from_expr: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSpec {
    #[serde(rename = "as")]
    pub as_expr: Option<String>,
    pub schema: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportSpec {
    #[serde(rename = "as")]
    pub as_expr: Option<String>,
    pub schema: Option<Value>,
}

/// Fields common to every task node (`spec.md` §3 `TaskBase`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBase {
    pub name: String,
    #[serde(rename = "if")]
    pub if_expr: Option<String>,
    #[serde(default)]
    pub input: InputSpec,
    #[serde(default)]
    pub output: OutputSpec,
    #[serde(default)]
    pub export: ExportSpec,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
    pub then: Option<String>,
}

impl TaskBase {
    pub fn then_directive(&self) -> FlowDirective {
        FlowDirective::from_str_opt(self.then.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoTask {
    pub tasks: Vec<TaskNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForTask {
    #[serde(rename = "in")]
    pub in_expr: String,
    #[serde(default = "default_at")]
    pub at: String,
    #[serde(default = "default_each")]
    pub each: String,
    #[serde(rename = "while")]
    pub while_expr: Option<String>,
    pub do_: Vec<TaskNode>,
}

fn default_at() -> String {
    "index".to_string()
}
fn default_each() -> String {
    "item".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkBranch {
    pub name: String,
    pub task: TaskNode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkTask {
    pub branches: Vec<ForkBranch>,
    /// `true` => first-completion-wins ("any"); `false` => wait for all.
    #[serde(default)]
    pub compete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchCase {
    pub name: String,
    pub when: Option<String>,
    #[serde(default)]
    pub then: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchTask {
    pub cases: Vec<SwitchCase>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TryTask {
    pub try_: Vec<TaskNode>,
    pub catch_do: Vec<TaskNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Query,
    Signal,
    Update,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFilter {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub with: Value,
    pub accept_if: Option<String>,
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ListenTo {
    All(Vec<EventFilter>),
    Any(Vec<EventFilter>),
    One(EventFilter),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenTask {
    pub to: ListenTo,
    /// Duration string, e.g. `"PT1M"`/`"60s"`; default one minute.
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaiseTask {
    pub error_type: String,
    pub title: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunKind {
    Script {
        language: String,
        code: String,
        #[serde(default)]
        arguments: HashMap<String, String>,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(rename = "await", default = "default_true")]
        await_: bool,
    },
    Shell {
        command: String,
        #[serde(default)]
        arguments: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(rename = "await", default = "default_true")]
        await_: bool,
    },
    Workflow {
        name: String,
        input: Value,
        #[serde(rename = "await", default = "default_true")]
        await_: bool,
    },
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTask {
    pub run: RunKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetTask {
    pub set: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitTask {
    /// ISO-8601-ish duration string; parsed by `crate::expr::parse_duration`.
    pub duration: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpOutputMode {
    Raw,
    Response,
    Content,
}

impl Default for HttpOutputMode {
    fn default() -> Self {
        HttpOutputMode::Content
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallHttpTask {
    pub method: String,
    pub endpoint: String,
    #[serde(default)]
    pub headers: serde_json::Map<String, Value>,
    #[serde(default)]
    pub query: serde_json::Map<String, Value>,
    pub body: Option<Value>,
    #[serde(default)]
    pub output: HttpOutputMode,
    #[serde(default)]
    pub redirect: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallGrpcTask {
    pub host: String,
    pub port: u16,
    pub service: String,
    pub method: String,
    /// `file://` URI naming the local `.proto` descriptor.
    pub proto: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CallFunctionKind {
    Activity {
        name: String,
        #[serde(default)]
        args: Value,
    },
    Agent {
        scope: String,
        org: String,
        slug: String,
        message: String,
        #[serde(default)]
        env: HashMap<String, String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallFunctionTask {
    pub call: CallFunctionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskKind {
    Do(DoTask),
    For(ForTask),
    Fork(ForkTask),
    Switch(SwitchTask),
    Try(TryTask),
    Listen(ListenTask),
    Raise(RaiseTask),
    Run(RunTask),
    Set(SetTask),
    Wait(WaitTask),
    CallHttp(CallHttpTask),
    CallGrpc(CallGrpcTask),
    CallFunction(CallFunctionTask),
}

impl TaskKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            TaskKind::Do(_) => "do",
            TaskKind::For(_) => "for",
            TaskKind::Fork(_) => "fork",
            TaskKind::Switch(_) => "switch",
            TaskKind::Try(_) => "try",
            TaskKind::Listen(_) => "listen",
            TaskKind::Raise(_) => "raise",
            TaskKind::Run(_) => "run",
            TaskKind::Set(_) => "set",
            TaskKind::Wait(_) => "wait",
            TaskKind::CallHttp(_) => "call.http",
            TaskKind::CallGrpc(_) => "call.grpc",
            TaskKind::CallFunction(_) => "call.function",
        }
    }

    /// Tasks whose side effects must reinitialize after continue-as-new
    /// (`spec.md` §4.1 `NeverSkipCAN`). Only `listen` needs this: its
    /// handlers must be reinstalled on every replay/resume.
    pub fn never_skip_can(&self) -> bool {
        matches!(self, TaskKind::Listen(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: String,
    pub base: TaskBase,
    pub kind: TaskKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDocument {
    pub id: String,
    pub input_schema: Option<Value>,
    pub root: Vec<TaskNode>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}
