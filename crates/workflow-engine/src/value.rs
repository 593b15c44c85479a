//! The engine's generic JSON-shaped value.
//!
//! Grounded on the teacher's pervasive use of `serde_json::Value` as the
//! one value type crossing every workflow/activity boundary
//! (`durable::workflow::event`, `everruns-worker`'s provider payloads). We
//! don't round-trip through strings anywhere except at the true activity
//! wire boundary (HTTP bodies, gRPC JSON marshalling).

pub type Value = serde_json::Value;

/// True for `null`/`false`/`0`/`""`/empty-collection style falsy values used
/// by `while` and `if` predicates when an expression evaluates to something
/// other than a bool (see `spec.md` §4.6: "non-bool ⇒ warn + stop").
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
