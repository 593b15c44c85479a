//! Runtime-placeholder resolver (`spec.md` §4.4).
//!
//! JIT-resolves `${.secrets.NAME}`/`${.env_vars.NAME}` inside an activity,
//! so that only placeholders — never secret values — ever cross into
//! durable history. Grounded on the activity-scoped resolution boundary in
//! `durable::activity::context` (the activity, not the workflow, is where
//! environment/secrets are allowed to be read).

use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use crate::expr::{is_placeholder, PlaceholderKind};
use crate::state::EnvMap;
use crate::value::Value;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{(\.(?:secrets|env_vars)\.[A-Z_][A-Z0-9_]*)\}").unwrap())
}

/// Collect every placeholder `NAME` referenced anywhere inside `value`
/// that is absent from `env`, so resolution can fail fast with the
/// complete list (`spec.md` invariant: "the activity fails with
/// `MissingEnvError` and does not execute the external call").
pub fn collect_missing(value: &Value, env: &EnvMap) -> Vec<String> {
    let mut missing = Vec::new();
    collect_missing_inner(value, env, &mut missing);
    missing.sort();
    missing.dedup();
    missing
}

fn collect_missing_inner(value: &Value, env: &EnvMap, missing: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            for caps in placeholder_re().captures_iter(s) {
                if let Some((_, name)) = is_placeholder(&caps[1]) {
                    if !env.contains_key(&name) {
                        missing.push(name);
                    }
                }
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                collect_missing_inner(v, env, missing);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_missing_inner(v, env, missing);
            }
        }
        _ => {}
    }
}

/// Replace every placeholder in `value` with its resolved value from `env`.
/// Callers must call [`collect_missing`] first and fail the activity if it
/// returns anything non-empty — this function assumes every reference
/// resolves and will substitute an empty string for any it can't (that
/// path is unreachable when the missing-check above has run).
pub fn resolve(value: &Value, env: &EnvMap) -> Value {
    match value {
        Value::String(s) => Value::String(resolve_string(s, env)),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve(v, env));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve(v, env)).collect()),
        other => other.clone(),
    }
}

fn resolve_string(s: &str, env: &EnvMap) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for caps in placeholder_re().captures_iter(s) {
        let m = caps.get(0).unwrap();
        out.push_str(&s[last..m.start()]);
        if let Some((kind, name)) = is_placeholder(&caps[1]) {
            match env.get(&name) {
                Some(var) => {
                    if kind == PlaceholderKind::Secret && !var.is_secret {
                        warn!(
                            name = %name,
                            "placeholder referenced via .secrets. but env var is not marked secret"
                        );
                    }
                    out.push_str(&var.value);
                }
                None => {
                    // collect_missing should have already caught this; fall
                    // back to leaving the placeholder untouched so the bug
                    // is visible rather than silently swallowed.
                    out.push_str(m.as_str());
                }
            }
        }
        last = m.end();
    }
    out.push_str(&s[last..]);
    out
}

/// Output scanner (`spec.md` §4.4 "SanitizeOutput"): advisory-only, emits a
/// warning per string containing a secret substring, never modifies output.
pub fn sanitize_output(value: &Value, env: &EnvMap) {
    let secrets: Vec<&str> = env
        .values()
        .filter(|v| v.is_secret && !v.value.is_empty())
        .map(|v| v.value.as_str())
        .collect();
    if secrets.is_empty() {
        return;
    }
    scan_for_secrets(value, &secrets);
}

fn scan_for_secrets(value: &Value, secrets: &[&str]) {
    match value {
        Value::String(s) => {
            for secret in secrets {
                if s.contains(secret) {
                    warn!("activity output contains a value marked as secret");
                    break; // short-circuit after first match per string
                }
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                scan_for_secrets(v, secrets);
            }
        }
        Value::Array(items) => {
            for v in items {
                scan_for_secrets(v, secrets);
            }
        }
        _ => {}
    }
}
