//! Expression layer (`spec.md` §4.2).
//!
//! Recognizes the strict `${ ... }` form, evaluates it against [`Scope`],
//! and traverses nested values to evaluate every embedded expression. Two
//! dialects share the `${ ... }` syntax: workflow-evaluated expressions
//! (handled here) and runtime placeholders `${.secrets.X}`/`${.env_vars.X}`
//! (handled by `crate::resolver` and deliberately never reaching this
//! evaluator — see `is_placeholder`).
//!
//! No JQ crate exists anywhere in the reference corpus, so this module is a
//! small hand-rolled recursive-descent evaluator scoped to what the
//! engine's own predicates and templates need (see `SPEC_FULL.md` §4.2).

use std::sync::OnceLock;

use regex::Regex;

use crate::errors::ExpressionError;
use crate::value::{is_truthy, Value};

fn expr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^{}]*)\}").unwrap())
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\.(secrets|env_vars)\.([A-Z_][A-Z0-9_]*)$").unwrap())
}

/// The kind of runtime placeholder referenced inside `${ ... }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderKind {
    Secret,
    EnvVar,
}

/// If `inner` (the content between `${` and `}`, no surrounding whitespace)
/// is a runtime placeholder, return its kind and referenced name.
pub fn is_placeholder(inner: &str) -> Option<(PlaceholderKind, String)> {
    let caps = placeholder_re().captures(inner)?;
    let kind = match &caps[1] {
        "secrets" => PlaceholderKind::Secret,
        "env_vars" => PlaceholderKind::EnvVar,
        _ => return None,
    };
    Some((kind, caps[2].to_string()))
}

/// `true` if `s`, trimmed, is entirely one `${ ... }` strict expression.
pub fn is_strict_expression(s: &str) -> bool {
    let t = s.trim();
    t.starts_with("${") && t.ends_with('}') && t[2..t.len() - 1].find("${").is_none()
}

/// The four (plus loop-local) scopes an expression evaluates against.
pub struct Scope<'a> {
    pub input: &'a Value,
    pub data: &'a Value,
    pub context: &'a Value,
    pub env: &'a Value,
    pub item: Option<&'a Value>,
    pub index: Option<&'a Value>,
}

/// Evaluate a bare expression body (without the surrounding `${ }`).
pub fn evaluate(body: &str, scope: &Scope) -> Result<Value, ExpressionError> {
    let mut parser = Parser::new(body);
    let value = parser.parse_or(scope)?;
    parser.skip_ws();
    if !parser.is_eof() {
        return Err(ExpressionError(format!(
            "unexpected trailing input in expression: {body:?}"
        )));
    }
    Ok(value)
}

/// Evaluate the predicate form used by `if`/`while`/`when`. Returns `None`
/// (rather than erroring) when the expression evaluates to a non-bool, so
/// callers can implement the spec's "non-bool ⇒ warn + stop" contract.
pub fn evaluate_bool(body: &str, scope: &Scope) -> Result<Option<bool>, ExpressionError> {
    let v = evaluate(body, scope)?;
    Ok(match v {
        Value::Bool(b) => Some(b),
        _ => None,
    })
}

/// Evaluate a whole string value: if it's a strict expression, evaluate and
/// return the (possibly non-string) result; otherwise, perform embedded
/// interpolation of every `${ ... }` occurrence, stringifying results, and
/// return a `Value::String`. Strings with no expression at all pass
/// through unchanged.
pub fn evaluate_embedded(s: &str, scope: &Scope) -> Result<Value, ExpressionError> {
    if is_strict_expression(s) {
        let inner = s.trim();
        let body = &inner[2..inner.len() - 1];
        return evaluate(body, scope);
    }
    if !s.contains("${") {
        return Ok(Value::String(s.to_string()));
    }
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for caps in expr_re().captures_iter(s) {
        let m = caps.get(0).unwrap();
        out.push_str(&s[last..m.start()]);
        let body = &caps[1];
        let value = evaluate(body, scope)?;
        out.push_str(&stringify(&value));
        last = m.end();
    }
    out.push_str(&s[last..]);
    Ok(Value::String(out))
}

fn stringify(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Recursively evaluate every embedded expression in a nested JSON value
/// (objects, arrays, and strings); other scalars pass through.
pub fn traverse(value: &Value, scope: &Scope) -> Result<Value, ExpressionError> {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), traverse(v, scope)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for v in items {
                out.push(traverse(v, scope)?);
            }
            Ok(Value::Array(out))
        }
        Value::String(s) => evaluate_embedded(s, scope),
        other => Ok(other.clone()),
    }
}

pub fn truthy(v: &Value) -> bool {
    is_truthy(v)
}

/// Parse a wait/listen-timeout duration string. Accepts plain `"<n>s"`,
/// `"<n>ms"`, and the common ISO-8601-ish `"PT<n>S"`/`"PT<n>M"` forms.
pub fn parse_duration(s: &str) -> Result<std::time::Duration, ExpressionError> {
    let s = s.trim();
    if let Some(rest) = s.strip_prefix("PT") {
        if let Some(n) = rest.strip_suffix('S') {
            let secs: f64 = n
                .parse()
                .map_err(|_| ExpressionError(format!("bad duration: {s}")))?;
            return Ok(std::time::Duration::from_secs_f64(secs));
        }
        if let Some(n) = rest.strip_suffix('M') {
            let mins: f64 = n
                .parse()
                .map_err(|_| ExpressionError(format!("bad duration: {s}")))?;
            return Ok(std::time::Duration::from_secs_f64(mins * 60.0));
        }
    }
    if let Some(n) = s.strip_suffix("ms") {
        let ms: u64 = n
            .parse()
            .map_err(|_| ExpressionError(format!("bad duration: {s}")))?;
        return Ok(std::time::Duration::from_millis(ms));
    }
    if let Some(n) = s.strip_suffix('s') {
        let secs: f64 = n
            .parse()
            .map_err(|_| ExpressionError(format!("bad duration: {s}")))?;
        return Ok(std::time::Duration::from_secs_f64(secs));
    }
    Err(ExpressionError(format!("unrecognized duration: {s}")))
}

// --- recursive-descent parser -------------------------------------------------

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    _src: &'a str,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
            _src: src,
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        self.skip_ws();
        let s_chars: Vec<char> = s.chars().collect();
        if self.chars[self.pos..].starts_with(&s_chars[..]) {
            self.pos += s_chars.len();
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self, scope: &Scope) -> Result<Value, ExpressionError> {
        let mut left = self.parse_and(scope)?;
        loop {
            self.skip_ws();
            if self.eat_str("||") {
                let right = self.parse_and(scope)?;
                left = Value::Bool(truthy(&left) || truthy(&right));
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_and(&mut self, scope: &Scope) -> Result<Value, ExpressionError> {
        let mut left = self.parse_not(scope)?;
        loop {
            self.skip_ws();
            if self.eat_str("&&") {
                let right = self.parse_not(scope)?;
                left = Value::Bool(truthy(&left) && truthy(&right));
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_not(&mut self, scope: &Scope) -> Result<Value, ExpressionError> {
        self.skip_ws();
        if self.peek() == Some('!') {
            self.pos += 1;
            let v = self.parse_not(scope)?;
            return Ok(Value::Bool(!truthy(&v)));
        }
        self.parse_cmp(scope)
    }

    fn parse_cmp(&mut self, scope: &Scope) -> Result<Value, ExpressionError> {
        let left = self.parse_additive(scope)?;
        self.skip_ws();
        for (op, len) in [
            ("==", 2),
            ("!=", 2),
            ("<=", 2),
            (">=", 2),
            ("<", 1),
            (">", 1),
        ] {
            if self.eat_str(op) {
                let right = self.parse_additive(scope)?;
                return Ok(Value::Bool(compare(op, &left, &right)?));
            }
            let _ = len;
        }
        Ok(left)
    }

    fn parse_additive(&mut self, scope: &Scope) -> Result<Value, ExpressionError> {
        let mut left = self.parse_primary(scope)?;
        loop {
            self.skip_ws();
            if self.peek() == Some('+') {
                self.pos += 1;
                let right = self.parse_primary(scope)?;
                left = add(&left, &right)?;
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_primary(&mut self, scope: &Scope) -> Result<Value, ExpressionError> {
        self.skip_ws();
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let v = self.parse_or(scope)?;
                self.skip_ws();
                if self.peek() != Some(')') {
                    return Err(ExpressionError("expected closing parenthesis".into()));
                }
                self.pos += 1;
                Ok(v)
            }
            Some('"') => self.parse_string(),
            Some('$') => self.parse_path(scope),
            Some('.') => self.parse_path(scope),
            Some(c) if c.is_ascii_digit() || c == '-' => self.parse_number(),
            _ => self.parse_ident_literal(),
        }
    }

    fn parse_string(&mut self) -> Result<Value, ExpressionError> {
        self.pos += 1; // opening quote
        let mut s = String::new();
        loop {
            match self.peek() {
                None => return Err(ExpressionError("unterminated string literal".into())),
                Some('"') => {
                    self.pos += 1;
                    break;
                }
                Some('\\') => {
                    self.pos += 1;
                    if let Some(c) = self.peek() {
                        s.push(match c {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                        self.pos += 1;
                    }
                }
                Some(c) => {
                    s.push(c);
                    self.pos += 1;
                }
            }
        }
        Ok(Value::String(s))
    }

    fn parse_number(&mut self) -> Result<Value, ExpressionError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let n: f64 = text
            .parse()
            .map_err(|_| ExpressionError(format!("bad number literal: {text}")))?;
        Ok(serde_json::json!(n))
    }

    fn parse_ident_literal(&mut self) -> Result<Value, ExpressionError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "null" => Ok(Value::Null),
            "" => Err(ExpressionError("unexpected token in expression".into())),
            other => Err(ExpressionError(format!("unknown identifier: {other}"))),
        }
    }

    fn parse_ident(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn parse_path(&mut self, scope: &Scope) -> Result<Value, ExpressionError> {
        let mut current: Value = if self.peek() == Some('$') {
            self.pos += 1;
            let root = self.parse_ident();
            match root.as_str() {
                "input" => scope.input.clone(),
                "data" => scope.data.clone(),
                "context" => scope.context.clone(),
                "env" => scope.env.clone(),
                "item" => scope
                    .item
                    .cloned()
                    .ok_or_else(|| ExpressionError("$item used outside a loop body".into()))?,
                "index" => scope
                    .index
                    .cloned()
                    .ok_or_else(|| ExpressionError("$index used outside a loop body".into()))?,
                other => {
                    return Err(ExpressionError(format!("unknown root variable: ${other}")))
                }
            }
        } else {
            // bare `.` path: relative to `$input`.
            scope.input.clone()
        };

        loop {
            match self.peek() {
                Some('.') => {
                    self.pos += 1;
                    let field = self.parse_ident();
                    if field.is_empty() {
                        break;
                    }
                    current = current.get(&field).cloned().unwrap_or(Value::Null);
                }
                Some('[') => {
                    self.pos += 1;
                    self.skip_ws();
                    let idx_val = self.parse_or(scope)?;
                    self.skip_ws();
                    if self.peek() != Some(']') {
                        return Err(ExpressionError("expected closing bracket".into()));
                    }
                    self.pos += 1;
                    current = match idx_val {
                        Value::Number(n) => {
                            let i = n.as_i64().unwrap_or(0) as usize;
                            current.get(i).cloned().unwrap_or(Value::Null)
                        }
                        Value::String(ref key) => current.get(key).cloned().unwrap_or(Value::Null),
                        _ => Value::Null,
                    };
                }
                _ => break,
            }
        }
        Ok(current)
    }
}

fn compare(op: &str, a: &Value, b: &Value) -> Result<bool, ExpressionError> {
    use std::cmp::Ordering;
    let ord = numeric_or_string_cmp(a, b);
    Ok(match (op, ord) {
        ("==", _) => a == b,
        ("!=", _) => a != b,
        ("<", Some(Ordering::Less)) => true,
        ("<=", Some(Ordering::Less) | Some(Ordering::Equal)) => true,
        (">", Some(Ordering::Greater)) => true,
        (">=", Some(Ordering::Greater) | Some(Ordering::Equal)) => true,
        _ => false,
    })
}

fn numeric_or_string_cmp(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn add(a: &Value, b: &Value) -> Result<Value, ExpressionError> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            Ok(serde_json::json!(x.as_f64().unwrap_or(0.0) + y.as_f64().unwrap_or(0.0)))
        }
        (Value::String(x), Value::String(y)) => Ok(Value::String(format!("{x}{y}"))),
        (Value::String(x), other) => Ok(Value::String(format!("{x}{}", stringify(other)))),
        _ => Err(ExpressionError("unsupported operand types for +".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope<'a>(input: &'a Value, data: &'a Value, context: &'a Value, env: &'a Value) -> Scope<'a> {
        Scope {
            input,
            data,
            context,
            env,
            item: None,
            index: None,
        }
    }

    #[test]
    fn is_placeholder_recognizes_secrets_and_env_vars() {
        assert_eq!(
            is_placeholder(".secrets.TOKEN"),
            Some((PlaceholderKind::Secret, "TOKEN".to_string()))
        );
        assert_eq!(
            is_placeholder(".env_vars.REGION"),
            Some((PlaceholderKind::EnvVar, "REGION".to_string()))
        );
        assert_eq!(is_placeholder("$context.fetch.url"), None);
    }

    #[test]
    fn evaluates_member_access_against_context() {
        let input = Value::Null;
        let data = json!({});
        let context = json!({"fetch": {"url": "https://x/z", "id": 7}});
        let env = json!({});
        let s = scope(&input, &data, &context, &env);
        let v = evaluate("$context.fetch.url", &s).unwrap();
        assert_eq!(v, json!("https://x/z"));
    }

    #[test]
    fn evaluate_embedded_interpolates_into_string() {
        let input = Value::Null;
        let data = json!({});
        let context = json!({"fetch": {"url": "https://x/z"}});
        let env = json!({});
        let s = scope(&input, &data, &context, &env);
        let v = evaluate_embedded("${ $context.fetch.url }", &s).unwrap();
        assert_eq!(v, json!("https://x/z"));
    }

    #[test]
    fn comparisons_and_item_index_in_for_loop() {
        let input = Value::Null;
        let data = json!({});
        let context = json!({});
        let env = json!({});
        let item = json!(3);
        let s = Scope {
            input: &input,
            data: &data,
            context: &context,
            env: &env,
            item: Some(&item),
            index: None,
        };
        let v = evaluate_bool("$item < 4", &s).unwrap();
        assert_eq!(v, Some(true));
    }

    #[test]
    fn traverse_recurses_into_nested_objects() {
        let input = json!({"name": "a"});
        let data = json!({});
        let context = json!({});
        let env = json!({});
        let s = scope(&input, &data, &context, &env);
        let tmpl = json!({"greeting": "hi ${ $input.name }", "n": 1});
        let out = traverse(&tmpl, &s).unwrap();
        assert_eq!(out["greeting"], json!("hi a"));
        assert_eq!(out["n"], json!(1));
    }
}
