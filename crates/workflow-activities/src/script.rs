//! `run.script`/`run.shell` activities (`spec.md` §4.11). New module — the
//! teacher has no direct shell-exec equivalent — built around
//! `tokio::process::Command` the way `durable::activity::context` hands an
//! activity its own async execution context: stdout/stderr are captured,
//! a non-zero exit is a (non-retryable, the process ran deterministically
//! and failed) activity error, and the evaluated `env` map is applied on
//! top of the process's inherited environment.

use std::collections::HashMap;
use std::process::Stdio;

use tokio::process::Command;

use workflow_engine::errors::ActivityError;
use workflow_engine::state::EnvMap;
use workflow_engine::value::Value;

use crate::{resolve_task, sanitize_result};

pub async fn execute_shell(evaluated_task: &Value, env: &EnvMap) -> Result<Value, ActivityError> {
    let resolved = resolve_task(evaluated_task, env)?;

    let command = resolved["command"]
        .as_str()
        .ok_or_else(|| ActivityError::non_retryable("missing shell command"))?;
    let arguments = resolved["arguments"]
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_else(Vec::new);
    let env_overrides = flatten_env(&resolved["env"]);

    let output = run(command, &arguments, &env_overrides).await?;
    sanitize_result(&output, env);
    Ok(output)
}

pub async fn execute_script(evaluated_task: &Value, env: &EnvMap) -> Result<Value, ActivityError> {
    let resolved = resolve_task(evaluated_task, env)?;

    let language = resolved["language"]
        .as_str()
        .ok_or_else(|| ActivityError::non_retryable("missing script language"))?;
    let interpreter = interpreter_for(language)?;
    let code = resolved["code"]
        .as_str()
        .ok_or_else(|| ActivityError::non_retryable("missing script code"))?;
    let env_overrides = flatten_env(&resolved["env"]);

    let output = run(interpreter, &["-c".to_string(), code.to_string()], &env_overrides).await?;
    sanitize_result(&output, env);
    Ok(output)
}

fn interpreter_for(language: &str) -> Result<&'static str, ActivityError> {
    match language {
        "python" | "python3" => Ok("python3"),
        "node" | "javascript" => Ok("node"),
        "bash" | "sh" => Ok("sh"),
        other => Err(
            ActivityError::non_retryable(format!("unsupported script language: {other}"))
                .with_type("UnsupportedLanguage"),
        ),
    }
}

fn flatten_env(value: &Value) -> HashMap<String, String> {
    value
        .as_object()
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

async fn run(
    program: &str,
    arguments: &[String],
    env_overrides: &HashMap<String, String>,
) -> Result<Value, ActivityError> {
    let mut cmd = Command::new(program);
    cmd.args(arguments)
        .envs(env_overrides)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = cmd
        .output()
        .await
        .map_err(|e| ActivityError::non_retryable(format!("failed to spawn {program}: {e}")))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if !output.status.success() {
        return Err(ActivityError {
            message: format!("{program} exited with {:?}", output.status.code()),
            error_type: Some("ScriptFailed".to_string()),
            retryable: false,
            details: Some(serde_json::json!({ "stdout": stdout, "stderr": stderr })),
        });
    }

    Ok(serde_json::json!({ "stdout": stdout, "stderr": stderr }))
}
