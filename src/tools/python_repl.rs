//! Python code execution tool
//!
//! Runs a snippet with `python -c` in a child process. stdin is closed, the
//! process is killed if the wall-clock timeout fires, and captured output is
//! truncated. There is no further sandboxing: the code runs with the
//! caller's permissions.

use crate::tools::registry::Tool;
use crate::types::{AppError, Result};
use crate::utils::config::ToolsConfig;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

pub struct PythonReplTool {
    python_bin: String,
    timeout: Duration,
    max_output_bytes: usize,
}

impl PythonReplTool {
    pub fn new(python_bin: impl Into<String>, timeout: Duration, max_output_bytes: usize) -> Self {
        Self {
            python_bin: python_bin.into(),
            timeout,
            max_output_bytes,
        }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(
            config.python_bin.clone(),
            Duration::from_secs(config.timeout_secs),
            config.max_output_bytes,
        )
    }
}

impl Default for PythonReplTool {
    fn default() -> Self {
        Self::from_config(&ToolsConfig::default())
    }
}

/// Extract code from a markdown fence if there is one, otherwise trim the text.
pub fn strip_code_fences(text: &str) -> String {
    let Some(open) = text.find("```") else {
        return text.trim().to_string();
    };
    let after_open = &text[open + 3..];
    // Skip the language tag on the opening fence line.
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(after_open.len());
    let body = &after_open[body_start..];
    let body = match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    };
    body.trim().to_string()
}

/// Cut `text` to at most `max_bytes`, backing off to a char boundary.
pub fn truncate_output(text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}...[truncated, {} bytes total]",
        &text[..end],
        text.len()
    )
}

#[async_trait]
impl Tool for PythonReplTool {
    fn name(&self) -> &str {
        "python_repl"
    }

    fn description(&self) -> &str {
        "Execute Python code and return what it prints. Use print() to produce output."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Python source to run"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let code = args["code"]
            .as_str()
            .ok_or_else(|| AppError::InvalidInput("code is required".into()))?;
        let code = strip_code_fences(code);
        if code.is_empty() {
            return Err(AppError::InvalidInput("code is empty".into()));
        }
        debug!(python = %self.python_bin, bytes = code.len(), "running python snippet");

        let mut cmd = Command::new(&self.python_bin);
        cmd.arg("-c")
            .arg(&code)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            AppError::Tool(format!("Failed to start {}: {}", self.python_bin, e))
        })?;

        // Dropping the child on timeout kills it.
        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(AppError::Tool(format!(
                    "Python execution timed out after {} seconds",
                    self.timeout.as_secs_f32()
                )))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        Ok(json!({
            "success": output.status.success(),
            "exit_code": output.status.code().unwrap_or(-1),
            "stdout": truncate_output(stdout, self.max_output_bytes),
            "stderr": truncate_output(stderr, self.max_output_bytes),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("print(1)"), "print(1)");
        assert_eq!(strip_code_fences("```python\nprint(1)\n```"), "print(1)");
        assert_eq!(strip_code_fences("```\nx = 2\nprint(x)\n```\n"), "x = 2\nprint(x)");
        assert_eq!(
            strip_code_fences("Here you go:\n```py\nprint('hi')\n```\nDone."),
            "print('hi')"
        );
        assert_eq!(strip_code_fences("```python\nprint(3)"), "print(3)");
    }

    #[test]
    fn test_truncate_output_respects_char_boundary() {
        assert_eq!(truncate_output("short".into(), 10), "short");
        let truncated = truncate_output("héllo".into(), 2);
        assert!(truncated.starts_with("h..."));
        assert!(truncated.contains("6 bytes total"));
    }

    #[tokio::test]
    async fn test_missing_code_argument() {
        let tool = PythonReplTool::default();
        let err = tool.execute(json!({})).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_runs_python() {
        if !python_available() {
            return;
        }
        let tool = PythonReplTool::default();
        let result = tool
            .execute(json!({ "code": "```python\nprint(6 * 7)\n```" }))
            .await
            .unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["exit_code"], 0);
        assert_eq!(result["stdout"].as_str().unwrap().trim(), "42");
    }

    #[tokio::test]
    async fn test_failing_code_reports_stderr() {
        if !python_available() {
            return;
        }
        let tool = PythonReplTool::default();
        let result = tool
            .execute(json!({ "code": "raise ValueError('boom')" }))
            .await
            .unwrap();
        assert_eq!(result["success"], false);
        assert!(result["stderr"].as_str().unwrap().contains("ValueError: boom"));
    }

    #[tokio::test]
    async fn test_timeout() {
        if !python_available() {
            return;
        }
        let tool = PythonReplTool::new("python3", Duration::from_millis(200), 1000);
        let err = tool
            .execute(json!({ "code": "import time\ntime.sleep(5)" }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_interpreter() {
        let tool = PythonReplTool::new(
            "definitely-not-a-python-binary",
            Duration::from_secs(1),
            100,
        );
        let err = tool.execute(json!({ "code": "print(1)" })).await.unwrap_err();
        assert!(matches!(err, AppError::Tool(_)));
    }
}
