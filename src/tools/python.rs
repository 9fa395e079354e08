//! python_execute：用本机解释器运行一段代码，带超时
//!
//! 只有打印到 stdout 的内容可见；失败时观察结果为 stderr。超时后子进程随句柄一起被杀掉。

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::react::AgentEvent;
use crate::tools::schema::{args_schema, parse_args};
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

fn default_timeout() -> u64 {
    5
}

#[derive(Deserialize, JsonSchema)]
struct PythonArgs {
    /// The Python code to execute.
    code: String,
    /// Timeout in seconds. Defaults to 5.
    #[serde(default = "default_timeout")]
    timeout: u64,
}

pub struct PythonExecuteTool {
    interpreter: String,
}

impl Default for PythonExecuteTool {
    fn default() -> Self {
        Self::new()
    }
}

impl PythonExecuteTool {
    pub fn new() -> Self {
        let interpreter = if cfg!(windows) { "python" } else { "python3" };
        Self {
            interpreter: interpreter.to_string(),
        }
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    async fn run(&self, code: &str, timeout: u64) -> (String, bool) {
        let child = Command::new(&self.interpreter)
            .arg("-c")
            .arg(code)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(c) => c,
            Err(e) => return (format!("Failed to start {}: {}", self.interpreter, e), false),
        };
        match tokio::time::timeout(Duration::from_secs(timeout), child.wait_with_output()).await {
            Err(_) => (format!("Execution timeout after {} seconds", timeout), false),
            Ok(Err(e)) => (e.to_string(), false),
            Ok(Ok(output)) if output.status.success() => {
                (String::from_utf8_lossy(&output.stdout).into_owned(), true)
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let stdout = String::from_utf8_lossy(&output.stdout);
                (format!("{}{}", stdout, stderr).trim_end().to_string(), false)
            }
        }
    }
}

fn preview(code: &str) -> String {
    let shown: String = code.chars().take(70).collect();
    let shown = if code.chars().count() > 70 {
        format!("{}...", shown)
    } else {
        shown
    };
    shown.replace('\n', " ")
}

#[async_trait]
impl Tool for PythonExecuteTool {
    fn name(&self) -> &str {
        "python_execute"
    }

    fn description(&self) -> &str {
        "Executes Python code string. Note: Only print outputs are visible, function return values are not captured. Use print statements to see results."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<PythonArgs>()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let PythonArgs { code, timeout } = parse_args(args)?;
        ctx.events.emit(AgentEvent::Action {
            title: "🐍 Python: running script".to_string(),
            content: preview(&code),
        });

        let (observation, success) = self.run(&code, timeout).await;
        tracing::debug!(success, "python execution finished");

        ctx.events.emit(AgentEvent::TerminalOutput {
            content: format!(">>> # Running Python code:\n>>> {}\n{}", code, observation)
                .trim()
                .to_string(),
        });

        Ok(ToolResult::success(json!({
            "observation": observation,
            "success": success,
        })))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::react::EventSink;

    #[tokio::test]
    async fn test_runs_code_and_reports_events() {
        let tool = PythonExecuteTool::new().with_interpreter("sh");
        let (events, mut rx) = EventSink::channel();
        let ctx = ToolContext::new("swe", events, None);

        let result = tool
            .execute(&ctx, json!({"code": "echo hi"}))
            .await
            .unwrap();
        assert_eq!(result.output, Some(json!({"observation": "hi\n", "success": true})));

        match rx.try_recv().unwrap() {
            AgentEvent::Action { title, content } => {
                assert!(title.contains("Python"));
                assert_eq!(content, "echo hi");
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(
            rx.try_recv().unwrap(),
            AgentEvent::TerminalOutput {
                content: ">>> # Running Python code:\n>>> echo hi\nhi".into()
            }
        );
    }

    #[tokio::test]
    async fn test_timeout_and_failure() {
        let tool = PythonExecuteTool::new().with_interpreter("sh");
        let ctx = ToolContext::default();

        let slow = tool
            .execute(&ctx, json!({"code": "sleep 5", "timeout": 1}))
            .await
            .unwrap();
        assert_eq!(
            slow.output,
            Some(json!({"observation": "Execution timeout after 1 seconds", "success": false}))
        );

        let failed = tool
            .execute(&ctx, json!({"code": "echo oops >&2; exit 3"}))
            .await
            .unwrap();
        assert_eq!(failed.output, Some(json!({"observation": "oops", "success": false})));
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(80);
        assert_eq!(preview(&long), format!("{}...", "x".repeat(70)));
        assert_eq!(preview("a\nb"), "a b");
    }
}
