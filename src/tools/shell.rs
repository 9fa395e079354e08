//! 后台 Shell 工具：shell_exec / shell_view / shell_wait / shell_write_to_process / shell_kill_process
//!
//! 进程由 shell_exec 通过 sh -c（Windows 为 cmd /C）在后台启动并登记到 ShellSessionManager，
//! 其余工具按会话 ID 读取输出、等待、写入或结束进程。

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::{Child, Command};

use crate::react::AgentEvent;
use crate::session::{ShellError, ShellSessionManager, ShellSnapshot};
use crate::tools::schema::{args_schema, parse_args};
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

/// 按平台替换解释器名：Windows 上 python3 → python，其它平台裸 python → python3
pub fn rewrite_interpreter(command: &str, windows: bool) -> String {
    let trimmed = command.trim_start();
    let (head, rest) = match trimmed.find(char::is_whitespace) {
        Some(pos) => trimmed.split_at(pos),
        None => (trimmed, ""),
    };
    match (windows, head) {
        (true, "python3") => format!("python{}", rest),
        (false, "python") => format!("python3{}", rest),
        _ => command.to_string(),
    }
}

/// 在 exec_dir 中后台启动命令，stdio 全部接管
pub fn spawn_shell(command: &str, exec_dir: &Path) -> Result<Child, ShellError> {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    };
    cmd.current_dir(exec_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd.spawn().map_err(|source| ShellError::Spawn {
        command: command.to_string(),
        source,
    })
}

fn render_streams(snapshot: &ShellSnapshot) -> String {
    format!(
        "--- STDOUT ---\n{}\n--- STDERR ---\n{}\n",
        snapshot.stdout, snapshot.stderr
    )
}

#[derive(Deserialize, JsonSchema)]
struct ExecArgs {
    /// The shell command to execute.
    command: String,
    /// Working directory for command execution. Defaults to the workspace.
    #[serde(default)]
    exec_dir: Option<String>,
}

pub struct ShellExecTool {
    manager: Arc<ShellSessionManager>,
    workspace_root: PathBuf,
}

impl ShellExecTool {
    pub fn new(manager: Arc<ShellSessionManager>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            manager,
            workspace_root: workspace_root.into(),
        }
    }
}

#[async_trait]
impl Tool for ShellExecTool {
    fn name(&self) -> &str {
        "shell_exec"
    }

    fn description(&self) -> &str {
        "Execute a command in a new shell session. This runs the command in the background. Use 'shell_view' to check the output."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<ExecArgs>()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let args: ExecArgs = parse_args(args)?;
        let exec_dir = match args.exec_dir.filter(|d| !d.trim().is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => {
                tokio::fs::create_dir_all(&self.workspace_root).await?;
                self.workspace_root.clone()
            }
        };
        let command = rewrite_interpreter(&args.command, cfg!(windows));
        tracing::info!(agent = %ctx.agent, command = %command, dir = %exec_dir.display(), "starting shell command");

        let child = spawn_shell(&command, &exec_dir)?;
        let id = self.manager.create(&command, child);
        Ok(ToolResult::success(format!(
            "Command '{}' started in background with session ID: {}. Use 'shell_view' to see the output.",
            args.command, id
        )))
    }
}

#[derive(Deserialize, JsonSchema)]
struct SessionArgs {
    /// The unique identifier of the target shell session.
    id: String,
}

pub struct ShellViewTool {
    manager: Arc<ShellSessionManager>,
}

impl ShellViewTool {
    pub fn new(manager: Arc<ShellSessionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for ShellViewTool {
    fn name(&self) -> &str {
        "shell_view"
    }

    fn description(&self) -> &str {
        "Views the output of a running or completed shell session."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<SessionArgs>()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let SessionArgs { id } = parse_args(args)?;
        ctx.events.emit(AgentEvent::Action {
            title: ">_ Terminal: view output".to_string(),
            content: format!("session_id='{}'", id),
        });

        let Some(session) = self.manager.get(&id) else {
            let err = ShellError::NotFound(id);
            ctx.events.emit(AgentEvent::Summary {
                content: format!("⚠️ Terminal error: {}", err),
            });
            return Err(err.into());
        };

        let snapshot = session.lock().await.poll(self.manager.poll_wait()).await?;
        if snapshot.return_code.is_some() {
            self.manager.remove(&id);
        }

        ctx.events.emit(AgentEvent::TerminalOutput {
            content: format!(
                "root@agent:~$ view_session {}\n{}\n{}",
                id, snapshot.stdout, snapshot.stderr
            )
            .trim()
            .to_string(),
        });

        Ok(ToolResult::success(format!(
            "SESSION ID: {}\nSTATUS: {}\n{}",
            id,
            snapshot.status_line(),
            render_streams(&snapshot)
        )))
    }
}

#[derive(Deserialize, JsonSchema)]
struct WaitArgs {
    /// The unique identifier of the target shell session.
    id: String,
    /// The maximum duration to wait in seconds.
    seconds: u64,
}

pub struct ShellWaitTool {
    manager: Arc<ShellSessionManager>,
}

impl ShellWaitTool {
    pub fn new(manager: Arc<ShellSessionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for ShellWaitTool {
    fn name(&self) -> &str {
        "shell_wait"
    }

    fn description(&self) -> &str {
        "Waits for a running process in a shell session to complete for a specified duration."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<WaitArgs>()
    }

    async fn execute(&self, _ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let WaitArgs { id, seconds } = parse_args(args)?;
        let session = self
            .manager
            .get(&id)
            .ok_or_else(|| ShellError::NotFound(id.clone()))?;

        let mut guard = session.lock().await;
        if !guard.wait_for_exit(Duration::from_secs(seconds)).await? {
            return Ok(ToolResult::success(format!(
                "Process in session '{}' did not finish within {} seconds. It is still running.",
                id, seconds
            )));
        }
        let snapshot = guard.snapshot();
        drop(guard);
        self.manager.remove(&id);

        Ok(ToolResult::success(format!(
            "Process in session '{}' finished with return code {}.\n{}",
            id,
            snapshot.return_code.unwrap_or(-1),
            render_streams(&snapshot)
        )))
    }
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize, JsonSchema)]
struct WriteArgs {
    /// The unique identifier of the target shell session.
    id: String,
    /// The text content to write to the process's STDIN.
    input: String,
    /// Whether to press the Enter key after the input. Defaults to true.
    #[serde(default = "default_true")]
    press_enter: bool,
}

pub struct ShellWriteTool {
    manager: Arc<ShellSessionManager>,
}

impl ShellWriteTool {
    pub fn new(manager: Arc<ShellSessionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for ShellWriteTool {
    fn name(&self) -> &str {
        "shell_write_to_process"
    }

    fn description(&self) -> &str {
        "Sends input to a running process in a specified shell session, with an option to simulate pressing Enter."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<WriteArgs>()
    }

    async fn execute(&self, _ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let args: WriteArgs = parse_args(args)?;
        let session = self
            .manager
            .get(&args.id)
            .ok_or_else(|| ShellError::NotActive(args.id.clone()))?;
        session
            .lock()
            .await
            .write_input(&args.input, args.press_enter)
            .await?;
        Ok(ToolResult::success(format!(
            "Successfully wrote to process in session '{}'. Use 'shell_view' to see the result.",
            args.id
        )))
    }
}

pub struct ShellKillTool {
    manager: Arc<ShellSessionManager>,
}

impl ShellKillTool {
    pub fn new(manager: Arc<ShellSessionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for ShellKillTool {
    fn name(&self) -> &str {
        "shell_kill_process"
    }

    fn description(&self) -> &str {
        "Terminates a running process in a specified shell session."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<SessionArgs>()
    }

    async fn execute(&self, _ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let SessionArgs { id } = parse_args(args)?;
        let session = self
            .manager
            .get(&id)
            .ok_or_else(|| ShellError::NotFound(id.clone()))?;
        let killed = session.lock().await.kill().await?;
        self.manager.remove(&id);
        if !killed {
            return Ok(ToolResult::success(format!(
                "Process in session '{}' has already terminated.",
                id
            )));
        }
        Ok(ToolResult::success(format!(
            "Successfully killed process in session '{}'.",
            id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::react::EventSink;

    fn session_id(output: &str) -> String {
        output
            .split("session ID: ")
            .nth(1)
            .and_then(|s| s.split('.').next())
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_rewrite_interpreter() {
        assert_eq!(rewrite_interpreter("python main.py", false), "python3 main.py");
        assert_eq!(rewrite_interpreter("python", false), "python3");
        assert_eq!(rewrite_interpreter("python3 -V", true), "python -V");
        assert_eq!(rewrite_interpreter("python3 -V", false), "python3 -V");
        assert_eq!(rewrite_interpreter("pythonista", false), "pythonista");
    }

    #[tokio::test]
    async fn test_unknown_session_is_error() {
        let manager = Arc::new(ShellSessionManager::default());
        let view = ShellViewTool::new(manager.clone());
        let err = view
            .execute(&ToolContext::default(), serde_json::json!({"id": "missing"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Session with ID 'missing' not found.");

        let write = ShellWriteTool::new(manager);
        let err = write
            .execute(
                &ToolContext::default(),
                serde_json::json!({"id": "missing", "input": "x"}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Session with ID 'missing' is not active or not found.");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exec_then_wait_removes_session() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(ShellSessionManager::default());
        let exec = ShellExecTool::new(manager.clone(), dir.path());
        let wait = ShellWaitTool::new(manager.clone());
        let ctx = ToolContext::default();

        let started = exec
            .execute(&ctx, serde_json::json!({"command": "echo hello > out.txt; cat out.txt"}))
            .await
            .unwrap();
        let id = session_id(&started.output_text());

        let done = wait
            .execute(&ctx, serde_json::json!({"id": id, "seconds": 5}))
            .await
            .unwrap();
        let text = done.output_text();
        assert!(text.contains("finished with return code 0"));
        assert!(text.contains("hello"));
        assert!(manager.get(&id).is_none());
        assert!(dir.path().join("out.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_after_exit_unregisters_session() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(ShellSessionManager::default());
        let exec = ShellExecTool::new(manager.clone(), dir.path());
        let kill = ShellKillTool::new(manager.clone());
        let ctx = ToolContext::default();

        let started = exec
            .execute(&ctx, serde_json::json!({"command": "true"}))
            .await
            .unwrap();
        let id = session_id(&started.output_text());
        let session = manager.get(&id).unwrap();
        assert!(session
            .lock()
            .await
            .wait_for_exit(Duration::from_secs(5))
            .await
            .unwrap());

        let out = kill
            .execute(&ctx, serde_json::json!({"id": id}))
            .await
            .unwrap();
        assert_eq!(
            out.output_text(),
            format!("Process in session '{}' has already terminated.", id)
        );
        assert!(manager.get(&id).is_none());
        assert!(manager.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_view_emits_terminal_output_and_kill() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(ShellSessionManager::default());
        let exec = ShellExecTool::new(manager.clone(), dir.path());
        let view = ShellViewTool::new(manager.clone());
        let kill = ShellKillTool::new(manager.clone());
        let (events, mut rx) = EventSink::channel();
        let ctx = ToolContext::new("tester", events, None);

        let started = exec
            .execute(&ctx, serde_json::json!({"command": "echo ready; sleep 5"}))
            .await
            .unwrap();
        let id = session_id(&started.output_text());

        let mut text = String::new();
        for _ in 0..20 {
            text = view
                .execute(&ctx, serde_json::json!({"id": id}))
                .await
                .unwrap()
                .output_text();
            if text.contains("ready") {
                break;
            }
        }
        assert!(text.contains("STATUS: Running (PID: "));
        assert!(text.contains("ready"));

        let mut saw_terminal = false;
        while let Ok(ev) = rx.try_recv() {
            if let AgentEvent::TerminalOutput { content } = ev {
                saw_terminal |= content.starts_with("root@agent:~$ view_session");
            }
        }
        assert!(saw_terminal);

        let killed = kill
            .execute(&ctx, serde_json::json!({"id": id}))
            .await
            .unwrap();
        assert!(killed.output_text().starts_with("Successfully killed process"));
        assert!(manager.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wait_timeout_reports_still_running() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(ShellSessionManager::default());
        let exec = ShellExecTool::new(manager.clone(), dir.path());
        let wait = ShellWaitTool::new(manager.clone());
        let ctx = ToolContext::default();

        let started = exec
            .execute(&ctx, serde_json::json!({"command": "sleep 5"}))
            .await
            .unwrap();
        let id = session_id(&started.output_text());
        let out = wait
            .execute(&ctx, serde_json::json!({"id": id, "seconds": 0}))
            .await
            .unwrap();
        assert!(out.output_text().ends_with("It is still running."));
        assert!(manager.get(&id).is_some());
        manager.kill_all().await;
    }
}
