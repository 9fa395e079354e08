//! 后台 Shell 会话管理
//!
//! 每个会话持有一个已启动的子进程；stdout / stderr 由后台读任务送入通道，
//! poll 在有界等待内把已到达的输出追加到累计缓冲区，不阻塞 Agent 循环。
//! 管理器本身不负责启动进程，启动由 shell_exec 工具完成。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("Session with ID '{0}' not found.")]
    NotFound(String),

    #[error("Session with ID '{0}' is not active or not found.")]
    NotActive(String),

    #[error("Session '{0}' does not have a STDIN to write to.")]
    NoStdin(String),

    #[error("Failed to start command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error in session '{id}': {source}")]
    Io {
        id: String,
        #[source]
        source: std::io::Error,
    },
}

/// 某一时刻的会话视图
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellSnapshot {
    pub pid: Option<u32>,
    pub return_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ShellSnapshot {
    pub fn status_line(&self) -> String {
        match self.return_code {
            Some(code) => format!("Finished with code {}", code),
            None => format!(
                "Running (PID: {})",
                self.pid.map_or_else(|| "unknown".to_string(), |p| p.to_string())
            ),
        }
    }
}

/// 单个后台进程
pub struct ShellSession {
    id: String,
    command: String,
    child: Child,
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    stdout_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    stderr_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    readers: Vec<JoinHandle<()>>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    return_code: Option<i32>,
    drain_grace: Duration,
}

impl ShellSession {
    /// 接管已启动的子进程（stdout / stderr 需为 piped）
    pub fn new(id: String, command: String, mut child: Child, drain_grace: Duration) -> Self {
        let pid = child.id();
        let stdin = child.stdin.take();
        let (stdout_tx, stdout_rx) = mpsc::unbounded_channel();
        let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            readers.push(tokio::spawn(pump(out, stdout_tx)));
        }
        if let Some(err) = child.stderr.take() {
            readers.push(tokio::spawn(pump(err, stderr_tx)));
        }
        Self {
            id,
            command,
            child,
            pid,
            stdin,
            stdout_rx,
            stderr_rx,
            readers,
            stdout: Vec::new(),
            stderr: Vec::new(),
            return_code: None,
            drain_grace,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn return_code(&self) -> Option<i32> {
        self.return_code
    }

    /// 仍在运行（尚未观察到退出码）
    pub fn is_alive(&self) -> bool {
        self.return_code.is_none()
    }

    /// 在 `wait` 内等待退出并收取已到达的输出；进程退出后会把剩余输出读完
    pub async fn poll(&mut self, wait: Duration) -> Result<ShellSnapshot, ShellError> {
        if self.is_alive() {
            if let Ok(status) = tokio::time::timeout(wait, self.child.wait()).await {
                let status = status.map_err(|source| self.io_error(source))?;
                self.return_code = Some(status.code().unwrap_or(-1));
            }
        }
        if !self.is_alive() {
            self.join_readers().await;
        }
        self.drain();
        Ok(self.snapshot())
    }

    /// 最多等待 `timeout` 直到进程退出；返回是否已退出
    pub async fn wait_for_exit(&mut self, timeout: Duration) -> Result<bool, ShellError> {
        if self.is_alive() {
            match tokio::time::timeout(timeout, self.child.wait()).await {
                Ok(status) => {
                    let status = status.map_err(|source| self.io_error(source))?;
                    self.return_code = Some(status.code().unwrap_or(-1));
                }
                Err(_) => {
                    self.drain();
                    return Ok(false);
                }
            }
        }
        self.join_readers().await;
        self.drain();
        Ok(true)
    }

    /// 写入子进程 stdin
    pub async fn write_input(&mut self, input: &str, press_enter: bool) -> Result<(), ShellError> {
        self.refresh()?;
        if !self.is_alive() {
            return Err(ShellError::NotActive(self.id.clone()));
        }
        let id = self.id.clone();
        let stdin = self.stdin.as_mut().ok_or(ShellError::NoStdin(id.clone()))?;
        let mut data = input.to_string();
        if press_enter {
            data.push('\n');
        }
        stdin
            .write_all(data.as_bytes())
            .await
            .map_err(|source| ShellError::Io { id: id.clone(), source })?;
        stdin
            .flush()
            .await
            .map_err(|source| ShellError::Io { id, source })?;
        Ok(())
    }

    /// 结束进程并等待其退出；返回 false 表示进程此前已退出
    pub async fn kill(&mut self) -> Result<bool, ShellError> {
        self.refresh()?;
        if !self.is_alive() {
            return Ok(false);
        }
        self.child
            .kill()
            .await
            .map_err(|source| self.io_error(source))?;
        self.refresh()?;
        if self.return_code.is_none() {
            self.return_code = Some(-1);
        }
        Ok(true)
    }

    pub fn snapshot(&self) -> ShellSnapshot {
        ShellSnapshot {
            pid: self.pid,
            return_code: self.return_code,
            stdout: String::from_utf8_lossy(&self.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&self.stderr).into_owned(),
        }
    }

    fn refresh(&mut self) -> Result<(), ShellError> {
        if self.is_alive() {
            if let Some(status) = self.child.try_wait().map_err(|source| self.io_error(source))? {
                self.return_code = Some(status.code().unwrap_or(-1));
            }
        }
        Ok(())
    }

    async fn join_readers(&mut self) {
        for handle in self.readers.drain(..) {
            if tokio::time::timeout(self.drain_grace, handle).await.is_err() {
                tracing::debug!(session = %self.id, "output reader still open after process exit");
            }
        }
    }

    fn drain(&mut self) {
        while let Ok(chunk) = self.stdout_rx.try_recv() {
            self.stdout.extend_from_slice(&chunk);
        }
        while let Ok(chunk) = self.stderr_rx.try_recv() {
            self.stderr.extend_from_slice(&chunk);
        }
    }

    fn io_error(&self, source: std::io::Error) -> ShellError {
        ShellError::Io {
            id: self.id.clone(),
            source,
        }
    }
}

async fn pump<R: AsyncRead + Unpin>(mut reader: R, tx: mpsc::UnboundedSender<Vec<u8>>) {
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "shell output reader stopped");
                break;
            }
        }
    }
}

pub type SharedShellSession = Arc<tokio::sync::Mutex<ShellSession>>;

/// 进程级会话表；启动时构造一次，按引用注入到各个 shell 工具
pub struct ShellSessionManager {
    sessions: Mutex<HashMap<String, SharedShellSession>>,
    poll_wait: Duration,
    drain_grace: Duration,
}

impl Default for ShellSessionManager {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_millis(500))
    }
}

impl ShellSessionManager {
    pub fn new(poll_wait: Duration, drain_grace: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            poll_wait,
            drain_grace,
        }
    }

    /// poll 使用的有界等待
    pub fn poll_wait(&self) -> Duration {
        self.poll_wait
    }

    /// 登记一个已启动的进程，返回新会话 ID
    pub fn create(&self, command: &str, child: Child) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let session = ShellSession::new(id.clone(), command.to_string(), child, self.drain_grace);
        tracing::debug!(session = %id, command = %command, "shell session created");
        self.lock()
            .insert(id.clone(), Arc::new(tokio::sync::Mutex::new(session)));
        id
    }

    pub fn get(&self, id: &str) -> Option<SharedShellSession> {
        self.lock().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<SharedShellSession> {
        let removed = self.lock().remove(id);
        if removed.is_some() {
            tracing::debug!(session = %id, "shell session removed");
        }
        removed
    }

    pub fn ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// 结束并移除所有会话
    pub async fn kill_all(&self) {
        let sessions: Vec<(String, SharedShellSession)> = self.lock().drain().collect();
        for (id, session) in sessions {
            if let Err(e) = session.lock().await.kill().await {
                tracing::warn!(session = %id, error = %e, "failed to kill shell session");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SharedShellSession>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    fn spawn(cmd: &str) -> Child {
        Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn test_poll_after_exit_reports_output_and_code() {
        let manager = ShellSessionManager::default();
        let id = manager.create("echo X", spawn("echo X"));
        let session = manager.get(&id).unwrap();

        let mut snapshot = session.lock().await.poll(Duration::from_millis(100)).await.unwrap();
        for _ in 0..50 {
            if snapshot.return_code.is_some() {
                break;
            }
            snapshot = session.lock().await.poll(Duration::from_millis(100)).await.unwrap();
        }
        assert_eq!(snapshot.return_code, Some(0));
        assert!(snapshot.stdout.contains('X'));
        assert_eq!(snapshot.status_line(), "Finished with code 0");

        manager.remove(&id);
        assert!(manager.get(&id).is_none());
    }

    #[tokio::test]
    async fn test_output_accumulates_across_polls() {
        let manager = ShellSessionManager::default();
        let id = manager.create("two lines", spawn("echo first; sleep 0.3; echo second"));
        let session = manager.get(&id).unwrap();
        let mut guard = session.lock().await;

        let early = guard.poll(Duration::from_millis(100)).await.unwrap();
        assert!(early.return_code.is_none());
        assert!(early.status_line().starts_with("Running (PID: "));

        assert!(guard.wait_for_exit(Duration::from_secs(5)).await.unwrap());
        let done = guard.snapshot();
        assert!(done.stdout.contains("first"));
        assert!(done.stdout.contains("second"));
    }

    #[tokio::test]
    async fn test_wait_timeout_leaves_process_running() {
        let manager = ShellSessionManager::default();
        let id = manager.create("sleep 5", spawn("sleep 5"));
        let session = manager.get(&id).unwrap();
        let mut guard = session.lock().await;
        assert!(!guard.wait_for_exit(Duration::from_millis(100)).await.unwrap());
        assert!(guard.is_alive());
        assert!(guard.kill().await.unwrap());
        assert!(!guard.is_alive());
        assert!(!guard.kill().await.unwrap());
    }

    #[tokio::test]
    async fn test_write_input_reaches_process() {
        let manager = ShellSessionManager::default();
        let id = manager.create("head -n 1", spawn("head -n 1"));
        let session = manager.get(&id).unwrap();
        let mut guard = session.lock().await;
        guard.write_input("hello", true).await.unwrap();
        assert!(guard.wait_for_exit(Duration::from_secs(5)).await.unwrap());
        assert_eq!(guard.snapshot().stdout, "hello\n");

        let err = guard.write_input("again", true).await.unwrap_err();
        assert!(matches!(err, ShellError::NotActive(_)));
    }

    #[tokio::test]
    async fn test_kill_all_empties_manager() {
        let manager = ShellSessionManager::default();
        manager.create("sleep 5", spawn("sleep 5"));
        manager.create("sleep 5", spawn("sleep 5"));
        assert_eq!(manager.len(), 2);
        manager.kill_all().await;
        assert!(manager.is_empty());
    }
}
