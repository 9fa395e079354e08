//! 过程事件：用于向外部观察者推送思考、工具调用、终端输出、浏览器画面等
//!
//! EventSink 是即发即弃的：接收端关闭或未设置时静默丢弃，不影响 Agent 状态。

use serde::Serialize;
use tokio::sync::mpsc;

/// 计划步骤（供前端展示，状态已映射为 pending / in_progress / completed）
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlanStepView {
    pub id: String,
    pub text: String,
    pub status: String,
}

/// 单个过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// 步数更新（当前第几步）
    StepUpdate {
        agent: String,
        step: usize,
        max_steps: usize,
    },
    /// 行动前的推理文本
    Thought { agent: String, content: String },
    /// 工具调用（分发前）
    Action { title: String, content: String },
    /// 结束 / 总结
    Summary { content: String },
    /// 面向用户的临时消息
    Chat { content: String },
    /// 浏览器截图（data URI）与当前 URL
    BrowserView {
        screenshot: Option<String>,
        url: String,
    },
    /// 编辑器视图中的文件内容
    CodeEditor { content: String, language: String },
    /// 终端原始输出
    TerminalOutput { content: String },
    /// 计划更新
    Plan { steps: Vec<PlanStepView> },
}

impl AgentEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::StepUpdate { .. } => "step_update",
            AgentEvent::Thought { .. } => "thought",
            AgentEvent::Action { .. } => "action",
            AgentEvent::Summary { .. } => "summary",
            AgentEvent::Chat { .. } => "chat",
            AgentEvent::BrowserView { .. } => "browser_view",
            AgentEvent::CodeEditor { .. } => "code_editor",
            AgentEvent::TerminalOutput { .. } => "terminal_output",
            AgentEvent::Plan { .. } => "plan",
        }
    }
}

/// 事件回调出口；克隆后共享同一通道
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<AgentEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<AgentEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// 不投递任何事件
    pub fn noop() -> Self {
        Self::default()
    }

    /// 创建一对 sink / receiver
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AgentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn is_connected(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    pub fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// 根据文件扩展名推断编辑器语言
pub fn language_for_path(path: &str) -> &'static str {
    let ext = std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    match ext {
        "py" => "python",
        "js" => "javascript",
        "ts" | "tsx" => "typescript",
        "html" => "html",
        "css" => "css",
        "json" => "json",
        "md" => "markdown",
        "sh" => "shell",
        "rs" => "rust",
        _ => "plaintext",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let ev = AgentEvent::BrowserView {
            screenshot: None,
            url: "https://example.com".into(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "browser_view");
        assert_eq!(json["url"], "https://example.com");
        assert_eq!(ev.kind(), "browser_view");
    }

    #[test]
    fn test_sink_is_fire_and_forget() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(AgentEvent::Chat { content: "lost".into() });
        EventSink::noop().emit(AgentEvent::Chat { content: "lost".into() });
        assert!(!sink.is_connected());
    }

    #[tokio::test]
    async fn test_sink_delivers_in_order() {
        let (sink, mut rx) = EventSink::channel();
        let cloned = sink.clone();
        sink.emit(AgentEvent::Summary { content: "a".into() });
        cloned.emit(AgentEvent::Summary { content: "b".into() });
        assert_eq!(rx.recv().await, Some(AgentEvent::Summary { content: "a".into() }));
        assert_eq!(rx.recv().await, Some(AgentEvent::Summary { content: "b".into() }));
    }

    #[test]
    fn test_language_for_path() {
        assert_eq!(language_for_path("/tmp/a.py"), "python");
        assert_eq!(language_for_path("/tmp/Makefile"), "plaintext");
    }
}
