//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按脚本依次返回推理文本与工具调用；脚本耗尽后回显最后一条用户消息，
//! 若可用工具中有 terminate / idle 则直接调用它结束运行，便于本地跑通完整流程。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, LlmResponse, ToolChoice, ToolSchema};
use crate::memory::{Message, Role, ToolCall};

/// 脚本耗尽后会主动调用的结束类工具
const FINISH_TOOLS: &[&str] = &["terminate", "idle"];

/// 一次 ask_tool 请求的记录
#[derive(Debug, Clone)]
pub struct RecordedToolRequest {
    pub tool_names: Vec<String>,
    pub choice: ToolChoice,
    pub message_count: usize,
}

#[derive(Default)]
struct Script {
    thoughts: VecDeque<Result<String, LlmError>>,
    decisions: VecDeque<Result<LlmResponse, LlmError>>,
    requests: Vec<RecordedToolRequest>,
}

/// 脚本化 Mock 客户端
#[derive(Default)]
pub struct MockLlmClient {
    script: Mutex<Script>,
    next_call_id: AtomicUsize,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 下一次 ask 返回的推理文本
    pub fn push_thought(&self, text: impl Into<String>) -> &Self {
        self.script().thoughts.push_back(Ok(text.into()));
        self
    }

    pub fn push_thought_error(&self, err: LlmError) -> &Self {
        self.script().thoughts.push_back(Err(err));
        self
    }

    /// 下一次 ask_tool 返回的工具调用（name, arguments JSON 文本），id 自动生成
    pub fn push_tool_calls(&self, calls: &[(&str, &str)]) -> &Self {
        let tool_calls = calls
            .iter()
            .map(|(name, args)| ToolCall::new(self.call_id(), *name, *args))
            .collect();
        self.script().decisions.push_back(Ok(LlmResponse {
            content: None,
            tool_calls,
        }));
        self
    }

    /// 下一次 ask_tool 只返回文本，不带工具调用
    pub fn push_text_decision(&self, text: impl Into<String>) -> &Self {
        self.script().decisions.push_back(Ok(LlmResponse {
            content: Some(text.into()),
            tool_calls: Vec::new(),
        }));
        self
    }

    pub fn push_decision_error(&self, err: LlmError) -> &Self {
        self.script().decisions.push_back(Err(err));
        self
    }

    /// 已收到的 ask_tool 请求
    pub fn tool_requests(&self) -> Vec<RecordedToolRequest> {
        self.script().requests.clone()
    }

    fn call_id(&self) -> String {
        format!("call_{}", self.next_call_id.fetch_add(1, Ordering::Relaxed))
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        match self.script.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn last_user_text(messages: &[Message]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("(no input)")
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn ask(&self, messages: &[Message], _system: &[Message]) -> Result<String, LlmError> {
        if let Some(next) = self.script().thoughts.pop_front() {
            return next;
        }
        Ok(format!("Echo from Mock: {}", last_user_text(messages)))
    }

    async fn ask_tool(
        &self,
        messages: &[Message],
        _system: &[Message],
        tools: &[ToolSchema],
        choice: ToolChoice,
    ) -> Result<LlmResponse, LlmError> {
        let next = {
            let mut script = self.script();
            script.requests.push(RecordedToolRequest {
                tool_names: tools.iter().map(|t| t.name.clone()).collect(),
                choice,
                message_count: messages.len(),
            });
            script.decisions.pop_front()
        };
        if let Some(next) = next {
            return next;
        }

        let finish = tools
            .iter()
            .find(|t| FINISH_TOOLS.contains(&t.name.as_str()));
        Ok(match finish {
            Some(tool) => LlmResponse {
                content: None,
                tool_calls: vec![ToolCall::new(
                    self.call_id(),
                    tool.name.clone(),
                    r#"{"status":"success"}"#,
                )],
            },
            None => LlmResponse {
                content: Some(format!("Echo from Mock: {}", last_user_text(messages))),
                tool_calls: Vec::new(),
            },
        })
    }
}
