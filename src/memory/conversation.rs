//! 对话记忆：有序的消息序列
//!
//! 追加后消息不可修改，唯一的例外是 think 阶段把工具调用挂到刚写入的推理消息上
//! （见 [`Memory::attach_tool_calls`]）。tool 消息必须引用之前某条 assistant 消息里的调用 id。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::MemoryError;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    System,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::System => "system",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// 模型请求的函数调用：名称 + 原始参数文本（由被调方解析）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// 一次工具调用请求，由决策步骤产生，被分发恰好消费一次
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

fn default_call_type() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            call_type: default_call_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64_image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            base64_image: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    /// 工具结果消息：绑定发起调用的 id 与工具名
    pub fn tool(
        content: impl Into<String>,
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        base64_image: Option<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
            base64_image,
            ..Self::plain(Role::Tool, content)
        }
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = calls;
        self
    }
}

/// Agent 的对话记忆；可选上限，由 [`Memory::prune`] 在步与步之间丢弃最旧消息
#[derive(Clone, Debug, Default)]
pub struct Memory {
    messages: Vec<Message>,
    max_messages: Option<usize>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_messages(max_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_messages: Some(max_messages),
        }
    }

    /// 追加一条消息；tool 消息的 tool_call_id 必须能在之前的 assistant 消息里找到
    pub fn add_message(&mut self, msg: Message) -> Result<(), MemoryError> {
        if msg.role == Role::Tool {
            let id = msg
                .tool_call_id
                .as_deref()
                .ok_or(MemoryError::MissingToolCallId)?;
            if !self.known_call_ids().contains(id) {
                return Err(MemoryError::UnknownToolCallId(id.to_string()));
            }
        }
        self.messages.push(msg);
        Ok(())
    }

    pub fn add_messages(&mut self, msgs: impl IntoIterator<Item = Message>) -> Result<(), MemoryError> {
        for msg in msgs {
            self.add_message(msg)?;
        }
        Ok(())
    }

    /// 将工具调用挂到最后一条 assistant 消息上（把同一轮的思考与行动绑定在一起）。
    /// 最后一条不是 assistant 或已带有调用时，另起一条空内容的 assistant 消息。
    pub fn attach_tool_calls(&mut self, calls: Vec<ToolCall>) {
        match self.messages.last_mut() {
            Some(last) if last.role == Role::Assistant && last.tool_calls.is_empty() => {
                last.tool_calls = calls;
            }
            _ => {
                self.messages.push(Message::assistant("").with_tool_calls(calls));
            }
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// 最近 n 条消息
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn known_call_ids(&self) -> HashSet<&str> {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .flat_map(|m| m.tool_calls.iter().map(|c| c.id.as_str()))
            .collect()
    }

    pub fn max_messages(&self) -> Option<usize> {
        self.max_messages
    }

    /// 超出上限时丢弃最旧的消息；开头失去对应调用的 tool 消息一并丢弃。
    /// 只在一步开始前调用，一轮 act 中途不会挤掉正在回复的 assistant 消息。
    pub fn prune(&mut self) {
        let Some(max) = self.max_messages else {
            return;
        };
        if self.messages.len() > max {
            let excess = self.messages.len() - max;
            self.messages.drain(..excess);
            let orphans = self
                .messages
                .iter()
                .take_while(|m| m.role == Role::Tool)
                .count();
            self.messages.drain(..orphans);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_message_requires_prior_call() {
        let mut memory = Memory::new();
        let err = memory
            .add_message(Message::tool("out", "call_1", "shell_exec", None))
            .unwrap_err();
        assert_eq!(err, MemoryError::UnknownToolCallId("call_1".into()));
        assert!(memory.is_empty());

        memory
            .add_message(Message::assistant("").with_tool_calls(vec![ToolCall::new(
                "call_1",
                "shell_exec",
                "{}",
            )]))
            .unwrap();
        memory
            .add_message(Message::tool("out", "call_1", "shell_exec", None))
            .unwrap();
        assert_eq!(memory.len(), 2);
    }

    #[test]
    fn test_attach_tool_calls_links_thought_and_action() {
        let mut memory = Memory::new();
        memory.add_message(Message::user("go")).unwrap();
        memory.add_message(Message::assistant("I will list files")).unwrap();
        memory.attach_tool_calls(vec![ToolCall::new("c1", "shell_exec", "{}")]);

        assert_eq!(memory.len(), 2);
        let last = memory.last().unwrap();
        assert_eq!(last.content, "I will list files");
        assert_eq!(last.tool_calls.len(), 1);
    }

    #[test]
    fn test_prune_drops_orphan_tool_messages() {
        let mut memory = Memory::with_max_messages(2);
        memory
            .add_message(Message::assistant("").with_tool_calls(vec![ToolCall::new("c1", "t", "{}")]))
            .unwrap();
        memory.add_message(Message::tool("r", "c1", "t", None)).unwrap();
        memory.add_message(Message::user("next")).unwrap();
        assert_eq!(memory.len(), 3);

        memory.prune();
        // assistant 被挤出后，它的 tool 结果也不能留在开头
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.messages()[0].role, Role::User);
    }

    #[test]
    fn test_limit_never_splits_calls_within_a_turn() {
        let mut memory = Memory::with_max_messages(2);
        memory.add_message(Message::user("go")).unwrap();
        memory
            .add_message(Message::assistant("three calls").with_tool_calls(vec![
                ToolCall::new("c1", "t", "{}"),
                ToolCall::new("c2", "t", "{}"),
                ToolCall::new("c3", "t", "{}"),
            ]))
            .unwrap();
        for id in ["c1", "c2", "c3"] {
            memory.add_message(Message::tool("r", id, "t", None)).unwrap();
        }
        assert_eq!(memory.len(), 5);

        memory.prune();
        assert_eq!(memory.len(), 0);
        memory.add_message(Message::user("again")).unwrap();
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
    }
}
