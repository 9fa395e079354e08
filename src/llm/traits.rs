//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient：ask（仅文本推理）、ask_tool（附带工具 schema 的决策）。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::memory::{Message, ToolCall};

/// 决策层错误：token 超限需要与其它故障区分（前者让 run 优雅结束）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("Token limit exceeded: {0}")]
    TokenLimitExceeded(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    pub fn is_token_limit(&self) -> bool {
        matches!(self, LlmError::TokenLimitExceeded(_))
    }
}

/// 工具选择策略
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    None,
    #[default]
    Auto,
    Required,
}

impl ToolChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolChoice::None => "none",
            ToolChoice::Auto => "auto",
            ToolChoice::Required => "required",
        }
    }

    /// 解析配置中的字符串，未知值回落为 Auto
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "required" => ToolChoice::Required,
            "none" => ToolChoice::None,
            _ => ToolChoice::Auto,
        }
    }
}

/// 暴露给模型的工具描述
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSchema {
    /// OpenAI function calling 格式
    pub fn to_function_json(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// 带工具的决策结果：可选文本 + 零或多个工具调用
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LlmResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 不带工具 schema 的纯文本推理
    async fn ask(&self, messages: &[Message], system: &[Message]) -> Result<String, LlmError>;

    /// 附带工具 schema 与选择策略的决策
    async fn ask_tool(
        &self,
        messages: &[Message],
        system: &[Message],
        tools: &[ToolSchema],
        choice: ToolChoice,
    ) -> Result<LlmResponse, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
