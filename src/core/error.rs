//! Agent 错误类型
//!
//! 工具层错误不会出现在这里：它们在 ToolCollection 中已被转换为失败的 ToolResult。
//! 这里只保留会终止一次 run 的错误（状态误用、决策层故障、契约违反）。

use thiserror::Error;

use crate::core::AgentState;
use crate::llm::LlmError;

/// Agent 运行过程中会向调用方传播的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 在非 IDLE / AWAITING_USER_INPUT 状态下调用 run
    #[error("Cannot run agent from state: {0}")]
    InvalidStateTransition(AgentState),

    /// tool_choice 为 REQUIRED 但模型没有给出任何工具调用
    #[error("Tool calls required but none provided")]
    ToolCallsRequired,

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Orchestration error: {0}")]
    Orchestration(String),
}

/// 对话记忆的不变量被破坏
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// tool 消息缺少 tool_call_id
    #[error("Tool message is missing tool_call_id")]
    MissingToolCallId,

    /// tool 消息引用的 id 不在之前任何 assistant 消息的 tool_calls 中
    #[error("Tool message references unknown tool call id: {0}")]
    UnknownToolCallId(String),
}
