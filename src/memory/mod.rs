//! 记忆层：对话消息、工具调用记录与 token 估算

pub mod conversation;
pub mod token_budget;

pub use conversation::{FunctionCall, Memory, Message, Role, ToolCall};
pub use token_budget::TokenEstimator;
