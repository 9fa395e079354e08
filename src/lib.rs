//! Forager - Rust 工具调用智能体运行时
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、状态、草稿板与多 Agent 编排
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 对话消息与工具调用记录
//! - **react**: Agent 状态机、工具调用策略、过程事件、提示词
//! - **session**: 后台 shell 与浏览器会话管理
//! - **tools**: Tool trait、注册表与内置工具

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod session;
pub mod tools;
