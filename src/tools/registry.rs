//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolCollection 按名注册与查找。
//! ToolCollection::execute 把每次调用的结果归一化为 ToolResult：未知工具、工具返回的错误、工具 panic
//! 都转为失败结果，不会越过注册表；每次调用输出结构化审计日志（JSON）。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::Value;

use crate::core::Scratchpad;
use crate::llm::ToolSchema;
use crate::react::EventSink;
use crate::tools::{ToolError, ToolResult};

/// 单次调用的上下文：调用方 Agent、事件出口、本次编排的草稿板
#[derive(Clone, Debug, Default)]
pub struct ToolContext {
    pub agent: String,
    pub events: EventSink,
    pub scratchpad: Option<Scratchpad>,
}

impl ToolContext {
    pub fn new(agent: impl Into<String>, events: EventSink, scratchpad: Option<Scratchpad>) -> Self {
        Self {
            agent: agent.into(),
            events,
            scratchpad,
        }
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON 对象）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（function calling 中的 name）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema（供 LLM 生成正确的参数格式）
    /// 默认返回空对象，表示无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具
    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError>;

    /// 释放工具持有的外部资源；默认无操作
    async fn cleanup(&self) {}

    fn to_param(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// 一个 Agent 当前可用的工具集合（保持注册顺序）
#[derive(Clone, Default)]
pub struct ToolCollection {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tools(tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        let mut collection = Self::new();
        collection.add_tools(tools);
        collection
    }

    /// 添加工具；同名工具已存在时保留原有的并记录警告，返回是否添加
    pub fn add_tool(&mut self, tool: Arc<dyn Tool>) -> bool {
        if self.contains(tool.name()) {
            tracing::warn!(tool = %tool.name(), "tool already exists in collection, skipping");
            return false;
        }
        self.tools.push(tool);
        true
    }

    pub fn add(&mut self, tool: impl Tool + 'static) -> bool {
        self.add_tool(Arc::new(tool))
    }

    pub fn add_tools(&mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) {
        for tool in tools {
            self.add_tool(tool);
        }
    }

    /// 按名移除（外部工具源断开时使用）
    pub fn remove_tool(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        let idx = self.tools.iter().position(|t| t.name() == name)?;
        Some(self.tools.remove(idx))
    }

    /// 移除所有满足条件的工具，返回移除数量
    pub fn remove_where(&mut self, pred: impl Fn(&dyn Tool) -> bool) -> usize {
        let before = self.tools.len();
        self.tools.retain(|t| !pred(t.as_ref()));
        before - self.tools.len()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 按注册顺序导出的工具 schema，供 ask_tool 使用
    pub fn to_params(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.to_param()).collect()
    }

    /// 执行指定工具；任何结果都归一化为 ToolResult
    pub async fn execute(&self, name: &str, args: Value, ctx: &ToolContext) -> ToolResult {
        let Some(tool) = self.get(name) else {
            return ToolResult::failure(format!("Tool {} is invalid", name));
        };

        let start = Instant::now();
        let preview = args_preview(&args);
        let outcome = AssertUnwindSafe(tool.execute(ctx, args)).catch_unwind().await;

        let (result, outcome_label) = match outcome {
            Ok(Ok(result)) => (result, "ok"),
            Ok(Err(e)) => (ToolResult::failure(e.to_string()), "error"),
            Err(panic) => {
                let msg = panic_message(panic.as_ref());
                tracing::error!(tool = %name, panic = %msg, "unexpected error executing tool");
                (
                    ToolResult::failure(format!("Unexpected error in tool {}: {}", name, msg)),
                    "panic",
                )
            }
        };

        let audit = serde_json::json!({
            "event": "tool_audit",
            "ts": chrono::Utc::now().to_rfc3339(),
            "agent": ctx.agent,
            "tool": name,
            "ok": !result.is_error(),
            "outcome": outcome_label,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");
        result
    }

    /// 依次清理所有工具
    pub async fn cleanup_all(&self) {
        for tool in &self.tools {
            tracing::debug!(tool = %tool.name(), "cleaning up tool");
            tool.cleanup().await;
        }
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool panicked".to_string()
    }
}
