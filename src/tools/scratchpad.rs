//! scratchpad_read / scratchpad_write：在一次编排运行内让 Agent 之间传递笔记

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::core::Scratchpad;
use crate::tools::schema::{args_schema, parse_args};
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

fn scratchpad(ctx: &ToolContext) -> Result<&Scratchpad, ToolError> {
    ctx.scratchpad
        .as_ref()
        .ok_or_else(|| ToolError::Execution("No scratchpad is attached to this run.".to_string()))
}

#[derive(Deserialize, JsonSchema)]
struct ReadArgs {
    /// Key to read. Omit to list the whole scratchpad.
    #[serde(default)]
    key: Option<String>,
}

pub struct ScratchpadReadTool;

#[async_trait]
impl Tool for ScratchpadReadTool {
    fn name(&self) -> &str {
        "scratchpad_read"
    }

    fn description(&self) -> &str {
        "Reads shared notes left by other agents in this run. Pass a key to read one entry, or omit it to see everything."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<ReadArgs>()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let ReadArgs { key } = parse_args(args)?;
        let pad = scratchpad(ctx)?;
        match key {
            None => Ok(ToolResult::success(pad.to_string())),
            Some(key) => match pad.get(&key) {
                Some(value) => Ok(ToolResult::success(value)),
                None => Ok(ToolResult::success(format!(
                    "No entry for key '{}' in the scratchpad.",
                    key
                ))),
            },
        }
    }
}

#[derive(Deserialize, JsonSchema)]
struct WriteArgs {
    /// Key to store the note under.
    key: String,
    /// Value to store (text or any JSON value).
    value: Value,
}

pub struct ScratchpadWriteTool;

#[async_trait]
impl Tool for ScratchpadWriteTool {
    fn name(&self) -> &str {
        "scratchpad_write"
    }

    fn description(&self) -> &str {
        "Writes or overwrites a shared note that other agents in this run can read."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<WriteArgs>()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let WriteArgs { key, value } = parse_args(args)?;
        scratchpad(ctx)?.set(key.clone(), value);
        Ok(ToolResult::success(format!("Saved '{}' to the scratchpad.", key)))
    }
}
