//! 面向用户的消息工具：message_notify_user / message_ask_user

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::react::AgentEvent;
use crate::tools::schema::{args_schema, parse_args};
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

#[derive(Deserialize, JsonSchema)]
struct NotifyArgs {
    /// The message text to display to the user.
    text: String,
}

pub struct NotifyUserTool;

#[async_trait]
impl Tool for NotifyUserTool {
    fn name(&self) -> &str {
        "message_notify_user"
    }

    fn description(&self) -> &str {
        "Sends an informational message to the user (acknowledgments, progress updates, task completions, etc.). Does not require a response."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<NotifyArgs>()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let NotifyArgs { text } = parse_args(args)?;
        ctx.events.emit(AgentEvent::Chat { content: text });
        Ok(ToolResult::success("Notification sent to user."))
    }
}

#[derive(Deserialize, JsonSchema)]
struct AskArgs {
    /// The question to ask the user.
    text: String,
}

/// 向用户提问并挂起当前运行，直到下一次 run 带回答案
pub struct AskUserTool;

#[async_trait]
impl Tool for AskUserTool {
    fn name(&self) -> &str {
        "message_ask_user"
    }

    fn description(&self) -> &str {
        "Asks a question to the user and waits for a response (for clarifications, confirmations, or additional information)."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<AskArgs>()
    }

    async fn execute(&self, _ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let AskArgs { text } = parse_args(args)?;
        Ok(ToolResult::awaiting_input(format!(
            "Question for the user: {}",
            text
        )))
    }
}
