//! 结束类特殊工具：terminate / idle
//!
//! 两者行为相同，只是名称不同；是否结束循环由策略层的特殊工具名集合决定。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::react::AgentEvent;
use crate::tools::schema::{args_schema, parse_args};
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FinishStatus {
    Success,
    Failure,
}

impl FinishStatus {
    fn as_str(&self) -> &'static str {
        match self {
            FinishStatus::Success => "success",
            FinishStatus::Failure => "failure",
        }
    }
}

#[derive(Deserialize, JsonSchema)]
struct FinishArgs {
    /// The finish status of the interaction.
    status: FinishStatus,
}

pub struct FinishTool {
    name: &'static str,
    description: &'static str,
}

impl FinishTool {
    pub fn terminate() -> Self {
        Self {
            name: "terminate",
            description: "Terminate the interaction when the request is met OR if the assistant cannot proceed further with the task. When you have finished all the tasks, call this tool to end the work.",
        }
    }

    pub fn idle() -> Self {
        Self {
            name: "idle",
            description: "A special tool to indicate all tasks are completed and the assistant is entering an idle state.",
        }
    }
}

#[async_trait]
impl Tool for FinishTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<FinishArgs>()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let FinishArgs { status } = parse_args(args)?;
        ctx.events.emit(AgentEvent::Action {
            title: "🏁 Finish execution".to_string(),
            content: format!("status='{}'", status.as_str()),
        });
        let summary = match status {
            FinishStatus::Success => {
                "✅ **Task completed successfully!** Ready for the next task."
            }
            FinishStatus::Failure => {
                "❌ **Task ended in failure.** The request could not be completed."
            }
        };
        ctx.events.emit(AgentEvent::Summary {
            content: summary.to_string(),
        });
        Ok(ToolResult::success(format!(
            "The interaction has been completed with status: {}",
            status.as_str()
        )))
    }
}
