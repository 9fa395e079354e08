//! 把专家 Agent 包装成工具：主管 Agent 通过普通工具调用把子任务委派出去

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::react::{AgentEvent, SharedAgent};
use crate::tools::schema::{args_schema, parse_args};
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

#[derive(Deserialize, JsonSchema)]
struct DelegateArgs {
    /// A clear, self-contained instruction for the specialist agent.
    request: String,
}

/// 工具名为 `{agent}_agent`；运行时与调用方共享同一个草稿板，结果另存为 `{agent}_result`
pub struct AgentTool {
    agent: SharedAgent,
    agent_name: String,
    name: String,
    description: String,
}

impl AgentTool {
    pub fn new(agent: SharedAgent, agent_name: &str, description: &str) -> Self {
        let key = agent_name.to_lowercase();
        Self {
            agent,
            agent_name: agent_name.to_string(),
            name: format!("{}_agent", key),
            description: format!(
                "Delegates a task to the {} specialist agent. {}",
                agent_name, description
            ),
        }
    }

    /// 从已构造的 Agent 读取名称与描述
    pub async fn from_agent(agent: SharedAgent) -> Self {
        let (name, description) = {
            let guard = agent.lock().await;
            (guard.name().to_string(), guard.description().to_string())
        };
        Self::new(agent, &name, &description)
    }

    fn result_key(&self) -> String {
        format!("{}_result", self.agent_name.to_lowercase())
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<DelegateArgs>()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let DelegateArgs { request } = parse_args(args)?;
        // 同一个 Agent 正在运行（例如委派给自己）时直接拒绝
        let Ok(mut agent) = self.agent.try_lock() else {
            return Err(ToolError::Execution(format!(
                "Agent '{}' is already running.",
                self.agent_name
            )));
        };

        ctx.events.emit(AgentEvent::Action {
            title: format!("🤝 Delegating to {}", self.agent_name),
            content: request.clone(),
        });
        tracing::info!(from = %ctx.agent, to = %self.agent_name, "delegating task");

        let output = agent
            .run(Some(request), ctx.scratchpad.clone())
            .await
            .map_err(|e| {
                ToolError::Execution(format!("Agent '{}' failed: {}", self.agent_name, e))
            })?;

        if let Some(pad) = &ctx.scratchpad {
            pad.set(self.result_key(), output.clone());
        }
        Ok(ToolResult::success(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AgentState, Scratchpad};
    use crate::llm::MockLlmClient;
    use crate::react::{shared, Agent, AgentCore, ToolCallStrategy};
    use crate::tools::{FinishTool, ToolCollection};
    use serde_json::json;
    use std::sync::Arc;

    fn specialist() -> SharedAgent {
        let mut tools = ToolCollection::new();
        tools.add(FinishTool::idle());
        let core = AgentCore::new("SWE", Arc::new(MockLlmClient::new()))
            .with_description("Writes code.")
            .with_max_steps(3);
        shared(Agent::new(
            core,
            ToolCallStrategy::new(tools).with_special_tools(["idle"]),
        ))
    }

    #[tokio::test]
    async fn test_delegation_shares_scratchpad() {
        let agent = specialist();
        let tool = AgentTool::from_agent(agent.clone()).await;
        assert_eq!(tool.name(), "swe_agent");
        assert!(tool.description().ends_with("Writes code."));

        let pad = Scratchpad::with_user_request("build it");
        let ctx = ToolContext::new("manager", Default::default(), Some(pad.clone()));
        let out = tool
            .execute(&ctx, json!({"request": "write main.rs"}))
            .await
            .unwrap();
        assert!(out
            .output_text()
            .starts_with("Step 1: Observed output of cmd `idle` executed:"));
        assert_eq!(pad.get("swe_result"), Some(json!(out.output_text())));
        assert_eq!(agent.lock().await.state(), AgentState::Idle);
    }

    #[tokio::test]
    async fn test_busy_agent_is_rejected() {
        let agent = specialist();
        let tool = AgentTool::from_agent(agent.clone()).await;
        let _held = agent.lock().await;
        let err = tool
            .execute(&ToolContext::default(), json!({"request": "x"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Agent 'SWE' is already running.");
    }
}
