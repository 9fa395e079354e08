//! 多 Agent 编排
//!
//! OrchestratorFlow 本身不循环也不分支：它为每次执行创建一个新的草稿板，把事件出口注入所有 Agent，
//! 然后把整个运行交给主 Agent。委派逻辑完全由主 Agent 的工具选择决定（专家 Agent 以 AgentTool 形式出现）。

use std::path::Path;
use std::sync::Arc;

use crate::config::AgentSection;
use crate::core::{AgentError, Scratchpad};
use crate::llm::{LlmClient, ToolChoice};
use crate::memory::Memory;
use crate::react::prompts::{
    BROWSER_NEXT_STEP_PROMPT, BROWSER_SYSTEM_PROMPT, CODE_WRITER_SYSTEM_PROMPT,
    MANAGER_NEXT_STEP_PROMPT, MANAGER_SYSTEM_PROMPT, SWE_NEXT_STEP_PROMPT, SWE_SYSTEM_PROMPT,
};
use crate::react::{
    shared, Agent, AgentCore, BrowserContextMode, EventSink, SharedAgent, ToolCallStrategy,
};
use crate::tools::{AgentTool, ToolCollection, ToolDeps, ToolKind};

pub struct OrchestratorFlow {
    agents: Vec<(String, SharedAgent)>,
    primary: String,
}

impl OrchestratorFlow {
    /// 注入事件出口；主 Agent 不在集合中时报错
    pub async fn new(
        agents: Vec<(String, SharedAgent)>,
        primary: &str,
        events: EventSink,
    ) -> Result<Self, AgentError> {
        if !agents.iter().any(|(key, _)| key == primary) {
            return Err(AgentError::Orchestration(format!(
                "Primary agent '{}' not found",
                primary
            )));
        }
        for (key, agent) in &agents {
            agent.lock().await.set_event_sink(events.clone());
            tracing::debug!(agent = %key, "event sink injected");
        }
        Ok(Self {
            agents,
            primary: primary.to_string(),
        })
    }

    pub fn primary_key(&self) -> &str {
        &self.primary
    }

    pub fn agent(&self, key: &str) -> Option<SharedAgent> {
        self.agents
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, a)| a.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.agents.iter().map(|(k, _)| k.clone()).collect()
    }

    /// 执行一次完整请求
    pub async fn execute(&self, input: &str) -> Result<String, AgentError> {
        let primary = self
            .agent(&self.primary)
            .ok_or_else(|| AgentError::Orchestration(format!("Primary agent '{}' not found", self.primary)))?;
        let scratchpad = Scratchpad::with_user_request(input);

        tracing::info!(primary = %self.primary, "orchestrator starting");
        let request = format!(
            "User request: '{}'. Formulate a plan and orchestrate the specialist agents to fulfill it. Use the provided scratchpad for inter-agent communication.",
            input
        );
        let result = primary
            .lock()
            .await
            .run(Some(request), Some(scratchpad.clone()))
            .await?;

        tracing::info!("orchestration complete");
        tracing::info!(scratchpad = %scratchpad, "final scratchpad state");
        Ok(result)
    }
}

/// 逐个添加 Agent 后构造编排流程；未指定主 Agent 时取第一个
#[derive(Default)]
pub struct FlowBuilder {
    agents: Vec<(String, SharedAgent)>,
    primary: Option<String>,
    events: EventSink,
}

impl FlowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn agent(mut self, key: impl Into<String>, agent: SharedAgent) -> Self {
        self.agents.push((key.into(), agent));
        self
    }

    pub fn agents(mut self, agents: impl IntoIterator<Item = (String, SharedAgent)>) -> Self {
        self.agents.extend(agents);
        self
    }

    pub fn primary(mut self, key: impl Into<String>) -> Self {
        self.primary = Some(key.into());
        self
    }

    pub fn events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub async fn build(self) -> Result<OrchestratorFlow, AgentError> {
        let primary = match self.primary {
            Some(p) => p,
            None => self
                .agents
                .first()
                .map(|(k, _)| k.clone())
                .ok_or_else(|| AgentError::Orchestration("No agents configured".to_string()))?,
        };
        OrchestratorFlow::new(self.agents, &primary, self.events).await
    }
}

pub const MANAGER_KEY: &str = "manager";

fn core_for(name: &str, llm: &Arc<dyn LlmClient>, cfg: &AgentSection) -> AgentCore {
    let memory = match cfg.max_messages {
        0 => Memory::new(),
        max => Memory::with_max_messages(max),
    };
    AgentCore::new(name, llm.clone())
        .with_max_steps(cfg.max_steps)
        .with_duplicate_threshold(cfg.duplicate_threshold)
        .with_memory(memory)
}

fn strategy_for(tools: ToolCollection, cfg: &AgentSection) -> ToolCallStrategy {
    ToolCallStrategy::new(tools)
        .with_tool_choice(ToolChoice::parse(&cfg.tool_choice))
        .with_special_tools(["idle"])
        .with_max_observe(cfg.max_observe)
}

/// 网页专家：浏览器工具 + 搜索 + idle，每一步都注入浏览器状态
pub fn browser_agent(llm: &Arc<dyn LlmClient>, deps: &ToolDeps, cfg: &AgentSection) -> SharedAgent {
    let mut kinds = ToolKind::BROWSER.to_vec();
    kinds.extend([ToolKind::InfoSearchWeb, ToolKind::Idle]);
    let core = core_for("browser", llm, cfg)
        .with_description("Handles multi-step web browsing and information extraction.")
        .with_system_prompt(BROWSER_SYSTEM_PROMPT)
        .with_next_step_prompt(BROWSER_NEXT_STEP_PROMPT);
    let strategy = strategy_for(deps.collection(&kinds), cfg)
        .with_browser_context(deps.sessions.browser.clone(), BrowserContextMode::Always);
    shared(Agent::new(core, strategy))
}

/// 软件工程专家：文件 + shell + python + idle
pub fn swe_agent(llm: &Arc<dyn LlmClient>, deps: &ToolDeps, cfg: &AgentSection) -> SharedAgent {
    let mut kinds = vec![ToolKind::PythonExecute];
    kinds.extend_from_slice(ToolKind::FILES);
    kinds.extend_from_slice(ToolKind::SHELL);
    kinds.push(ToolKind::Idle);
    let core = core_for("swe", llm, cfg)
        .with_description("Writes, runs and debugs code across files.")
        .with_system_prompt(SWE_SYSTEM_PROMPT)
        .with_next_step_prompt(SWE_NEXT_STEP_PROMPT);
    shared(Agent::new(core, strategy_for(deps.collection(&kinds), cfg)))
}

/// 只负责把代码写进文件
pub fn code_writer_agent(
    llm: &Arc<dyn LlmClient>,
    deps: &ToolDeps,
    cfg: &AgentSection,
) -> SharedAgent {
    let kinds = [ToolKind::FileWrite, ToolKind::PythonExecute, ToolKind::Idle];
    let core = core_for("code_writer", llm, cfg)
        .with_description("Writes a given piece of code into a given file.")
        .with_system_prompt(CODE_WRITER_SYSTEM_PROMPT);
    shared(Agent::new(core, strategy_for(deps.collection(&kinds), cfg)))
}

/// 主管：除 terminate 外的全部工具 + 各专家的 AgentTool；最近用过浏览器时注入浏览器状态
pub fn manager_agent(
    llm: &Arc<dyn LlmClient>,
    deps: &ToolDeps,
    cfg: &AgentSection,
    specialists: &[(String, SharedAgent, &str)],
) -> SharedAgent {
    let kinds: Vec<ToolKind> = ToolKind::ALL
        .iter()
        .copied()
        .filter(|k| *k != ToolKind::Terminate)
        .collect();
    let mut tools = deps.collection(&kinds);
    for (key, agent, description) in specialists {
        tools.add(AgentTool::new(agent.clone(), key, description));
    }

    let core = core_for(MANAGER_KEY, llm, cfg)
        .with_description("Plans the request and delegates to specialist agents.")
        .with_system_prompt(manager_system_prompt(&deps.workspace_root))
        .with_next_step_prompt(MANAGER_NEXT_STEP_PROMPT);
    let strategy = strategy_for(tools, cfg)
        .with_browser_context(deps.sessions.browser.clone(), BrowserContextMode::WhenActive);
    shared(Agent::new(core, strategy))
}

fn manager_system_prompt(workspace_root: &Path) -> String {
    MANAGER_SYSTEM_PROMPT.replace("{directory}", &workspace_root.display().to_string())
}

/// 默认团队：manager（主）+ browser / swe / code_writer
pub fn build_default_team(
    llm: Arc<dyn LlmClient>,
    deps: &ToolDeps,
    cfg: &AgentSection,
) -> Vec<(String, SharedAgent)> {
    let specialists: Vec<(String, SharedAgent, &str)> = vec![
        (
            "browser".to_string(),
            browser_agent(&llm, deps, cfg),
            "Use it for multi-step web browsing tasks.",
        ),
        (
            "swe".to_string(),
            swe_agent(&llm, deps, cfg),
            "Use it for writing, testing and debugging code.",
        ),
        (
            "code_writer".to_string(),
            code_writer_agent(&llm, deps, cfg),
            "Use it to write given code into a given file.",
        ),
    ];
    let manager = manager_agent(&llm, deps, cfg, &specialists);

    let mut team = vec![(MANAGER_KEY.to_string(), manager)];
    team.extend(specialists.into_iter().map(|(k, a, _)| (k, a)));
    team
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchSection;
    use crate::core::AgentState;
    use crate::llm::MockLlmClient;
    use crate::react::AgentEvent;
    use crate::session::browser::fake;
    use crate::session::{Sessions, ShellSessionManager};

    fn deps() -> ToolDeps {
        let (browser, _log) = fake::manager();
        ToolDeps::new(
            Sessions::new(Arc::new(ShellSessionManager::default()), browser),
            std::env::temp_dir(),
            SearchSection::default(),
        )
    }

    #[tokio::test]
    async fn test_missing_primary_is_error() {
        let err = FlowBuilder::new().build().await.err().unwrap();
        assert_eq!(err.to_string(), "Orchestration error: No agents configured");

        let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::new());
        let agent = code_writer_agent(&llm, &deps(), &AgentSection::default());
        let err = FlowBuilder::new()
            .agent("writer", agent)
            .primary("boss")
            .build()
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("Primary agent 'boss' not found"));
    }

    #[tokio::test]
    async fn test_default_team_delegates_and_reports_events() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_thought("delegate the code")
            .push_tool_calls(&[("swe_agent", r#"{"request": "print hello"}"#)]);
        let llm: Arc<dyn LlmClient> = mock.clone();
        let team = build_default_team(llm, &deps(), &AgentSection::default());
        assert_eq!(
            team.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            vec!["manager", "browser", "swe", "code_writer"]
        );

        let (events, mut rx) = EventSink::channel();
        let flow = FlowBuilder::new().agents(team).events(events).build().await.unwrap();
        assert_eq!(flow.primary_key(), "manager");

        let out = flow.execute("say hello").await.unwrap();
        let first = out.lines().next().unwrap();
        assert_eq!(
            first,
            "Step 1: Observed output of cmd `swe_agent` executed:"
        );
        assert!(out.contains("Step 2: Observed output of cmd `idle` executed:"));

        // manager 第一次 ask_tool 看到的工具里包含专家工具，不包含 terminate
        let requests = mock.tool_requests();
        let first_request = &requests[0];
        assert!(first_request.tool_names.iter().any(|n| n == "swe_agent"));
        assert!(first_request.tool_names.iter().all(|n| n != "terminate"));

        let mut step_agents = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if let AgentEvent::StepUpdate { agent, .. } = ev {
                step_agents.push(agent);
            }
        }
        assert_eq!(step_agents, vec!["manager", "swe", "manager"]);

        let swe = flow.agent("swe").unwrap();
        assert_eq!(swe.lock().await.state(), AgentState::Idle);
    }
}
