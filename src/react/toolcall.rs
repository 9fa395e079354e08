//! 工具调用策略：think 先做纯文本推理，再带工具 schema 让模型选工具；act 按顺序分发
//!
//! 推理与工具调用挂在同一条 assistant 消息上。分发失败（调用格式、未知工具、参数 JSON、
//! 工具自身报错）都以 "Error: ..." 文本写回 tool 消息，由模型在下一轮处理。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::llm::{LlmError, ToolChoice};
use crate::memory::{Message, ToolCall};
use crate::react::loop_::{AgentCore, Decision, StepOutcome, Strategy};
use crate::react::prompts::{BROWSER_STATE_PLACEHOLDER, NO_BROWSER_PAGE};
use crate::react::AgentEvent;
use crate::session::BrowserSessionManager;
use crate::tools::{ToolCollection, ToolContext, ToolResult};

const SKIPPED_AWAITING: &str = "Skipped: awaiting user input";

/// 何时把浏览器状态注入下一步提示
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserContextMode {
    Off,
    /// 最近三条消息里调用过 browser_* 工具时
    WhenActive,
    /// 每一步
    Always,
}

/// 特殊工具被成功调用后是否结束本次 run
pub type FinishPredicate = fn(&str, &ToolResult) -> bool;

fn always_finish(_name: &str, _result: &ToolResult) -> bool {
    true
}

/// 单次分发的观察结果
struct Dispatch {
    observation: String,
    image: Option<String>,
    result: Option<ToolResult>,
}

impl Dispatch {
    fn failed(observation: String) -> Self {
        Self {
            observation,
            image: None,
            result: None,
        }
    }
}

pub struct ToolCallStrategy {
    tools: ToolCollection,
    tool_choice: ToolChoice,
    special_tools: Vec<String>,
    should_finish: FinishPredicate,
    max_observe: usize,
    browser: Option<Arc<BrowserSessionManager>>,
    browser_mode: BrowserContextMode,
    pending: Vec<ToolCall>,
}

impl ToolCallStrategy {
    pub fn new(tools: ToolCollection) -> Self {
        Self {
            tools,
            tool_choice: ToolChoice::Auto,
            special_tools: vec!["terminate".to_string()],
            should_finish: always_finish,
            max_observe: 0,
            browser: None,
            browser_mode: BrowserContextMode::Off,
            pending: Vec::new(),
        }
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = choice;
        self
    }

    pub fn with_special_tools<I, T>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.special_tools = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_finish_predicate(mut self, predicate: FinishPredicate) -> Self {
        self.should_finish = predicate;
        self
    }

    /// 单条观察写入记忆前的最大字符数；0 表示不截断
    pub fn with_max_observe(mut self, max_observe: usize) -> Self {
        self.max_observe = max_observe;
        self
    }

    pub fn with_browser_context(
        mut self,
        browser: Arc<BrowserSessionManager>,
        mode: BrowserContextMode,
    ) -> Self {
        self.browser = Some(browser);
        self.browser_mode = mode;
        self
    }

    pub fn tools(&self) -> &ToolCollection {
        &self.tools
    }

    /// 动态增删工具（外部工具源接入 / 断开）
    pub fn tools_mut(&mut self) -> &mut ToolCollection {
        &mut self.tools
    }

    pub fn tool_choice(&self) -> ToolChoice {
        self.tool_choice
    }

    fn is_special(&self, name: &str) -> bool {
        self.special_tools
            .iter()
            .any(|s| s.eq_ignore_ascii_case(name))
    }

    /// 本步的提示；按模式注入浏览器状态（不会因此启动浏览器）
    async fn next_step_guidance(&self, core: &AgentCore) -> Option<String> {
        let base = core.next_step_prompt.clone();
        let Some(browser) = &self.browser else {
            return base;
        };
        let inject = match self.browser_mode {
            BrowserContextMode::Off => false,
            BrowserContextMode::Always => true,
            BrowserContextMode::WhenActive => core
                .memory
                .recent(3)
                .iter()
                .flat_map(|m| m.tool_calls.iter())
                .any(|tc| tc.function.name.starts_with("browser_")),
        };
        if !inject {
            return base;
        }

        let state = browser
            .current_state_if_active()
            .await
            .unwrap_or_else(|| NO_BROWSER_PAGE.to_string());
        Some(match base {
            Some(prompt) if prompt.contains(BROWSER_STATE_PLACEHOLDER) => {
                prompt.replace(BROWSER_STATE_PLACEHOLDER, &state)
            }
            Some(prompt) => format!("{}\n\n{}", prompt, state),
            None => state,
        })
    }

    /// token 超限：记一条说明并优雅结束；其它错误向上传播
    fn decision_failed(&self, core: &mut AgentCore, err: LlmError) -> Result<Decision, AgentError> {
        if !err.is_token_limit() {
            return Err(err.into());
        }
        tracing::error!(agent = %core.name, error = %err, "token limit reached");
        let note = format!(
            "Maximum token limit reached, cannot continue execution: {}",
            err
        );
        core.update_memory(Message::assistant(note.clone()))?;
        Ok(Decision::Finish(note))
    }

    async fn execute_tool(&self, call: &ToolCall, ctx: &ToolContext) -> Dispatch {
        let name = call.function.name.as_str();
        if name.is_empty() {
            return Dispatch::failed("Error: Invalid command format".to_string());
        }
        if !self.tools.contains(name) {
            return Dispatch::failed(format!("Error: Unknown tool '{}'", name));
        }

        let raw = call.function.arguments.trim();
        let raw = if raw.is_empty() { "{}" } else { raw };
        let args: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(_) => {
                tracing::error!(tool = %name, arguments = %call.function.arguments, "invalid JSON arguments");
                return Dispatch::failed(format!(
                    "Error: Error parsing arguments for {}: Invalid JSON format",
                    name
                ));
            }
        };

        tracing::info!(tool = %name, "activating tool");
        let result = self.tools.execute(name, args, ctx).await;

        let observation = match result.error.as_deref() {
            Some(err) if !err.is_empty() => {
                tracing::error!(tool = %name, error = %err, "tool reported a problem");
                format!("Error: ⚠️ Tool '{}' encountered a problem: {}", name, err)
            }
            _ if result.is_empty() => format!("Cmd `{}` completed with no output", name),
            _ => format!("Observed output of cmd `{}` executed:\n{}", name, result),
        };
        Dispatch {
            observation,
            image: result.base64_image.clone().filter(|s| !s.is_empty()),
            result: Some(result),
        }
    }

    fn truncate(&self, text: String) -> String {
        if self.max_observe == 0 || text.chars().count() <= self.max_observe {
            return text;
        }
        text.chars().take(self.max_observe).collect()
    }
}

#[async_trait]
impl Strategy for ToolCallStrategy {
    async fn think(&mut self, core: &mut AgentCore) -> Result<Decision, AgentError> {
        if let Some(guidance) = self.next_step_guidance(core).await {
            core.update_memory(Message::user(guidance))?;
        }
        let system = core.system_messages();

        let asked = core.llm.ask(core.memory.messages(), &system).await;
        let reasoning = match asked {
            Ok(text) => text,
            Err(e) => return self.decision_failed(core, e),
        };
        tracing::info!(agent = %core.name, thoughts = %reasoning, "reasoning complete");
        core.events.emit(AgentEvent::Thought {
            agent: core.name.clone(),
            content: reasoning.clone(),
        });
        core.update_memory(Message::assistant(reasoning))?;

        let decided = core
            .llm
            .ask_tool(
                core.memory.messages(),
                &system,
                &self.tools.to_params(),
                self.tool_choice,
            )
            .await;
        let response = match decided {
            Ok(r) => r,
            Err(e) => return self.decision_failed(core, e),
        };

        let names: Vec<&str> = response
            .tool_calls
            .iter()
            .map(|c| c.function.name.as_str())
            .collect();
        tracing::info!(agent = %core.name, count = names.len(), tools = ?names, "tools selected");

        self.pending = response.tool_calls;
        if !self.pending.is_empty() {
            core.memory.attach_tool_calls(self.pending.clone());
            return Ok(Decision::Act);
        }
        // REQUIRED 且没有调用：这里放行，由 act 报错
        if self.tool_choice == ToolChoice::Required {
            return Ok(Decision::Act);
        }
        Ok(Decision::Skip)
    }

    async fn act(&mut self, core: &mut AgentCore) -> Result<StepOutcome, AgentError> {
        let calls = std::mem::take(&mut self.pending);
        if calls.is_empty() {
            if self.tool_choice == ToolChoice::Required {
                return Err(AgentError::ToolCallsRequired);
            }
            let text = core
                .memory
                .last()
                .map(|m| m.content.clone())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "No content or commands to execute".to_string());
            return Ok(StepOutcome::Continue(text));
        }

        let ctx = core.tool_context();
        let mut results = Vec::with_capacity(calls.len());
        let mut finished_by: Option<String> = None;
        let mut awaiting: Option<String> = None;

        for call in &calls {
            let name = call.function.name.clone();
            if awaiting.is_some() {
                core.update_memory(Message::tool(SKIPPED_AWAITING, call.id.clone(), name, None))?;
                continue;
            }

            core.events.emit(AgentEvent::Action {
                title: format!("🔧 {}", name),
                content: call.function.arguments.clone(),
            });
            let dispatch = self.execute_tool(call, &ctx).await;
            let observation = self.truncate(dispatch.observation);
            tracing::info!(agent = %core.name, tool = %name, "tool call completed");

            core.update_memory(Message::tool(
                observation.clone(),
                call.id.clone(),
                name.clone(),
                dispatch.image,
            ))?;
            results.push(observation);

            if let Some(result) = dispatch.result {
                if result.is_awaiting_input() {
                    awaiting = Some(result.output_text());
                } else if self.is_special(&name) && (self.should_finish)(&name, &result) {
                    tracing::info!(tool = %name, "special tool has completed the task");
                    finished_by = Some(name);
                }
            }
        }

        if let Some(prompt) = awaiting {
            return Ok(StepOutcome::AwaitingInput { prompt });
        }
        let output = results.join("\n\n");
        Ok(match finished_by {
            Some(name) => StepOutcome::Finished {
                output,
                reason: format!("special tool '{}' called", name),
            },
            None => StepOutcome::Continue(output),
        })
    }

    async fn cleanup(&mut self) {
        tracing::info!(tools = self.tools.len(), "cleaning up tool resources");
        self.tools.cleanup_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AgentState;
    use crate::llm::MockLlmClient;
    use crate::memory::{Memory, Role};
    use crate::react::loop_::Agent;
    use crate::session::browser::fake;
    use crate::tools::{AskUserTool, FinishTool, NotifyUserTool};

    fn tools() -> ToolCollection {
        let mut tools = ToolCollection::new();
        tools.add(NotifyUserTool);
        tools.add(AskUserTool);
        tools.add(FinishTool::terminate());
        tools
    }

    fn agent(mock: Arc<MockLlmClient>, strategy: ToolCallStrategy) -> Agent<ToolCallStrategy> {
        let core = AgentCore::new("tester", mock)
            .with_system_prompt("sys")
            .with_next_step_prompt("next?")
            .with_max_steps(5);
        Agent::new(core, strategy)
    }

    #[tokio::test]
    async fn test_dispatch_failures_become_error_text() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_thought("try things").push_tool_calls(&[
            ("nope", "{}"),
            ("message_notify_user", "{not json"),
            ("message_notify_user", "{}"),
            ("message_notify_user", r#"{"text":"hi"}"#),
        ]);
        let mut a = agent(mock, ToolCallStrategy::new(tools()));
        a.core.update_memory(Message::user("go")).unwrap();

        let outcome = a.strategy.step(&mut a.core).await.unwrap();
        let StepOutcome::Continue(text) = outcome else {
            panic!("expected continue");
        };
        let parts: Vec<&str> = text.split("\n\n").collect();
        assert_eq!(parts[0], "Error: Unknown tool 'nope'");
        assert_eq!(
            parts[1],
            "Error: Error parsing arguments for message_notify_user: Invalid JSON format"
        );
        assert!(parts[2].starts_with(
            "Error: ⚠️ Tool 'message_notify_user' encountered a problem: Invalid arguments"
        ));
        assert_eq!(
            parts[3],
            "Observed output of cmd `message_notify_user` executed:\nNotification sent to user."
        );

        let msgs = a.core.memory.messages();
        // go, next?, 推理(带 4 个调用), 4 条 tool 消息
        assert_eq!(msgs.len(), 7);
        assert_eq!(msgs[2].content, "try things");
        assert_eq!(msgs[2].tool_calls.len(), 4);
        assert!(msgs[3..].iter().all(|m| m.role == Role::Tool));
        assert_eq!(msgs[6].tool_call_id.as_deref(), Some("call_3"));
    }

    #[tokio::test]
    async fn test_special_tool_finishes_run() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_thought("done").push_tool_calls(&[
            ("terminate", r#"{"status":"success"}"#),
            ("message_notify_user", r#"{"text":"bye"}"#),
        ]);
        let mut a = agent(mock, ToolCallStrategy::new(tools()));
        let out = a.run(Some("finish up".into()), None).await.unwrap();
        assert!(out.starts_with("Step 1: Observed output of cmd `terminate` executed:"));
        assert!(out.contains("Notification sent to user."));
        assert!(!out.contains("Terminated: Reached max steps"));
        assert_eq!(a.core.state(), AgentState::Idle);
    }

    #[tokio::test]
    async fn test_failing_special_tool_still_finishes_run() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_thought("stop").push_tool_calls(&[("terminate", r#"{"status":"maybe"}"#)]);
        let mut a = agent(mock, ToolCallStrategy::new(tools()));
        let out = a.run(Some("finish up".into()), None).await.unwrap();
        assert!(out.starts_with("Step 1: Error: ⚠️ Tool 'terminate' encountered a problem:"));
        assert!(!out.contains("Terminated: Reached max steps"));
        assert_eq!(out.lines().filter(|l| l.starts_with("Step ")).count(), 1);
        assert_eq!(a.core.state(), AgentState::Idle);
    }

    #[tokio::test]
    async fn test_finish_predicate_can_reject_failed_special_tool() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_thought("stop").push_tool_calls(&[("terminate", r#"{"status":"maybe"}"#)]);
        let strategy = ToolCallStrategy::new(tools())
            .with_finish_predicate(|_: &str, result: &ToolResult| !result.is_error());
        let mut a = agent(mock, strategy);
        a.core.update_memory(Message::user("go")).unwrap();
        let outcome = a.strategy.step(&mut a.core).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Continue(_)));
    }

    #[tokio::test]
    async fn test_bounded_memory_keeps_turns_intact() {
        let mock = Arc::new(MockLlmClient::new());
        let notify = ("message_notify_user", r#"{"text":"hi"}"#);
        mock.push_thought("one")
            .push_tool_calls(&[notify, notify])
            .push_thought("two")
            .push_tool_calls(&[notify, notify]);
        let mut a = agent(mock, ToolCallStrategy::new(tools()));
        a.core.memory = Memory::with_max_messages(3);

        let out = a.run(Some("chat".into()), None).await.unwrap();
        assert!(out.contains("Step 3: Observed output of cmd `terminate` executed:"));
        assert_eq!(a.core.state(), AgentState::Idle);
        assert!(a.core.memory.len() <= 3 + 4);
    }

    #[tokio::test]
    async fn test_required_without_calls_fails_in_act() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_thought("hmm").push_text_decision("just text");
        let strategy = ToolCallStrategy::new(tools()).with_tool_choice(ToolChoice::Required);
        let mut a = agent(mock, strategy);

        assert_eq!(a.strategy.think(&mut a.core).await.unwrap(), Decision::Act);
        let err = a.strategy.act(&mut a.core).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolCallsRequired));
    }

    #[tokio::test]
    async fn test_auto_without_calls_returns_last_message() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_thought("nothing to do").push_text_decision("");
        let mut a = agent(mock, ToolCallStrategy::new(tools()));

        assert_eq!(a.strategy.think(&mut a.core).await.unwrap(), Decision::Skip);
        let outcome = a.strategy.act(&mut a.core).await.unwrap();
        assert_eq!(outcome, StepOutcome::Continue("nothing to do".into()));
    }

    #[tokio::test]
    async fn test_token_limit_ends_gracefully() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_thought("thinking")
            .push_decision_error(LlmError::TokenLimitExceeded("8192".into()));
        let mut a = agent(mock, ToolCallStrategy::new(tools()));
        let out = a.run(Some("big".into()), None).await.unwrap();
        assert_eq!(out, "Step 1: Thinking complete - no action needed");
        assert_eq!(a.core.state(), AgentState::Idle);
        let last = a.core.memory.last().unwrap();
        assert!(last
            .content
            .starts_with("Maximum token limit reached, cannot continue execution:"));
    }

    #[tokio::test]
    async fn test_other_llm_errors_propagate() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_thought_error(LlmError::Request("connection reset".into()));
        let mut a = agent(mock, ToolCallStrategy::new(tools()));
        let err = a.run(Some("x".into()), None).await.unwrap_err();
        assert!(matches!(err, AgentError::Llm(LlmError::Request(_))));
        assert_eq!(a.core.state(), AgentState::Error);
    }

    #[tokio::test]
    async fn test_ask_user_suspends_and_skips_rest() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_thought("need input").push_tool_calls(&[
            ("message_ask_user", r#"{"text":"Which file?"}"#),
            ("message_notify_user", r#"{"text":"never"}"#),
        ]);
        let mut a = agent(mock, ToolCallStrategy::new(tools()));
        let out = a.run(Some("edit it".into()), None).await.unwrap();
        assert_eq!(out, "Question for the user: Which file?");
        assert_eq!(a.core.state(), AgentState::AwaitingUserInput);
        assert_eq!(a.core.memory.last().unwrap().content, SKIPPED_AWAITING);
    }

    #[tokio::test]
    async fn test_observation_is_truncated() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_thought("t")
            .push_tool_calls(&[("message_notify_user", r#"{"text":"hi"}"#)]);
        let strategy = ToolCallStrategy::new(tools()).with_max_observe(12);
        let mut a = agent(mock, strategy);
        a.strategy.think(&mut a.core).await.unwrap();
        let outcome = a.strategy.act(&mut a.core).await.unwrap();
        assert_eq!(outcome.text(), "Observed out");
        assert_eq!(a.core.memory.last().unwrap().content, "Observed out");
    }

    #[tokio::test]
    async fn test_browser_state_injected_only_when_recently_used() {
        let (browser, _log) = fake::manager();
        let strategy = ToolCallStrategy::new(tools())
            .with_browser_context(browser.clone(), BrowserContextMode::WhenActive);
        let mock = Arc::new(MockLlmClient::new());
        let mut a = agent(mock, strategy);

        let guidance = a.strategy.next_step_guidance(&a.core).await;
        assert_eq!(guidance.as_deref(), Some("next?"));

        browser.navigate("https://example.com").await.unwrap();
        a.core
            .update_memory(
                Message::assistant("").with_tool_calls(vec![ToolCall::new(
                    "c1",
                    "browser_navigate",
                    "{}",
                )]),
            )
            .unwrap();
        let guidance = a.strategy.next_step_guidance(&a.core).await.unwrap();
        assert!(guidance.starts_with("next?\n\nCurrent browser state:"));
        assert!(guidance.contains("- URL: https://example.com"));
    }

    #[tokio::test]
    async fn test_always_mode_fills_placeholder_without_launching() {
        let (browser, log) = fake::manager();
        let strategy = ToolCallStrategy::new(tools())
            .with_browser_context(browser, BrowserContextMode::Always);
        let mut a = agent(Arc::new(MockLlmClient::new()), strategy);
        a.core.next_step_prompt = Some("State:\n{browser_state}\nGo.".into());

        let guidance = a.strategy.next_step_guidance(&a.core).await.unwrap();
        assert_eq!(guidance, format!("State:\n{}\nGo.", NO_BROWSER_PAGE));
        assert_eq!(log.launches.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
