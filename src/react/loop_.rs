//! Agent 状态机
//!
//! `Agent<S>` 持有对话记忆、生命周期状态与步数，"下一步做什么"交给策略 `S`。
//! 一次 run：校验状态 -> 追加请求 -> RUNNING -> 循环 step 直到结束 / 挂起 / 步数上限。
//! 单步出错时状态强制为 ERROR 并向上传播；正常结束回到 IDLE 以便复用，挂起时保留 AWAITING_USER_INPUT。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{AgentError, AgentState, MemoryError, Scratchpad};
use crate::llm::LlmClient;
use crate::memory::{Memory, Message, Role};
use crate::react::prompts::STUCK_PROMPT;
use crate::react::{AgentEvent, EventSink};
use crate::tools::ToolContext;

/// think 的结论
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// 进入 act
    Act,
    /// 本步无需行动
    Skip,
    /// 决策层要求结束本次 run（如 token 超限），附带原因
    Finish(String),
}

/// 单步结果，由状态机的循环条件消费
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Continue(String),
    Finished { output: String, reason: String },
    AwaitingInput { prompt: String },
}

impl StepOutcome {
    pub fn text(&self) -> &str {
        match self {
            StepOutcome::Continue(s) => s,
            StepOutcome::Finished { output, .. } => output,
            StepOutcome::AwaitingInput { prompt } => prompt,
        }
    }
}

/// Agent 共享的状态与依赖；策略通过 `&mut AgentCore` 读写
pub struct AgentCore {
    pub name: String,
    pub description: String,
    pub system_prompt: Option<String>,
    pub next_step_prompt: Option<String>,
    pub llm: Arc<dyn LlmClient>,
    pub memory: Memory,
    state: AgentState,
    pub max_steps: usize,
    current_step: usize,
    pub duplicate_threshold: usize,
    pub scratchpad: Option<Scratchpad>,
    pub events: EventSink,
}

impl AgentCore {
    pub fn new(name: impl Into<String>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            system_prompt: None,
            next_step_prompt: None,
            llm,
            memory: Memory::new(),
            state: AgentState::Idle,
            max_steps: 20,
            current_step: 0,
            duplicate_threshold: 2,
            scratchpad: None,
            events: EventSink::noop(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_next_step_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.next_step_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_duplicate_threshold(mut self, threshold: usize) -> Self {
        self.duplicate_threshold = threshold;
        self
    }

    pub fn with_memory(mut self, memory: Memory) -> Self {
        self.memory = memory;
        self
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn update_memory(&mut self, msg: Message) -> Result<(), MemoryError> {
        self.memory.add_message(msg)
    }

    /// 系统提示（若有）包装成 system 消息
    pub fn system_messages(&self) -> Vec<Message> {
        self.system_prompt
            .iter()
            .map(|p| Message::system(p.clone()))
            .collect()
    }

    /// 本 Agent 发起工具调用时携带的上下文
    pub fn tool_context(&self) -> ToolContext {
        ToolContext::new(self.name.clone(), self.events.clone(), self.scratchpad.clone())
    }

    /// 最新一条消息的内容在更早的 assistant 消息中出现至少 duplicate_threshold 次
    pub fn is_stuck(&self) -> bool {
        let messages = self.memory.messages();
        let Some((last, earlier)) = messages.split_last() else {
            return false;
        };
        if earlier.is_empty() || last.content.is_empty() {
            return false;
        }
        let duplicates = earlier
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant && m.content == last.content)
            .count();
        duplicates >= self.duplicate_threshold
    }

    /// 在下一步提示前加上换策略的提醒；已带提醒时不重复叠加
    pub fn handle_stuck_state(&mut self) {
        let next = self.next_step_prompt.as_deref().unwrap_or("");
        if next.starts_with(STUCK_PROMPT) {
            tracing::warn!(agent = %self.name, "agent is still stuck");
            return;
        }
        self.next_step_prompt = Some(format!("{}\n{}", STUCK_PROMPT, next));
        tracing::warn!(agent = %self.name, "agent detected stuck state, added strategy-change prompt");
    }
}

/// 决策 / 执行策略
#[async_trait]
pub trait Strategy: Send {
    async fn think(&mut self, core: &mut AgentCore) -> Result<Decision, AgentError>;

    async fn act(&mut self, core: &mut AgentCore) -> Result<StepOutcome, AgentError>;

    async fn step(&mut self, core: &mut AgentCore) -> Result<StepOutcome, AgentError> {
        match self.think(core).await? {
            Decision::Act => self.act(core).await,
            Decision::Skip => Ok(StepOutcome::Continue(
                "Thinking complete - no action needed".to_string(),
            )),
            Decision::Finish(reason) => Ok(StepOutcome::Finished {
                output: "Thinking complete - no action needed".to_string(),
                reason,
            }),
        }
    }

    /// 一次 run 正常结束后释放外部资源
    async fn cleanup(&mut self) {}
}

pub struct Agent<S> {
    pub core: AgentCore,
    pub strategy: S,
}

impl<S: Strategy> Agent<S> {
    pub fn new(core: AgentCore, strategy: S) -> Self {
        Self { core, strategy }
    }

    /// 执行一次 run；仅允许从 IDLE / AWAITING_USER_INPUT 开始
    pub async fn run(
        &mut self,
        request: Option<String>,
        scratchpad: Option<Scratchpad>,
    ) -> Result<String, AgentError> {
        if !self.core.state.can_start_run() {
            return Err(AgentError::InvalidStateTransition(self.core.state));
        }

        self.core.scratchpad = scratchpad;
        if let Some(request) = request.filter(|r| !r.is_empty()) {
            self.core.update_memory(Message::user(request))?;
        }

        let mut results = Vec::new();
        self.core.state = AgentState::Running;

        while self.core.current_step < self.core.max_steps
            && self.core.state == AgentState::Running
        {
            self.core.memory.prune();
            self.core.current_step += 1;
            let step = self.core.current_step;
            tracing::info!(agent = %self.core.name, step, max_steps = self.core.max_steps, "executing step");
            self.core.events.emit(AgentEvent::StepUpdate {
                agent: self.core.name.clone(),
                step,
                max_steps: self.core.max_steps,
            });
            self.core.events.emit(AgentEvent::Thought {
                agent: self.core.name.clone(),
                content: format!("Starting step {}: deciding the next action...", step),
            });

            let outcome = match self.strategy.step(&mut self.core).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.core.state = AgentState::Error;
                    tracing::error!(agent = %self.core.name, step, error = %e, "step failed");
                    return Err(e);
                }
            };

            match outcome {
                StepOutcome::AwaitingInput { prompt } => {
                    self.core.state = AgentState::AwaitingUserInput;
                    tracing::info!(agent = %self.core.name, "agent is now awaiting user input");
                    results.push(prompt);
                    break;
                }
                StepOutcome::Finished { output, reason } => {
                    tracing::info!(agent = %self.core.name, %reason, "agent finished");
                    self.core.state = AgentState::Finished;
                    results.push(format!("Step {}: {}", step, output));
                }
                StepOutcome::Continue(output) => {
                    if self.core.is_stuck() {
                        self.core.handle_stuck_state();
                    }
                    results.push(format!("Step {}: {}", step, output));
                }
            }
        }

        match self.core.state {
            AgentState::AwaitingUserInput => {}
            AgentState::Running => {
                results.push(format!(
                    "Terminated: Reached max steps ({})",
                    self.core.max_steps
                ));
                self.reset_for_reuse();
                self.strategy.cleanup().await;
            }
            _ => {
                self.reset_for_reuse();
                self.strategy.cleanup().await;
            }
        }

        if results.is_empty() {
            Ok("No steps executed".to_string())
        } else {
            Ok(results.join("\n"))
        }
    }

    fn reset_for_reuse(&mut self) {
        self.core.current_step = 0;
        self.core.state = AgentState::Idle;
    }

    /// 清空记忆与状态（ERROR 之后由外部调用）
    pub fn reset(&mut self) {
        self.core.memory.clear();
        self.reset_for_reuse();
    }
}

/// 供编排层与 AgentTool 使用的对象安全接口
#[async_trait]
pub trait RunnableAgent: Send {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn state(&self) -> AgentState;
    fn set_event_sink(&mut self, events: EventSink);
    fn reset(&mut self);
    async fn run(
        &mut self,
        request: Option<String>,
        scratchpad: Option<Scratchpad>,
    ) -> Result<String, AgentError>;
}

#[async_trait]
impl<S: Strategy> RunnableAgent for Agent<S> {
    fn name(&self) -> &str {
        &self.core.name
    }

    fn description(&self) -> &str {
        &self.core.description
    }

    fn state(&self) -> AgentState {
        self.core.state
    }

    fn set_event_sink(&mut self, events: EventSink) {
        self.core.events = events;
    }

    fn reset(&mut self) {
        Agent::reset(self);
    }

    async fn run(
        &mut self,
        request: Option<String>,
        scratchpad: Option<Scratchpad>,
    ) -> Result<String, AgentError> {
        Agent::run(self, request, scratchpad).await
    }
}

pub type SharedAgent = Arc<tokio::sync::Mutex<dyn RunnableAgent>>;

/// 包装为可共享的 Agent 句柄
pub fn shared<S: Strategy + 'static>(agent: Agent<S>) -> SharedAgent {
    Arc::new(tokio::sync::Mutex::new(agent))
}
