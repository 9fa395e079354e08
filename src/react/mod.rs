//! 推理 / 行动层：Agent 状态机、工具调用策略、过程事件与提示词

pub mod events;
pub mod loop_;
pub mod prompts;
pub mod toolcall;

pub use events::{language_for_path, AgentEvent, EventSink, PlanStepView};
pub use loop_::{
    shared, Agent, AgentCore, Decision, RunnableAgent, SharedAgent, StepOutcome, Strategy,
};
pub use toolcall::{BrowserContextMode, FinishPredicate, ToolCallStrategy};
