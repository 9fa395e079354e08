//! 核心层：错误类型、Agent 状态、共享草稿板与多 Agent 编排

pub mod error;
pub mod orchestrator;
pub mod scratchpad;
pub mod state;

pub use error::{AgentError, MemoryError};
pub use orchestrator::{build_default_team, FlowBuilder, OrchestratorFlow, MANAGER_KEY};
pub use scratchpad::Scratchpad;
pub use state::AgentState;
