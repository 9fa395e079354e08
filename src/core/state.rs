//! Agent 生命周期状态

use std::fmt;

use serde::{Deserialize, Serialize};

/// Agent 状态：构造时为 Idle，仅由状态机的受控切换修改
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    #[default]
    Idle,
    Running,
    /// 挂起点：下一次 run 从这里继续
    AwaitingUserInput,
    Finished,
    Error,
}

impl AgentState {
    /// 是否允许从当前状态发起一次 run
    pub fn can_start_run(self) -> bool {
        matches!(self, AgentState::Idle | AgentState::AwaitingUserInput)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentState::Idle => "IDLE",
            AgentState::Running => "RUNNING",
            AgentState::AwaitingUserInput => "AWAITING_USER_INPUT",
            AgentState::Finished => "FINISHED",
            AgentState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_idle_and_awaiting_can_start() {
        assert!(AgentState::Idle.can_start_run());
        assert!(AgentState::AwaitingUserInput.can_start_run());
        assert!(!AgentState::Running.can_start_run());
        assert!(!AgentState::Finished.can_start_run());
        assert!(!AgentState::Error.can_start_run());
    }

    #[test]
    fn test_serde_uses_upper_snake_case() {
        let s = serde_json::to_string(&AgentState::AwaitingUserInput).unwrap();
        assert_eq!(s, "\"AWAITING_USER_INPUT\"");
    }
}
