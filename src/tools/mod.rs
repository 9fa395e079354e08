//! 工具层：Tool trait、注册表、结果类型与全部内置工具
//!
//! 内置工具通过 [`ToolKind`] 静态登记：每个种类对应一个构造函数，依赖（会话管理器、工作目录、
//! 搜索配置）由 [`ToolDeps`] 注入。

pub mod agent_tool;
pub mod browser;
pub mod filesystem;
pub mod message;
pub mod planning;
pub mod python;
pub mod registry;
pub mod result;
pub mod schema;
pub mod scratchpad;
pub mod search;
pub mod shell;
pub mod terminate;

use std::path::PathBuf;
use std::sync::Arc;

pub use agent_tool::AgentTool;
pub use browser::{
    BrowserClickTool, BrowserConsoleExecTool, BrowserInputTool, BrowserNavigateTool,
    BrowserPressKeyTool, BrowserRestartTool, BrowserScrollTool, BrowserSelectOptionTool,
    BrowserViewTool,
};
pub use filesystem::{
    FileFindByNameTool, FileFindInContentTool, FileReadTool, FileStrReplaceTool, FileWriteTool,
};
pub use message::{AskUserTool, NotifyUserTool};
pub use planning::{Plan, PlanStep, PlanningTool, StepStatus};
pub use python::PythonExecuteTool;
pub use registry::{Tool, ToolCollection, ToolContext};
pub use result::{CombineError, SystemSignal, ToolError, ToolResult};
pub use scratchpad::{ScratchpadReadTool, ScratchpadWriteTool};
pub use search::WebSearchTool;
pub use shell::{ShellExecTool, ShellKillTool, ShellViewTool, ShellWaitTool, ShellWriteTool};
pub use terminate::FinishTool;

use crate::config::SearchSection;
use crate::session::Sessions;

/// 内置工具种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ShellExec,
    ShellView,
    ShellWait,
    ShellWriteToProcess,
    ShellKillProcess,
    BrowserNavigate,
    BrowserView,
    BrowserClick,
    BrowserInput,
    BrowserScrollUp,
    BrowserScrollDown,
    BrowserPressKey,
    BrowserSelectOption,
    BrowserRestart,
    BrowserConsoleExec,
    FileRead,
    FileWrite,
    FileStrReplace,
    FileFindByName,
    FileFindInContent,
    InfoSearchWeb,
    PythonExecute,
    MessageNotifyUser,
    MessageAskUser,
    Planning,
    Terminate,
    Idle,
    ScratchpadRead,
    ScratchpadWrite,
}

impl ToolKind {
    pub const ALL: &'static [ToolKind] = &[
        ToolKind::ShellExec,
        ToolKind::ShellView,
        ToolKind::ShellWait,
        ToolKind::ShellWriteToProcess,
        ToolKind::ShellKillProcess,
        ToolKind::BrowserNavigate,
        ToolKind::BrowserView,
        ToolKind::BrowserClick,
        ToolKind::BrowserInput,
        ToolKind::BrowserScrollUp,
        ToolKind::BrowserScrollDown,
        ToolKind::BrowserPressKey,
        ToolKind::BrowserSelectOption,
        ToolKind::BrowserRestart,
        ToolKind::BrowserConsoleExec,
        ToolKind::FileRead,
        ToolKind::FileWrite,
        ToolKind::FileStrReplace,
        ToolKind::FileFindByName,
        ToolKind::FileFindInContent,
        ToolKind::InfoSearchWeb,
        ToolKind::PythonExecute,
        ToolKind::MessageNotifyUser,
        ToolKind::MessageAskUser,
        ToolKind::Planning,
        ToolKind::Terminate,
        ToolKind::Idle,
        ToolKind::ScratchpadRead,
        ToolKind::ScratchpadWrite,
    ];

    pub const SHELL: &'static [ToolKind] = &[
        ToolKind::ShellExec,
        ToolKind::ShellView,
        ToolKind::ShellWait,
        ToolKind::ShellWriteToProcess,
        ToolKind::ShellKillProcess,
    ];

    pub const BROWSER: &'static [ToolKind] = &[
        ToolKind::BrowserNavigate,
        ToolKind::BrowserView,
        ToolKind::BrowserClick,
        ToolKind::BrowserInput,
        ToolKind::BrowserScrollUp,
        ToolKind::BrowserScrollDown,
        ToolKind::BrowserPressKey,
        ToolKind::BrowserSelectOption,
        ToolKind::BrowserRestart,
        ToolKind::BrowserConsoleExec,
    ];

    pub const FILES: &'static [ToolKind] = &[
        ToolKind::FileRead,
        ToolKind::FileWrite,
        ToolKind::FileStrReplace,
        ToolKind::FileFindByName,
        ToolKind::FileFindInContent,
    ];

    /// 与工具的 name() 一致
    pub fn tool_name(self) -> &'static str {
        match self {
            ToolKind::ShellExec => "shell_exec",
            ToolKind::ShellView => "shell_view",
            ToolKind::ShellWait => "shell_wait",
            ToolKind::ShellWriteToProcess => "shell_write_to_process",
            ToolKind::ShellKillProcess => "shell_kill_process",
            ToolKind::BrowserNavigate => "browser_navigate",
            ToolKind::BrowserView => "browser_view",
            ToolKind::BrowserClick => "browser_click",
            ToolKind::BrowserInput => "browser_input",
            ToolKind::BrowserScrollUp => "browser_scroll_up",
            ToolKind::BrowserScrollDown => "browser_scroll_down",
            ToolKind::BrowserPressKey => "browser_press_key",
            ToolKind::BrowserSelectOption => "browser_select_option",
            ToolKind::BrowserRestart => "browser_restart",
            ToolKind::BrowserConsoleExec => "browser_console_exec",
            ToolKind::FileRead => "file_read",
            ToolKind::FileWrite => "file_write",
            ToolKind::FileStrReplace => "file_str_replace",
            ToolKind::FileFindByName => "file_find_by_name",
            ToolKind::FileFindInContent => "file_find_in_content",
            ToolKind::InfoSearchWeb => "info_search_web",
            ToolKind::PythonExecute => "python_execute",
            ToolKind::MessageNotifyUser => "message_notify_user",
            ToolKind::MessageAskUser => "message_ask_user",
            ToolKind::Planning => "planning",
            ToolKind::Terminate => "terminate",
            ToolKind::Idle => "idle",
            ToolKind::ScratchpadRead => "scratchpad_read",
            ToolKind::ScratchpadWrite => "scratchpad_write",
        }
    }

    pub fn from_name(name: &str) -> Option<ToolKind> {
        Self::ALL.iter().copied().find(|k| k.tool_name() == name)
    }

    /// 按种类构造工具实例
    pub fn build(self, deps: &ToolDeps) -> Arc<dyn Tool> {
        let shell = || deps.sessions.shell.clone();
        let browser = || deps.sessions.browser.clone();
        match self {
            ToolKind::ShellExec => {
                Arc::new(ShellExecTool::new(shell(), deps.workspace_root.clone()))
            }
            ToolKind::ShellView => Arc::new(ShellViewTool::new(shell())),
            ToolKind::ShellWait => Arc::new(ShellWaitTool::new(shell())),
            ToolKind::ShellWriteToProcess => Arc::new(ShellWriteTool::new(shell())),
            ToolKind::ShellKillProcess => Arc::new(ShellKillTool::new(shell())),
            ToolKind::BrowserNavigate => Arc::new(BrowserNavigateTool::new(browser())),
            ToolKind::BrowserView => Arc::new(BrowserViewTool::new(browser())),
            ToolKind::BrowserClick => Arc::new(BrowserClickTool::new(browser())),
            ToolKind::BrowserInput => Arc::new(BrowserInputTool::new(browser())),
            ToolKind::BrowserScrollUp => Arc::new(BrowserScrollTool::up(browser())),
            ToolKind::BrowserScrollDown => Arc::new(BrowserScrollTool::down(browser())),
            ToolKind::BrowserPressKey => Arc::new(BrowserPressKeyTool::new(browser())),
            ToolKind::BrowserSelectOption => Arc::new(BrowserSelectOptionTool::new(browser())),
            ToolKind::BrowserRestart => Arc::new(BrowserRestartTool::new(browser())),
            ToolKind::BrowserConsoleExec => Arc::new(BrowserConsoleExecTool::new(browser())),
            ToolKind::FileRead => Arc::new(FileReadTool),
            ToolKind::FileWrite => Arc::new(FileWriteTool),
            ToolKind::FileStrReplace => Arc::new(FileStrReplaceTool),
            ToolKind::FileFindByName => Arc::new(FileFindByNameTool),
            ToolKind::FileFindInContent => Arc::new(FileFindInContentTool),
            ToolKind::InfoSearchWeb => Arc::new(WebSearchTool::new(
                deps.search.timeout_secs,
                deps.search.max_results,
            )),
            ToolKind::PythonExecute => Arc::new(PythonExecuteTool::new()),
            ToolKind::MessageNotifyUser => Arc::new(NotifyUserTool),
            ToolKind::MessageAskUser => Arc::new(AskUserTool),
            ToolKind::Planning => Arc::new(PlanningTool::new()),
            ToolKind::Terminate => Arc::new(FinishTool::terminate()),
            ToolKind::Idle => Arc::new(FinishTool::idle()),
            ToolKind::ScratchpadRead => Arc::new(ScratchpadReadTool),
            ToolKind::ScratchpadWrite => Arc::new(ScratchpadWriteTool),
        }
    }
}

/// 构造工具所需的共享依赖
#[derive(Clone)]
pub struct ToolDeps {
    pub sessions: Sessions,
    pub workspace_root: PathBuf,
    pub search: SearchSection,
}

impl ToolDeps {
    pub fn new(sessions: Sessions, workspace_root: impl Into<PathBuf>, search: SearchSection) -> Self {
        Self {
            sessions,
            workspace_root: workspace_root.into(),
            search,
        }
    }

    /// 按列表顺序构造一个工具集合
    pub fn collection(&self, kinds: &[ToolKind]) -> ToolCollection {
        ToolCollection::from_tools(kinds.iter().map(|k| k.build(self)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::browser::fake;
    use crate::session::ShellSessionManager;
    use std::collections::HashSet;

    fn deps() -> ToolDeps {
        let (browser, _log) = fake::manager();
        let sessions = Sessions::new(Arc::new(ShellSessionManager::default()), browser);
        ToolDeps::new(sessions, std::env::temp_dir(), SearchSection::default())
    }

    #[test]
    fn test_every_kind_builds_with_matching_name() {
        let deps = deps();
        let mut seen = HashSet::new();
        for kind in ToolKind::ALL {
            let tool = kind.build(&deps);
            assert_eq!(tool.name(), kind.tool_name());
            assert_eq!(ToolKind::from_name(tool.name()), Some(*kind));
            assert!(seen.insert(kind.tool_name()));
            assert_eq!(tool.to_param().parameters["type"], "object");
        }
        assert_eq!(ToolKind::BROWSER.len(), 10);
    }

    #[test]
    fn test_collection_keeps_order() {
        let tools = deps().collection(ToolKind::SHELL);
        assert_eq!(
            tools.names(),
            vec![
                "shell_exec",
                "shell_view",
                "shell_wait",
                "shell_write_to_process",
                "shell_kill_process"
            ]
        );
    }
}
