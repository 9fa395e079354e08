//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `FORAGER__*` 覆盖（双下划线表示嵌套，如 `FORAGER__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub tools: ToolsSection,
}

/// [app] 段：应用名、工作目录、整体运行时限
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 工作目录，未设置时用 ./workspace
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    /// 一次编排运行的总时限（秒），由入口程序包裹
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            workspace_root: default_workspace_root(),
            run_timeout_secs: default_run_timeout_secs(),
        }
    }
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("./workspace")
}

fn default_run_timeout_secs() -> u64 {
    3600
}

/// [llm] 段：后端选择、端点与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / deepseek / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    /// 未设置时使用各后端的默认模型
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// 未设置时读取 OPENAI_API_KEY / DEEPSEEK_API_KEY
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 请求前的输入 token 上限（估算值），超出即视为 token 超限
    pub max_input_tokens: Option<usize>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_input_tokens: None,
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

/// [agent] 段：步数上限、卡死检测阈值、观察截断长度
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: usize,
    /// 单条工具结果写入记忆前的最大字符数；0 表示不截断
    #[serde(default = "default_max_observe")]
    pub max_observe: usize,
    /// auto / required
    #[serde(default = "default_tool_choice")]
    pub tool_choice: String,
    /// 记忆保留的消息条数上限；0 表示不限
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            duplicate_threshold: default_duplicate_threshold(),
            max_observe: default_max_observe(),
            tool_choice: default_tool_choice(),
            max_messages: default_max_messages(),
        }
    }
}

fn default_max_steps() -> usize {
    20
}

fn default_duplicate_threshold() -> usize {
    2
}

fn default_max_observe() -> usize {
    10000
}

fn default_tool_choice() -> String {
    "auto".to_string()
}

fn default_max_messages() -> usize {
    100
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ToolsSection {
    #[serde(default)]
    pub shell: ShellSection,
    #[serde(default)]
    pub browser: BrowserSection,
    #[serde(default)]
    pub search: SearchSection,
}

/// [tools.shell] 段：非阻塞读取的等待时间
#[derive(Debug, Clone, Deserialize)]
pub struct ShellSection {
    /// 每次轮询等待进程退出的时长（毫秒）
    #[serde(default = "default_poll_wait_ms")]
    pub poll_wait_ms: u64,
    /// 进程退出后等待输出管道读尽的时长（毫秒）
    #[serde(default = "default_drain_grace_ms")]
    pub drain_grace_ms: u64,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            poll_wait_ms: default_poll_wait_ms(),
            drain_grace_ms: default_drain_grace_ms(),
        }
    }
}

fn default_poll_wait_ms() -> u64 {
    100
}

fn default_drain_grace_ms() -> u64 {
    500
}

/// [tools.browser] 段
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSection {
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// 每次页面操作后等待页面响应的时长（毫秒）
    #[serde(default = "default_action_delay_ms")]
    pub action_delay_ms: u64,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            action_delay_ms: default_action_delay_ms(),
        }
    }
}

fn default_headless() -> bool {
    true
}

fn default_action_delay_ms() -> u64 {
    1000
}

/// [tools.search] 段
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_search_timeout_secs(),
            max_results: default_max_results(),
        }
    }
}

fn default_search_timeout_secs() -> u64 {
    15
}

fn default_max_results() -> usize {
    5
}

/// 从 config 目录加载配置，环境变量 FORAGER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 FORAGER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("FORAGER")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
