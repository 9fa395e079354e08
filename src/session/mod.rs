//! 长生命周期外部资源：后台 Shell 进程与共享浏览器

pub mod browser;
#[cfg(feature = "browser")]
pub mod chrome;
pub mod shell;

pub use browser::{
    BrowserDriver, BrowserError, BrowserLauncher, BrowserPage, BrowserSessionManager, ElementInfo,
    PageState, ScrollDirection, UnavailableLauncher,
};
#[cfg(feature = "browser")]
pub use chrome::ChromeLauncher;
pub use shell::{SharedShellSession, ShellError, ShellSession, ShellSessionManager, ShellSnapshot};

use std::sync::Arc;
use std::time::Duration;

use crate::config::ToolsSection;

/// 进程内只构造一次的会话服务，按引用注入到工具
#[derive(Clone)]
pub struct Sessions {
    pub shell: Arc<ShellSessionManager>,
    pub browser: Arc<BrowserSessionManager>,
}

impl Sessions {
    pub fn new(shell: Arc<ShellSessionManager>, browser: Arc<BrowserSessionManager>) -> Self {
        Self { shell, browser }
    }

    /// 按配置构造；未启用 `browser` feature 时浏览器工具会返回不可用错误
    pub fn from_config(tools: &ToolsSection) -> Self {
        let shell = ShellSessionManager::new(
            Duration::from_millis(tools.shell.poll_wait_ms),
            Duration::from_millis(tools.shell.drain_grace_ms),
        );
        Self::new(
            Arc::new(shell),
            Arc::new(BrowserSessionManager::new(
                default_launcher(tools.browser.headless),
                Duration::from_millis(tools.browser.action_delay_ms),
            )),
        )
    }

    /// 结束所有后台进程并关闭浏览器
    pub async fn shutdown(&self) {
        self.shell.kill_all().await;
        self.browser.cleanup().await;
    }
}

#[cfg(feature = "browser")]
fn default_launcher(headless: bool) -> Arc<dyn BrowserLauncher> {
    Arc::new(ChromeLauncher::new(headless))
}

#[cfg(not(feature = "browser"))]
fn default_launcher(_headless: bool) -> Arc<dyn BrowserLauncher> {
    Arc::new(UnavailableLauncher)
}
