//! 共享浏览器会话
//!
//! 整个进程只有一个浏览器页面，由 tokio Mutex 串行化：首次访问时在锁内惰性启动，
//! restart / cleanup 在同一把锁下拆除。工具只通过快照里的数字索引引用元素，
//! 每个动作都是 动作 → 短暂等待 → 重新快照 → 返回快照文本。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Element with index {0} not found.")]
    ElementNotFound(usize),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("{0}")]
    Driver(String),

    #[error("Browser is not available: {0}")]
    Unavailable(String),
}

/// 快照中的一个可交互元素
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementInfo {
    pub index: usize,
    pub tag: String,
    #[serde(default)]
    pub text: String,
}

impl fmt::Display for ElementInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]<{}>{}</{}>", self.index, self.tag, self.text, self.tag)
    }
}

/// 一次快照：标题、URL、按索引编号的可交互元素、可选截图（base64 PNG）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageState {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub elements: Vec<ElementInfo>,
    #[serde(skip)]
    pub screenshot: Option<String>,
}

impl PageState {
    pub fn element(&self, index: usize) -> Option<&ElementInfo> {
        self.elements.iter().find(|e| e.index == index)
    }

    /// 截图的 data URI 形式
    pub fn screenshot_data_uri(&self) -> Option<String> {
        self.screenshot
            .as_ref()
            .map(|b64| format!("data:image/png;base64,{}", b64))
    }

    /// 给 Agent 阅读的文本
    pub fn render_for_agent(&self) -> String {
        let title = if self.title.is_empty() { "N/A" } else { &self.title };
        let url = if self.url.is_empty() { "N/A" } else { &self.url };
        let elements = if self.elements.is_empty() {
            "No interactive elements found.".to_string()
        } else {
            self.elements
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n")
        };
        format!(
            "Current browser state:\n- Title: {}\n- URL: {}\n\nInteractive elements:\n{}",
            title, url, elements
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

/// 底层浏览器驱动；元素一律按最近一次快照的索引寻址
#[async_trait]
pub trait BrowserDriver: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;
    async fn snapshot(&mut self) -> Result<PageState, BrowserError>;
    async fn click(&mut self, index: usize) -> Result<(), BrowserError>;
    async fn input_text(&mut self, index: usize, text: &str) -> Result<(), BrowserError>;
    async fn press_key(&mut self, key: &str) -> Result<(), BrowserError>;
    async fn scroll(&mut self, direction: ScrollDirection) -> Result<(), BrowserError>;
    async fn select_option(&mut self, index: usize, option_index: usize) -> Result<(), BrowserError>;
    async fn evaluate(&mut self, script: &str) -> Result<Value, BrowserError>;

    async fn screenshot(&mut self) -> Result<Option<String>, BrowserError> {
        Ok(None)
    }

    async fn close(&mut self) -> Result<(), BrowserError>;
}

/// 按需启动浏览器
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserDriver>, BrowserError>;
}

/// 未启用 `browser` feature 时使用：任何访问都返回 Unavailable
pub struct UnavailableLauncher;

#[async_trait]
impl BrowserLauncher for UnavailableLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserDriver>, BrowserError> {
        Err(BrowserError::Unavailable(
            "this build does not include the `browser` feature".to_string(),
        ))
    }
}

#[derive(Default)]
struct Inner {
    driver: Option<Box<dyn BrowserDriver>>,
    last_state: Option<PageState>,
}

/// 持锁的页面句柄；drop 时释放锁
pub struct BrowserPage<'a> {
    guard: MutexGuard<'a, Inner>,
}

impl BrowserPage<'_> {
    pub fn driver(&mut self) -> Result<&mut (dyn BrowserDriver + 'static), BrowserError> {
        match self.guard.driver.as_deref_mut() {
            Some(driver) => Ok(driver),
            None => Err(BrowserError::Unavailable("browser was torn down".to_string())),
        }
    }

    /// 最近一次快照（可能已过期）
    pub fn last_state(&self) -> Option<&PageState> {
        self.guard.last_state.as_ref()
    }

    /// 重新快照并记录；截图失败只记日志
    pub async fn snapshot(&mut self) -> Result<PageState, BrowserError> {
        let driver = self.driver()?;
        let mut state = driver.snapshot().await?;
        match driver.screenshot().await {
            Ok(shot) => state.screenshot = shot,
            Err(e) => tracing::debug!(error = %e, "browser screenshot failed"),
        }
        self.guard.last_state = Some(state.clone());
        Ok(state)
    }

    /// 在最近一次快照中查找索引；没有快照时先快照
    pub async fn element(&mut self, index: usize) -> Result<ElementInfo, BrowserError> {
        if self.guard.last_state.is_none() {
            self.snapshot().await?;
        }
        self.last_state()
            .and_then(|s| s.element(index))
            .cloned()
            .ok_or(BrowserError::ElementNotFound(index))
    }
}

/// 进程级浏览器会话；启动时构造一次并注入到各个浏览器工具
pub struct BrowserSessionManager {
    launcher: Arc<dyn BrowserLauncher>,
    inner: Mutex<Inner>,
    action_delay: Duration,
}

impl BrowserSessionManager {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, action_delay: Duration) -> Self {
        Self {
            launcher,
            inner: Mutex::new(Inner::default()),
            action_delay,
        }
    }

    /// 获取页面；首次调用在锁内启动浏览器
    pub async fn get_page(&self) -> Result<BrowserPage<'_>, BrowserError> {
        let mut guard = self.inner.lock().await;
        if guard.driver.is_none() {
            let driver = self.launcher.launch().await?;
            tracing::info!("browser launched");
            guard.driver = Some(driver);
            guard.last_state = None;
        }
        Ok(BrowserPage { guard })
    }

    /// 按索引获取最近快照中的可交互元素
    pub async fn get_interactive_element(&self, index: usize) -> Result<ElementInfo, BrowserError> {
        self.get_page().await?.element(index).await
    }

    pub async fn snapshot_state_for_agent(&self) -> Result<PageState, BrowserError> {
        self.get_page().await?.snapshot().await
    }

    /// 浏览器是否已启动（不会触发启动）
    pub async fn is_active(&self) -> bool {
        self.inner.lock().await.driver.is_some()
    }

    /// 已启动时取页面，检查与后续操作在同一次持锁内；不会触发启动
    pub async fn page_if_active(&self) -> Option<BrowserPage<'_>> {
        let guard = self.inner.lock().await;
        if guard.driver.is_none() {
            return None;
        }
        Some(BrowserPage { guard })
    }

    /// 已启动时返回当前状态文本；未启动返回 None
    pub async fn current_state_if_active(&self) -> Option<String> {
        let mut page = self.page_if_active().await?;
        match page.snapshot().await {
            Ok(state) => Some(state.render_for_agent()),
            Err(e) => Some(format!("Error retrieving browser state: {}", e)),
        }
    }

    /// 拆除浏览器，下次访问重新启动
    pub async fn restart(&self) -> Result<(), BrowserError> {
        let mut guard = self.inner.lock().await;
        Self::teardown(&mut guard).await;
        tracing::info!("browser restarted");
        Ok(())
    }

    /// 关闭浏览器；已关闭时无操作
    pub async fn cleanup(&self) {
        let mut guard = self.inner.lock().await;
        if guard.driver.is_some() {
            Self::teardown(&mut guard).await;
            tracing::info!("browser closed");
        }
    }

    async fn teardown(inner: &mut Inner) {
        if let Some(mut driver) = inner.driver.take() {
            if let Err(e) = driver.close().await {
                tracing::warn!(error = %e, "error while closing browser");
            }
        }
        inner.last_state = None;
    }

    pub async fn navigate(&self, url: &str) -> Result<PageState, BrowserError> {
        let mut page = self.get_page().await?;
        page.driver()?.navigate(url).await?;
        self.settle(&mut page).await
    }

    pub async fn click(&self, index: usize) -> Result<PageState, BrowserError> {
        let mut page = self.get_page().await?;
        page.element(index).await?;
        page.driver()?.click(index).await?;
        self.settle(&mut page).await
    }

    pub async fn input_text(
        &self,
        index: usize,
        text: &str,
        press_enter: bool,
    ) -> Result<PageState, BrowserError> {
        let mut page = self.get_page().await?;
        page.element(index).await?;
        let driver = page.driver()?;
        driver.input_text(index, text).await?;
        if press_enter {
            driver.press_key("Enter").await?;
        }
        self.settle(&mut page).await
    }

    pub async fn press_key(&self, key: &str) -> Result<PageState, BrowserError> {
        let mut page = self.get_page().await?;
        page.driver()?.press_key(key).await?;
        self.settle(&mut page).await
    }

    pub async fn scroll(&self, direction: ScrollDirection) -> Result<PageState, BrowserError> {
        let mut page = self.get_page().await?;
        page.driver()?.scroll(direction).await?;
        self.settle(&mut page).await
    }

    pub async fn select_option(
        &self,
        index: usize,
        option_index: usize,
    ) -> Result<PageState, BrowserError> {
        let mut page = self.get_page().await?;
        page.element(index).await?;
        page.driver()?.select_option(index, option_index).await?;
        self.settle(&mut page).await
    }

    pub async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        let mut page = self.get_page().await?;
        page.driver()?.evaluate(script).await
    }

    async fn settle(&self, page: &mut BrowserPage<'_>) -> Result<PageState, BrowserError> {
        if !self.action_delay.is_zero() {
            tokio::time::sleep(self.action_delay).await;
        }
        page.snapshot().await
    }
}
