//! 浏览器工具：都作用于进程内唯一的 [`BrowserSessionManager`]
//!
//! 元素只能通过最近一次快照里的数字索引引用。每个动作完成后返回新的快照文本；
//! 带截图时向前端推送 `browser_view` 事件。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::react::AgentEvent;
use crate::session::{BrowserError, BrowserSessionManager, PageState, ScrollDirection};
use crate::tools::schema::{args_schema, parse_args};
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

fn push_view(ctx: &ToolContext, state: &PageState) {
    if let Some(screenshot) = state.screenshot_data_uri() {
        ctx.events.emit(AgentEvent::BrowserView {
            screenshot: Some(screenshot),
            url: state.url.clone(),
        });
    }
}

/// 索引失效的错误原样返回，其余错误加上动作前缀；都会在前端提示一次
fn browser_failure(ctx: &ToolContext, action: String, err: BrowserError) -> ToolError {
    let err = match err {
        BrowserError::ElementNotFound(_) => ToolError::Browser(err),
        other => ToolError::Execution(format!("{}: {}", action, other)),
    };
    ctx.events.emit(AgentEvent::Chat {
        content: format!("⚠️ Browser error: {}", err),
    });
    err
}

#[derive(Deserialize, JsonSchema)]
struct UrlArgs {
    /// The complete URL to visit.
    url: String,
}

#[derive(Deserialize, JsonSchema)]
struct IndexArgs {
    /// Index number of the element to click.
    index: usize,
}

#[derive(Deserialize, JsonSchema)]
struct InputArgs {
    /// Index number of the element to input text into.
    index: usize,
    /// The complete text content to input.
    text: String,
    /// Whether to press Enter key after input. Defaults to false.
    #[serde(default)]
    press_enter: bool,
}

#[derive(Deserialize, JsonSchema)]
struct KeyArgs {
    /// Key name to simulate (e.g., 'Enter', 'Tab', 'Escape', 'ArrowUp'). Supports combinations like 'Control+C'.
    key: String,
}

#[derive(Deserialize, JsonSchema)]
struct SelectArgs {
    /// Index number of the dropdown list element.
    index: usize,
    /// The index of the option to select, starting from 0.
    option_index: usize,
}

#[derive(Deserialize, JsonSchema)]
struct ConsoleArgs {
    /// The JavaScript code to execute.
    javascript: String,
}

pub struct BrowserNavigateTool {
    browser: Arc<BrowserSessionManager>,
}

impl BrowserNavigateTool {
    pub fn new(browser: Arc<BrowserSessionManager>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl Tool for BrowserNavigateTool {
    fn name(&self) -> &str {
        "browser_navigate"
    }

    fn description(&self) -> &str {
        "Navigates the browser to a specified URL."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<UrlArgs>()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let UrlArgs { url } = parse_args(args)?;
        let state = self
            .browser
            .navigate(&url)
            .await
            .map_err(|e| browser_failure(ctx, format!("Failed to navigate to {}", url), e))?;
        push_view(ctx, &state);
        Ok(ToolResult::success(format!(
            "Navigated to {}.\n{}",
            url,
            state.render_for_agent()
        )))
    }

    async fn cleanup(&self) {
        self.browser.cleanup().await;
    }
}

/// 只读当前页面；截图同时附在结果上
pub struct BrowserViewTool {
    browser: Arc<BrowserSessionManager>,
}

impl BrowserViewTool {
    pub fn new(browser: Arc<BrowserSessionManager>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl Tool for BrowserViewTool {
    fn name(&self) -> &str {
        "browser_view"
    }

    fn description(&self) -> &str {
        "Displays the content of the current browser page."
    }

    async fn execute(&self, ctx: &ToolContext, _args: Value) -> Result<ToolResult, ToolError> {
        let state = self
            .browser
            .snapshot_state_for_agent()
            .await
            .map_err(|e| browser_failure(ctx, "Failed to view browser page".to_string(), e))?;
        push_view(ctx, &state);
        let result = ToolResult::success(state.render_for_agent());
        Ok(match state.screenshot {
            Some(b64) => result.with_image(b64),
            None => result,
        })
    }
}

pub struct BrowserClickTool {
    browser: Arc<BrowserSessionManager>,
}

impl BrowserClickTool {
    pub fn new(browser: Arc<BrowserSessionManager>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl Tool for BrowserClickTool {
    fn name(&self) -> &str {
        "browser_click"
    }

    fn description(&self) -> &str {
        "Simulates a click on an element on the current browser page by its index."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<IndexArgs>()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let IndexArgs { index } = parse_args(args)?;
        let state = self
            .browser
            .click(index)
            .await
            .map_err(|e| browser_failure(ctx, format!("Failed to click element {}", index), e))?;
        push_view(ctx, &state);
        Ok(ToolResult::success(format!(
            "Clicked element with index {}.\n{}",
            index,
            state.render_for_agent()
        )))
    }
}

pub struct BrowserInputTool {
    browser: Arc<BrowserSessionManager>,
}

impl BrowserInputTool {
    pub fn new(browser: Arc<BrowserSessionManager>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl Tool for BrowserInputTool {
    fn name(&self) -> &str {
        "browser_input"
    }

    fn description(&self) -> &str {
        "Overwrites text in editable elements on the current browser page. Use when filling content in input fields."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<InputArgs>()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let InputArgs {
            index,
            text,
            press_enter,
        } = parse_args(args)?;
        let state = self
            .browser
            .input_text(index, &text, press_enter)
            .await
            .map_err(|e| {
                browser_failure(ctx, format!("Failed to input text into element {}", index), e)
            })?;
        push_view(ctx, &state);

        let mut receipt = format!("Input text '{}' into element with index {}.", text, index);
        if press_enter {
            receipt.push_str(" Pressed Enter.");
        }
        Ok(ToolResult::success(format!(
            "{}\n{}",
            receipt,
            state.render_for_agent()
        )))
    }
}

/// 上下滚动一屏；两个方向共用一个实现
pub struct BrowserScrollTool {
    browser: Arc<BrowserSessionManager>,
    direction: ScrollDirection,
}

impl BrowserScrollTool {
    pub fn up(browser: Arc<BrowserSessionManager>) -> Self {
        Self {
            browser,
            direction: ScrollDirection::Up,
        }
    }

    pub fn down(browser: Arc<BrowserSessionManager>) -> Self {
        Self {
            browser,
            direction: ScrollDirection::Down,
        }
    }

    fn word(&self) -> &'static str {
        match self.direction {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        }
    }
}

#[async_trait]
impl Tool for BrowserScrollTool {
    fn name(&self) -> &str {
        match self.direction {
            ScrollDirection::Up => "browser_scroll_up",
            ScrollDirection::Down => "browser_scroll_down",
        }
    }

    fn description(&self) -> &str {
        match self.direction {
            ScrollDirection::Up => {
                "Scrolls the current browser page upward, one viewport at a time."
            }
            ScrollDirection::Down => {
                "Scrolls the current browser page downward, one viewport at a time."
            }
        }
    }

    async fn execute(&self, ctx: &ToolContext, _args: Value) -> Result<ToolResult, ToolError> {
        let state = self
            .browser
            .scroll(self.direction)
            .await
            .map_err(|e| browser_failure(ctx, format!("Failed to scroll {}", self.word()), e))?;
        push_view(ctx, &state);
        Ok(ToolResult::success(format!(
            "Scrolled {} one page.\n{}",
            self.word(),
            state.render_for_agent()
        )))
    }
}

pub struct BrowserPressKeyTool {
    browser: Arc<BrowserSessionManager>,
}

impl BrowserPressKeyTool {
    pub fn new(browser: Arc<BrowserSessionManager>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl Tool for BrowserPressKeyTool {
    fn name(&self) -> &str {
        "browser_press_key"
    }

    fn description(&self) -> &str {
        "Simulates a key press (or key combination) on the current browser page."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<KeyArgs>()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let KeyArgs { key } = parse_args(args)?;
        let state = self
            .browser
            .press_key(&key)
            .await
            .map_err(|e| browser_failure(ctx, format!("Failed to press key '{}'", key), e))?;
        push_view(ctx, &state);
        Ok(ToolResult::success(format!(
            "Pressed key '{}'.\n{}",
            key,
            state.render_for_agent()
        )))
    }
}

pub struct BrowserSelectOptionTool {
    browser: Arc<BrowserSessionManager>,
}

impl BrowserSelectOptionTool {
    pub fn new(browser: Arc<BrowserSessionManager>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl Tool for BrowserSelectOptionTool {
    fn name(&self) -> &str {
        "browser_select_option"
    }

    fn description(&self) -> &str {
        "Selects an option from a dropdown list element on the current browser page by specifying indices."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<SelectArgs>()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let SelectArgs {
            index,
            option_index,
        } = parse_args(args)?;
        let state = self
            .browser
            .select_option(index, option_index)
            .await
            .map_err(|e| {
                browser_failure(
                    ctx,
                    format!("Failed to select option from dropdown {}", index),
                    e,
                )
            })?;
        push_view(ctx, &state);
        Ok(ToolResult::success(format!(
            "Selected option {} from dropdown {}.\n{}",
            option_index,
            index,
            state.render_for_agent()
        )))
    }
}

pub struct BrowserRestartTool {
    browser: Arc<BrowserSessionManager>,
}

impl BrowserRestartTool {
    pub fn new(browser: Arc<BrowserSessionManager>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl Tool for BrowserRestartTool {
    fn name(&self) -> &str {
        "browser_restart"
    }

    fn description(&self) -> &str {
        "Restarts the browser and navigates to a specified URL. Use when the browser state needs to be reset."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<UrlArgs>()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let UrlArgs { url } = parse_args(args)?;
        let restarted = match self.browser.restart().await {
            Ok(()) => self.browser.navigate(&url).await,
            Err(e) => Err(e),
        };
        let state =
            restarted.map_err(|e| browser_failure(ctx, "Failed to restart browser".to_string(), e))?;
        push_view(ctx, &state);
        Ok(ToolResult::success(format!(
            "Browser restarted and navigated to {}.\n{}",
            url,
            state.render_for_agent()
        )))
    }
}

pub struct BrowserConsoleExecTool {
    browser: Arc<BrowserSessionManager>,
}

impl BrowserConsoleExecTool {
    pub fn new(browser: Arc<BrowserSessionManager>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl Tool for BrowserConsoleExecTool {
    fn name(&self) -> &str {
        "browser_console_exec"
    }

    fn description(&self) -> &str {
        "Executes custom JavaScript code in the browser console."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<ConsoleArgs>()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let ConsoleArgs { javascript } = parse_args(args)?;
        let value = self.browser.evaluate(&javascript).await.map_err(|e| {
            browser_failure(ctx, "Failed to execute JavaScript in console".to_string(), e)
        })?;
        let shown = match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        Ok(ToolResult::success(format!(
            "JavaScript executed successfully. Return value: {}",
            shown
        )))
    }
}
