//! Headless Chrome 驱动（feature "browser"）
//!
//! headless_chrome 是同步 API，所有调用放进 spawn_blocking。
//! 快照脚本给可见的可交互元素打上 `data-forager-index`，后续动作按该属性定位。

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;

use crate::session::browser::{
    BrowserDriver, BrowserError, BrowserLauncher, PageState, ScrollDirection,
};

const INDEX_ATTR: &str = "data-forager-index";

const SNAPSHOT_JS: &str = r#"
(() => {
  const selector = 'a[href], button, input, textarea, select, [role="button"], [role="link"], [onclick], [contenteditable="true"]';
  document.querySelectorAll('[data-forager-index]').forEach(el => el.removeAttribute('data-forager-index'));
  const elements = [];
  let index = 0;
  for (const el of document.querySelectorAll(selector)) {
    const rect = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    if (rect.width === 0 || rect.height === 0 || style.visibility === 'hidden' || style.display === 'none') {
      continue;
    }
    el.setAttribute('data-forager-index', String(index));
    const label = (el.innerText || el.value || el.getAttribute('aria-label') || el.getAttribute('placeholder') || el.getAttribute('title') || '')
      .replace(/\s+/g, ' ').trim().substring(0, 100);
    elements.push({ index, tag: el.tagName.toLowerCase(), text: label });
    index += 1;
  }
  return JSON.stringify({ title: document.title, url: window.location.href, elements });
})()
"#;

/// 启动本机 Chrome / Chromium
pub struct ChromeLauncher {
    headless: bool,
}

impl ChromeLauncher {
    pub fn new(headless: bool) -> Self {
        Self { headless }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserDriver>, BrowserError> {
        let headless = self.headless;
        let (browser, tab) = tokio::task::spawn_blocking(move || {
            let options = LaunchOptions::default_builder()
                .headless(headless)
                .build()
                .map_err(|e| BrowserError::Launch(e.to_string()))?;
            let browser = Browser::new(options).map_err(|e| BrowserError::Launch(e.to_string()))?;
            let tab = browser
                .new_tab()
                .map_err(|e| BrowserError::Launch(e.to_string()))?;
            Ok::<_, BrowserError>((browser, tab))
        })
        .await
        .map_err(|e| BrowserError::Launch(format!("launch task failed: {}", e)))??;

        Ok(Box::new(ChromeDriver {
            browser: Some(browser),
            tab,
        }))
    }
}

pub struct ChromeDriver {
    browser: Option<Browser>,
    tab: Arc<Tab>,
}

impl ChromeDriver {
    async fn blocking<T, F>(&self, f: F) -> Result<T, BrowserError>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T, BrowserError> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .map_err(|e| BrowserError::Driver(format!("browser task failed: {}", e)))?
    }
}

fn index_selector(index: usize) -> String {
    format!("[{}=\"{}\"]", INDEX_ATTR, index)
}

fn driver_err(e: impl std::fmt::Display) -> BrowserError {
    BrowserError::Driver(e.to_string())
}

fn eval_value(tab: &Tab, script: &str) -> Result<Value, BrowserError> {
    let remote = tab.evaluate(script, true).map_err(driver_err)?;
    Ok(remote.value.unwrap_or(Value::Null))
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        let url = url.to_string();
        self.blocking(move |tab| {
            tab.navigate_to(&url)
                .and_then(|t| t.wait_until_navigated())
                .map_err(|e| BrowserError::Navigation(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn snapshot(&mut self) -> Result<PageState, BrowserError> {
        self.blocking(|tab| {
            let raw = eval_value(tab, SNAPSHOT_JS)?;
            let text = raw
                .as_str()
                .ok_or_else(|| BrowserError::Driver("snapshot script returned no data".into()))?;
            serde_json::from_str::<PageState>(text).map_err(driver_err)
        })
        .await
    }

    async fn click(&mut self, index: usize) -> Result<(), BrowserError> {
        self.blocking(move |tab| {
            let element = tab
                .find_element(&index_selector(index))
                .map_err(|_| BrowserError::ElementNotFound(index))?;
            element.click().map_err(driver_err)?;
            Ok(())
        })
        .await
    }

    async fn input_text(&mut self, index: usize, text: &str) -> Result<(), BrowserError> {
        let text = text.to_string();
        self.blocking(move |tab| {
            let selector = index_selector(index);
            let element = tab
                .find_element(&selector)
                .map_err(|_| BrowserError::ElementNotFound(index))?;
            element.click().map_err(driver_err)?;
            let clear = format!(
                "(() => {{ const el = document.querySelector('{}'); if (el) {{ el.value = ''; el.focus(); }} }})()",
                selector.replace('\'', "\\'")
            );
            eval_value(tab, &clear)?;
            tab.type_str(&text).map_err(driver_err)?;
            Ok(())
        })
        .await
    }

    async fn press_key(&mut self, key: &str) -> Result<(), BrowserError> {
        let key = key.to_string();
        self.blocking(move |tab| {
            tab.press_key(&key).map_err(driver_err)?;
            Ok(())
        })
        .await
    }

    async fn scroll(&mut self, direction: ScrollDirection) -> Result<(), BrowserError> {
        let script = match direction {
            ScrollDirection::Up => "window.scrollBy(0, -window.innerHeight)",
            ScrollDirection::Down => "window.scrollBy(0, window.innerHeight)",
        };
        self.blocking(move |tab| eval_value(tab, script).map(|_| ()))
            .await
    }

    async fn select_option(&mut self, index: usize, option_index: usize) -> Result<(), BrowserError> {
        let script = format!(
            "(() => {{ const el = document.querySelector('{}'); \
             if (!el || el.tagName.toLowerCase() !== 'select') return false; \
             el.selectedIndex = {}; \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); return true; }})()",
            index_selector(index).replace('\'', "\\'"),
            option_index
        );
        self.blocking(move |tab| match eval_value(tab, &script)? {
            Value::Bool(true) => Ok(()),
            _ => Err(BrowserError::Driver(format!(
                "Dropdown element with index {} not found.",
                index
            ))),
        })
        .await
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value, BrowserError> {
        let script = script.to_string();
        self.blocking(move |tab| eval_value(tab, &script)).await
    }

    async fn screenshot(&mut self) -> Result<Option<String>, BrowserError> {
        self.blocking(|tab| {
            let png = tab
                .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
                .map_err(driver_err)?;
            Ok(Some(base64::engine::general_purpose::STANDARD.encode(png)))
        })
        .await
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        let tab = Arc::clone(&self.tab);
        let browser = self.browser.take();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = tab.close(true) {
                tracing::debug!(error = %e, "failed to close browser tab");
            }
            drop(browser);
        })
        .await
        .map_err(driver_err)
    }
}
