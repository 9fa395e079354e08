//! info_search_web：通过 HTML 搜索端点检索网页
//!
//! GET 请求带超时与浏览器 User-Agent；结果块用 regex 切分，标题与摘要经 html2text 转为纯文本。

use std::time::Duration;

use async_trait::async_trait;
use html2text::from_read;
use regex::Regex;
use reqwest::Client;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::schema::{args_schema, parse_args};
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// 单条搜索结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub position: usize,
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// 去掉内联标签（<b> 等）后交给 html2text 解码实体，再压缩空白
fn html_fragment_to_text(fragment: &str) -> String {
    let stripped = match Regex::new(r"<[^>]*>") {
        Ok(tag_re) => tag_re.replace_all(fragment, "").into_owned(),
        Err(_) => fragment.to_string(),
    };
    let text = match from_read(stripped.as_bytes(), 10_000) {
        Ok(text) => text,
        Err(_) => stripped.clone(),
    };
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 搜索页里的链接是跳转地址（`//duckduckgo.com/l/?uddg=<编码后的目标>`），取出真实目标
fn resolve_link(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };
    match reqwest::Url::parse(&absolute) {
        Ok(url) => url
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned())
            .unwrap_or(absolute),
        Err(_) => absolute,
    }
}

/// 从搜索结果页 HTML 中提取最多 `max` 条结果
pub fn parse_results(html: &str, max: usize) -> Vec<SearchHit> {
    let (Ok(link_re), Ok(snippet_re)) = (
        Regex::new(r#"(?s)<a[^>]*class="result__a"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#),
        Regex::new(r#"(?s)class="result__snippet"[^>]*>(.*?)</(?:a|div|td)>"#),
    ) else {
        return Vec::new();
    };

    let links: Vec<_> = link_re.captures_iter(html).collect();
    let mut hits = Vec::new();
    for (i, caps) in links.iter().enumerate() {
        if hits.len() >= max {
            break;
        }
        let (Some(whole), Some(href), Some(title)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        // 摘要位于本条链接之后、下一条链接之前
        let block_end = links
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(html.len(), |m| m.start());
        let snippet = snippet_re
            .captures(&html[whole.end()..block_end])
            .and_then(|c| c.get(1))
            .map(|m| html_fragment_to_text(m.as_str()))
            .unwrap_or_default();

        hits.push(SearchHit {
            position: hits.len() + 1,
            title: html_fragment_to_text(title.as_str()),
            url: resolve_link(href.as_str()),
            snippet,
        });
    }
    hits
}

/// 给 Agent 的文本格式
pub fn format_results(query: &str, hits: &[SearchHit]) -> String {
    let mut lines = vec![format!("Search results for query: '{}'\n", query)];
    for hit in hits {
        lines.push(format!("[{}] {}", hit.position, hit.title));
        lines.push(format!("    URL: {}", hit.url));
        if !hit.snippet.is_empty() {
            lines.push(format!("    Snippet: {}", hit.snippet));
        }
    }
    lines.join("\n")
}

#[derive(Deserialize, JsonSchema)]
struct SearchArgs {
    /// Search query in Google search style, using 3-5 keywords.
    query: String,
}

pub struct WebSearchTool {
    client: Client,
    endpoint: String,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(timeout_secs: u64, max_results: usize) -> Self {
        use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            max_results,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn fetch(&self, query: &str) -> Result<String, String> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        resp.text().await.map_err(|e| format!("Read body: {}", e))
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "info_search_web"
    }

    fn description(&self) -> &str {
        "Searches the web using a Google-like query for up-to-date information or references."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<SearchArgs>()
    }

    async fn execute(&self, _ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let SearchArgs { query } = parse_args(args)?;
        tracing::info!(query = %query, "web search");
        let html = self.fetch(&query).await.map_err(|e| {
            ToolError::Execution(format!("Web search failed for query '{}': {}", query, e))
        })?;
        let hits = parse_results(&html, self.max_results);
        if hits.is_empty() {
            return Err(ToolError::Execution("No search results found.".to_string()));
        }
        Ok(ToolResult::success(format_results(&query, &hits)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<div class="result results_links">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2F&amp;rut=abc">Rust <b>Programming</b> Language</a>
  </h2>
  <a class="result__snippet" href="//duckduckgo.com/l/?uddg=x">A language empowering everyone to build <b>reliable</b> software.</a>
</div>
<div class="result results_links">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="https://doc.rust-lang.org/book/">The Book</a>
  </h2>
</div>
"#;

    #[test]
    fn test_parse_results() {
        let hits = parse_results(PAGE, 5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Rust Programming Language");
        assert_eq!(hits[0].url, "https://www.rust-lang.org/");
        assert!(hits[0].snippet.contains("reliable software"));
        assert_eq!(hits[1].url, "https://doc.rust-lang.org/book/");
        assert_eq!(hits[1].snippet, "");

        assert_eq!(parse_results(PAGE, 1).len(), 1);
        assert!(parse_results("<html></html>", 5).is_empty());
    }

    #[test]
    fn test_format_results() {
        let hits = parse_results(PAGE, 5);
        let text = format_results("rust", &hits);
        assert!(text.starts_with("Search results for query: 'rust'\n\n[1] Rust Programming Language"));
        assert!(text.contains("    URL: https://www.rust-lang.org/"));
        assert!(text.ends_with("[2] The Book\n    URL: https://doc.rust-lang.org/book/"));
    }
}
