//! OpenAI 兼容 API 客户端
//!
//! 通过 reqwest 直接调用 `{base_url}/chat/completions`（function calling），可配置 base_url；
//! 支持 DeepSeek、OpenAI、自建代理等。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::{LlmClient, LlmError, LlmResponse, ToolChoice, ToolSchema};
use crate::memory::{Message, Role, TokenEstimator, ToolCall};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    /// 请求前估算的输入 token 上限
    max_input_tokens: Option<usize>,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        Self {
            client: reqwest::Client::new(),
            base_url: base_url
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: model.to_string(),
            max_input_tokens: None,
            usage: TokenUsage::new(),
        }
    }

    /// 设置单次请求超时；构建失败时保留默认客户端
    pub fn with_timeout(mut self, secs: u64) -> Self {
        match reqwest::Client::builder()
            .timeout(Duration::from_secs(secs))
            .build()
        {
            Ok(client) => self.client = client,
            Err(e) => tracing::warn!(error = %e, "failed to build http client with timeout"),
        }
        self
    }

    pub fn with_max_input_tokens(mut self, max: Option<usize>) -> Self {
        self.max_input_tokens = max;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// 构建 chat/completions 请求体；tools 为空时不带 tools / tool_choice
    pub fn build_request_body(
        &self,
        messages: &[Message],
        system: &[Message],
        tools: &[ToolSchema],
        choice: Option<ToolChoice>,
    ) -> Value {
        let wire: Vec<Value> = system.iter().chain(messages.iter()).map(to_wire).collect();
        let mut body = json!({
            "model": self.model,
            "messages": wire,
        });
        if let (Some(choice), false) = (choice, tools.is_empty()) {
            body["tools"] = Value::Array(tools.iter().map(ToolSchema::to_function_json).collect());
            body["tool_choice"] = Value::String(choice.as_str().to_string());
        }
        body
    }

    /// 解析响应：首个 choice 的 content 与 tool_calls
    pub fn parse_response(body: &Value) -> Result<LlmResponse, LlmError> {
        let message = body
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.get("message"))
            .ok_or_else(|| LlmError::InvalidResponse("missing choices[0].message".to_string()))?;

        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .map(String::from);

        let mut tool_calls = Vec::new();
        if let Some(calls) = message.get("tool_calls").and_then(|t| t.as_array()) {
            for call in calls {
                let call: ToolCall = serde_json::from_value(call.clone()).map_err(|e| {
                    LlmError::InvalidResponse(format!("malformed tool call: {}", e))
                })?;
                tool_calls.push(call);
            }
        }

        Ok(LlmResponse {
            content,
            tool_calls,
        })
    }

    fn check_input_budget(&self, messages: &[Message], system: &[Message]) -> Result<(), LlmError> {
        let Some(max) = self.max_input_tokens else {
            return Ok(());
        };
        let estimated =
            TokenEstimator::estimate_messages(messages) + TokenEstimator::estimate_messages(system);
        if estimated > max {
            return Err(LlmError::TokenLimitExceeded(format!(
                "estimated input tokens {} exceed limit {}",
                estimated, max
            )));
        }
        Ok(())
    }

    async fn send(&self, body: Value) -> Result<Value, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if is_context_length_error(&text) {
                return Err(LlmError::TokenLimitExceeded(text));
            }
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("failed to parse JSON: {}", e)))?;

        if let Some(usage) = body.get("usage") {
            let prompt = usage.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
            let completion = usage
                .get("completion_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            self.usage.add(prompt, completion);
        }
        Ok(body)
    }
}

fn is_context_length_error(body: &str) -> bool {
    body.contains("context_length_exceeded") || body.contains("maximum context length")
}

/// Message -> OpenAI 消息 JSON
fn to_wire(m: &Message) -> Value {
    let mut v = json!({ "role": m.role.as_str() });
    match (&m.base64_image, m.role) {
        (Some(image), Role::User) => {
            v["content"] = json!([
                { "type": "text", "text": m.content },
                { "type": "image_url", "image_url": { "url": format!("data:image/jpeg;base64,{}", image) } },
            ]);
        }
        _ => v["content"] = Value::String(m.content.clone()),
    }
    if !m.tool_calls.is_empty() {
        v["tool_calls"] = serde_json::to_value(&m.tool_calls).unwrap_or(Value::Null);
    }
    if let Some(id) = &m.tool_call_id {
        v["tool_call_id"] = Value::String(id.clone());
    }
    if let (Some(name), Role::Tool) = (&m.name, m.role) {
        v["name"] = Value::String(name.clone());
    }
    v
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn ask(&self, messages: &[Message], system: &[Message]) -> Result<String, LlmError> {
        self.check_input_budget(messages, system)?;
        let body = self.build_request_body(messages, system, &[], None);
        let response = Self::parse_response(&self.send(body).await?)?;
        response
            .content
            .ok_or_else(|| LlmError::InvalidResponse("empty or invalid response from LLM".to_string()))
    }

    async fn ask_tool(
        &self,
        messages: &[Message],
        system: &[Message],
        tools: &[ToolSchema],
        choice: ToolChoice,
    ) -> Result<LlmResponse, LlmError> {
        self.check_input_budget(messages, system)?;
        let body = self.build_request_body(messages, system, tools, Some(choice));
        Self::parse_response(&self.send(body).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> ToolSchema {
        ToolSchema {
            name: "shell_exec".into(),
            description: "Run a command".into(),
            parameters: json!({"type": "object", "properties": {}}),
        }
    }

    #[test]
    fn test_request_body_includes_tools_and_choice() {
        let client = OpenAiClient::new(None, "gpt-4o", Some("test-key"));
        let body = client.build_request_body(
            &[Message::user("hi")],
            &[Message::system("be brief")],
            &[schema()],
            Some(ToolChoice::Required),
        );
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["tools"][0]["function"]["name"], "shell_exec");
        assert_eq!(body["tool_choice"], "required");

        let plain = client.build_request_body(&[Message::user("hi")], &[], &[], None);
        assert!(plain.get("tools").is_none());
    }

    #[test]
    fn test_tool_message_wire_format() {
        let call = ToolCall::new("call_1", "shell_exec", "{\"command\":\"ls\"}");
        let assistant = to_wire(&Message::assistant("thinking").with_tool_calls(vec![call]));
        assert_eq!(assistant["tool_calls"][0]["type"], "function");
        assert_eq!(assistant["tool_calls"][0]["function"]["name"], "shell_exec");

        let tool = to_wire(&Message::tool("ok", "call_1", "shell_exec", None));
        assert_eq!(tool["tool_call_id"], "call_1");
        assert_eq!(tool["name"], "shell_exec");
    }

    #[test]
    fn test_parse_response_with_tool_calls() {
        let body = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "shell_exec", "arguments": "{\"command\":\"ls /tmp\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let resp = OpenAiClient::parse_response(&body).unwrap();
        assert_eq!(resp.content, None);
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].function.name, "shell_exec");

        let err = OpenAiClient::parse_response(&json!({"choices": []})).unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_input_budget_maps_to_token_limit() {
        let client = OpenAiClient::new(Some("http://127.0.0.1:9"), "m", Some("k"))
            .with_max_input_tokens(Some(3));
        let long = "word ".repeat(100);
        let err = client.ask(&[Message::user(long)], &[]).await.unwrap_err();
        assert!(err.is_token_limit());
    }

    #[test]
    fn test_context_length_detection() {
        assert!(is_context_length_error(
            r#"{"error":{"code":"context_length_exceeded"}}"#
        ));
        assert!(!is_context_length_error(r#"{"error":{"code":"rate_limit"}}"#));
    }
}
