//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use deepseek::{deepseek_client, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT};
pub use mock::{MockLlmClient, RecordedToolRequest};
pub use openai::{OpenAiClient, TokenUsage, DEFAULT_OPENAI_MODEL, OPENAI_BASE_URL};
pub use traits::{LlmClient, LlmError, LlmResponse, ToolChoice, ToolSchema};

use crate::config::LlmSection;

/// 按 [llm] 配置创建客户端：openai / deepseek / mock
pub fn create_client_from_config(cfg: &LlmSection) -> Arc<dyn LlmClient> {
    match cfg.provider.to_lowercase().as_str() {
        "mock" => Arc::new(MockLlmClient::new()),
        "deepseek" => Arc::new(
            deepseek_client(cfg)
                .with_timeout(cfg.request_timeout_secs)
                .with_max_input_tokens(cfg.max_input_tokens),
        ),
        other => {
            if other != "openai" {
                tracing::warn!(provider = %other, "unknown llm provider, falling back to openai");
            }
            let model = cfg.model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL);
            Arc::new(
                OpenAiClient::new(cfg.base_url.as_deref(), model, cfg.api_key.as_deref())
                    .with_timeout(cfg.request_timeout_secs)
                    .with_max_input_tokens(cfg.max_input_tokens),
            )
        }
    }
}
