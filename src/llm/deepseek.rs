//! DeepSeek 预设：沿用 OpenAI 兼容客户端，只替换端点、默认模型与密钥来源

use crate::config::LlmSection;
use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// 密钥顺序：配置 > DEEPSEEK_API_KEY > OPENAI_API_KEY；模型未配置时取 DEEPSEEK_MODEL 或 deepseek-chat
pub fn deepseek_client(cfg: &LlmSection) -> OpenAiClient {
    let api_key = cfg
        .api_key
        .clone()
        .or_else(|| std::env::var("DEEPSEEK_API_KEY").ok());
    let model = cfg
        .model
        .clone()
        .or_else(|| std::env::var("DEEPSEEK_MODEL").ok())
        .unwrap_or_else(|| DEEPSEEK_CHAT.to_string());
    let base_url = cfg.base_url.as_deref().unwrap_or(DEEPSEEK_BASE_URL);

    OpenAiClient::new(Some(base_url), &model, api_key.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_model_wins() {
        let cfg = LlmSection {
            provider: "deepseek".into(),
            model: Some("deepseek-reasoner".into()),
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        assert_eq!(deepseek_client(&cfg).model(), "deepseek-reasoner");
    }
}
