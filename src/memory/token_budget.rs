//! Token 估算（请求前的粗略检查）
//!
//! 不依赖分词器：英文约 4 字符/token，中文约 1.5 字符/token。

use crate::memory::Message;

/// 每条消息的固定开销（角色、分隔符等）
const PER_MESSAGE_OVERHEAD: usize = 4;

/// Token 估算器（简单的字符计数近似）
pub struct TokenEstimator;

impl TokenEstimator {
    /// 估算文本的 token 数量
    pub fn estimate(text: &str) -> usize {
        let mut ascii_chars = 0;
        let mut non_ascii_chars = 0;

        for c in text.chars() {
            if c.is_ascii() {
                ascii_chars += 1;
            } else {
                non_ascii_chars += 1;
            }
        }

        let tokens = ascii_chars / 4 + (non_ascii_chars as f64 / 1.5).ceil() as usize;
        tokens.max(1)
    }

    /// 估算一组消息（含工具调用参数）的 token 总数
    pub fn estimate_messages(messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|m| {
                let calls: usize = m
                    .tool_calls
                    .iter()
                    .map(|c| Self::estimate(&c.function.name) + Self::estimate(&c.function.arguments))
                    .sum();
                Self::estimate(&m.content) + calls + PER_MESSAGE_OVERHEAD
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_ascii_and_cjk() {
        assert_eq!(TokenEstimator::estimate("abcdefgh"), 2);
        assert_eq!(TokenEstimator::estimate("你好世"), 2);
        assert_eq!(TokenEstimator::estimate(""), 1);
    }

    #[test]
    fn test_estimate_messages_counts_overhead() {
        let msgs = vec![Message::user("abcdefgh"), Message::assistant("abcd")];
        assert_eq!(TokenEstimator::estimate_messages(&msgs), 2 + 4 + 1 + 4);
    }
}
