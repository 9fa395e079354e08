//! 工具执行结果与错误
//!
//! 每次工具分发的结果都被归一化为 [`ToolResult`]：输出、错误、图片、带外系统信号。

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::session::{BrowserError, ShellError};

/// 带外系统信号
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemSignal {
    /// 需要等待用户输入，Agent 挂起
    AwaitingUserInput,
}

/// 工具结果；所有字段为空时视为空结果
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub output: Option<Value>,
    pub error: Option<String>,
    pub base64_image: Option<String>,
    pub system: Option<SystemSignal>,
}

/// 两个结果中都存在且不可拼接的字段
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot combine tool results: conflicting {field}")]
pub struct CombineError {
    pub field: &'static str,
}

impl ToolResult {
    pub fn success(output: impl Into<Value>) -> Self {
        Self {
            output: Some(output.into()),
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// 输出 + 等待用户输入信号
    pub fn awaiting_input(output: impl Into<Value>) -> Self {
        Self {
            output: Some(output.into()),
            system: Some(SystemSignal::AwaitingUserInput),
            ..Self::default()
        }
    }

    pub fn with_image(mut self, base64_image: impl Into<String>) -> Self {
        self.base64_image = Some(base64_image.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
    }

    pub fn is_awaiting_input(&self) -> bool {
        self.system == Some(SystemSignal::AwaitingUserInput)
    }

    /// 所有字段为空（None、空字符串、空数组、null）
    pub fn is_empty(&self) -> bool {
        self.output.as_ref().map_or(true, value_is_empty)
            && self.error.as_deref().map_or(true, str::is_empty)
            && self.base64_image.as_deref().map_or(true, str::is_empty)
            && self.system.is_none()
    }

    /// 输出的文本形式（字符串原样，其余 JSON 序列化）
    pub fn output_text(&self) -> String {
        match &self.output {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// 合并两个结果：文本与错误拼接，数组连接；图片与其它不可拼接的输出冲突时报错
    pub fn combine(self, other: ToolResult) -> Result<ToolResult, CombineError> {
        Ok(ToolResult {
            output: combine_output(self.output, other.output)?,
            error: combine_text(self.error, other.error),
            base64_image: match (self.base64_image, other.base64_image) {
                (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => {
                    return Err(CombineError { field: "base64_image" })
                }
                (a, b) => pick(a, b),
            },
            system: match (self.system, other.system) {
                (Some(a), Some(b)) if a != b => return Err(CombineError { field: "system" }),
                (a, b) => a.or(b),
            },
        })
    }
}

fn value_is_empty(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn pick(a: Option<String>, b: Option<String>) -> Option<String> {
    if a.as_deref().is_some_and(|s| !s.is_empty()) {
        a
    } else {
        b.or(a)
    }
}

fn combine_text(a: Option<String>, b: Option<String>) -> Option<String> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a + &b),
        (a, b) => a.or(b),
    }
}

fn combine_output(a: Option<Value>, b: Option<Value>) -> Result<Option<Value>, CombineError> {
    match (a, b) {
        (Some(a), Some(b)) if !value_is_empty(&a) && !value_is_empty(&b) => match (a, b) {
            (Value::String(a), Value::String(b)) => Ok(Some(Value::String(a + &b))),
            (Value::Array(mut a), Value::Array(b)) => {
                a.extend(b);
                Ok(Some(Value::Array(a)))
            }
            _ => Err(CombineError { field: "output" }),
        },
        (Some(a), _) if !value_is_empty(&a) => Ok(Some(a)),
        (a, b) => Ok(b.or(a)),
    }
}

impl fmt::Display for ToolResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(e) if !e.is_empty() => write!(f, "Error: {}", e),
            _ => f.write_str(&self.output_text()),
        }
    }
}

impl From<String> for ToolResult {
    fn from(s: String) -> Self {
        ToolResult::success(s)
    }
}

impl From<&str> for ToolResult {
    fn from(s: &str) -> Self {
        ToolResult::success(s)
    }
}

impl From<Value> for ToolResult {
    fn from(v: Value) -> Self {
        ToolResult::success(v)
    }
}

/// 工具体内部错误；由 ToolCollection 转为失败结果，不会越过注册表
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Execution(String),

    #[error(transparent)]
    Shell(#[from] ShellError),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ToolError {
    fn from(e: serde_json::Error) -> Self {
        ToolError::InvalidArguments(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_concatenates_errors_and_text() {
        let a = ToolResult {
            output: Some("foo".into()),
            error: Some("e1".into()),
            ..Default::default()
        };
        let b = ToolResult {
            output: Some("bar".into()),
            error: Some("e2".into()),
            ..Default::default()
        };
        let c = a.combine(b).unwrap();
        assert_eq!(c.output_text(), "foobar");
        assert_eq!(c.error.as_deref(), Some("e1e2"));
    }

    #[test]
    fn test_combine_rejects_two_images() {
        let a = ToolResult::success("x").with_image("aaaa");
        let b = ToolResult::success("y").with_image("bbbb");
        let err = a.combine(b).unwrap_err();
        assert_eq!(err.field, "base64_image");

        let one = ToolResult::success("x").with_image("aaaa");
        let c = one.combine(ToolResult::success("y")).unwrap();
        assert_eq!(c.base64_image.as_deref(), Some("aaaa"));
    }

    #[test]
    fn test_combine_rejects_mixed_output_shapes() {
        let a = ToolResult::success(serde_json::json!({"k": 1}));
        let b = ToolResult::success("text");
        assert!(a.combine(b).is_err());

        let a = ToolResult::success(serde_json::json!([1]));
        let b = ToolResult::success(serde_json::json!([2, 3]));
        assert_eq!(a.combine(b).unwrap().output, Some(serde_json::json!([1, 2, 3])));
    }

    #[test]
    fn test_empty_and_display() {
        assert!(ToolResult::default().is_empty());
        assert!(ToolResult::success("").is_empty());
        assert!(!ToolResult::failure("boom").is_empty());
        assert_eq!(ToolResult::failure("boom").to_string(), "Error: boom");
        assert_eq!(ToolResult::success("ok").to_string(), "ok");
        assert_eq!(ToolResult::success(serde_json::json!({"a": 1})).to_string(), r#"{"a":1}"#);
        assert!(ToolResult::awaiting_input("q").is_awaiting_input());
    }
}
