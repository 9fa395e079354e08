//! 共享草稿板：一次编排运行内所有 Agent 共用的有序键值空间
//!
//! 克隆得到的是同一份数据的引用。单次 set / get 是原子的，但不提供多步原子更新，
//! 调用方只应用它做追加/覆盖式的信息传递；并发的多次编排必须各自持有独立实例。

use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value};

/// 日志中值预览的最大字符数
const LOG_PREVIEW_CHARS: usize = 100;
/// Display 中每个值的最大字符数
const DISPLAY_VALUE_CHARS: usize = 200;

#[derive(Clone, Debug, Default)]
pub struct Scratchpad {
    data: Arc<RwLock<Map<String, Value>>>,
}

impl Scratchpad {
    pub fn new() -> Self {
        tracing::info!("scratchpad initialized");
        Self::default()
    }

    /// 以用户原始输入作为初始内容（键 `user_request`）
    pub fn with_user_request(input: impl Into<String>) -> Self {
        let pad = Self::new();
        pad.write_guard()
            .insert("user_request".to_string(), Value::String(input.into()));
        pad
    }

    /// 写入或覆盖
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        tracing::info!(key = %key, value = %preview(&value, LOG_PREVIEW_CHARS), "scratchpad set");
        self.write_guard().insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let value = self.read_guard().get(key).cloned();
        tracing::info!(
            key = %key,
            value = %value.as_ref().map(|v| preview(v, LOG_PREVIEW_CHARS)).unwrap_or_default(),
            "scratchpad get"
        );
        value
    }

    /// 返回全部内容的副本（保持插入顺序）
    pub fn get_all(&self) -> Map<String, Value> {
        self.read_guard().clone()
    }

    pub fn len(&self) -> usize {
        self.read_guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_guard().is_empty()
    }

    /// 两个句柄是否指向同一块草稿板
    pub fn same_as(&self, other: &Scratchpad) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    // 单个写者 panic 不应让整个草稿板不可用
    fn read_guard(&self) -> RwLockReadGuard<'_, Map<String, Value>> {
        match self.data.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Map<String, Value>> {
        match self.data.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn preview(value: &Value, max_chars: usize) -> String {
    let s = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s
    }
}

impl fmt::Display for Scratchpad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.read_guard();
        if data.is_empty() {
            return f.write_str("Scratchpad is empty.");
        }
        writeln!(f, "--- SCRATCHPAD CONTENT ---")?;
        for (key, value) in data.iter() {
            writeln!(f, "  - {}: {}", key, preview(value, DISPLAY_VALUE_CHARS))?;
        }
        f.write_str("--------------------------")
    }
}
