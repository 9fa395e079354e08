//! 工具参数 JSON Schema 生成（schemars 自动生成）与参数解析
//!
//! 每个工具用一个 `#[derive(Deserialize, JsonSchema)]` 的参数结构体描述参数，
//! schema 内联子定义并去掉 `$schema` / `title`，直接用于 function calling。

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::tools::ToolError;

/// 生成参数结构体的 JSON Schema
pub fn args_schema<T: JsonSchema>() -> Value {
    let generator = SchemaSettings::draft07()
        .with(|s| {
            s.inline_subschemas = true;
            s.option_add_null_type = false;
        })
        .into_generator();
    let root = generator.into_root_schema_for::<T>();
    let mut value = serde_json::to_value(root).unwrap_or_else(|_| serde_json::json!({"type": "object"}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
        obj.remove("definitions");
    }
    value
}

/// 把 JSON 参数解析为参数结构体；失败时给出可读的错误
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[allow(dead_code)]
    #[derive(Debug, Deserialize, JsonSchema)]
    struct DemoArgs {
        /// 要执行的命令
        command: String,
        #[serde(default)]
        exec_dir: Option<String>,
    }

    #[test]
    fn test_schema_shape() {
        let schema = args_schema::<DemoArgs>();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["command"]["type"], "string");
        assert_eq!(schema["properties"]["command"]["description"], "要执行的命令");
        assert_eq!(schema["required"], serde_json::json!(["command"]));
        assert!(schema.get("$schema").is_none());
        assert!(schema.get("title").is_none());
    }

    #[test]
    fn test_parse_args_reports_missing_field() {
        let err = parse_args::<DemoArgs>(serde_json::json!({})).unwrap_err();
        assert!(err.to_string().contains("command"));
    }
}
