//! 文件工具：file_read / file_write / file_str_replace / file_find_by_name / file_find_in_content
//!
//! 所有路径必须是绝对路径；读取与替换会把完整内容推送到编辑器视图（code_editor 事件）。

use std::path::Path;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::react::{language_for_path, AgentEvent};
use crate::tools::schema::{args_schema, parse_args};
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

fn require_absolute(path: &str) -> Result<&Path, ToolError> {
    let p = Path::new(path);
    if p.is_absolute() {
        Ok(p)
    } else {
        Err(ToolError::Execution(format!(
            "Path '{}' is not an absolute path.",
            path
        )))
    }
}

fn emit_editor(ctx: &ToolContext, file: &str, content: String) {
    ctx.events.emit(AgentEvent::CodeEditor {
        content,
        language: language_for_path(file).to_string(),
    });
}

fn report_failure(ctx: &ToolContext, message: String) -> ToolError {
    ctx.events.emit(AgentEvent::Chat {
        content: format!("⚠️ File error: {}", message),
    });
    ToolError::Execution(message)
}

#[derive(Deserialize, JsonSchema)]
struct ReadArgs {
    /// Absolute path of the file to read
    file: String,
    /// (Optional) Starting line to read from, 1-based
    #[serde(default)]
    start_line: Option<usize>,
    /// (Optional) Ending line number (inclusive)
    #[serde(default)]
    end_line: Option<usize>,
}

pub struct FileReadTool;

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read file content. Use for checking file contents, analyzing logs, or reading configuration files."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<ReadArgs>()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let args: ReadArgs = parse_args(args)?;
        let path = require_absolute(&args.file)?;
        if !path.exists() {
            return Err(ToolError::Execution(format!("File not found at: {}", args.file)));
        }
        if !path.is_file() {
            return Err(ToolError::Execution(format!(
                "Path is a directory, not a file: {}",
                args.file
            )));
        }
        if let (Some(start), Some(end)) = (args.start_line, args.end_line) {
            if start > end {
                return Err(ToolError::Execution(
                    "start_line cannot be greater than end_line.".to_string(),
                ));
            }
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| report_failure(ctx, format!("Failed to read file '{}': {}", args.file, e)))?;

        let start = args.start_line.unwrap_or(1).max(1);
        let numbered: Vec<String> = content
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line))
            .filter(|(n, _)| *n >= start && args.end_line.map_or(true, |end| *n <= end))
            .map(|(n, line)| format!("{:6}\t{}", n, line.trim_end()))
            .collect();

        emit_editor(ctx, &args.file, content);
        Ok(ToolResult::success(numbered.join("\n")))
    }
}

#[derive(Deserialize, JsonSchema)]
struct WriteArgs {
    /// Absolute path of the file to write to
    file: String,
    /// Text content to write
    content: String,
    /// (Optional) Whether to use append mode. Defaults to false.
    #[serde(default)]
    append: bool,
}

pub struct FileWriteTool;

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Overwrite or append content to a file. Use for creating new files, appending content, or modifying existing files."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<WriteArgs>()
    }

    async fn execute(&self, _ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let args: WriteArgs = parse_args(args)?;
        let path = require_absolute(&args.file)?;
        let fail = |e: std::io::Error| {
            ToolError::Execution(format!("Failed to write to file '{}': {}", args.file, e))
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(fail)?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(args.append)
            .truncate(!args.append)
            .open(path)
            .await
            .map_err(fail)?;
        file.write_all(args.content.as_bytes()).await.map_err(fail)?;
        file.flush().await.map_err(fail)?;

        let action = if args.append { "appended to" } else { "written to" };
        Ok(ToolResult::success(format!(
            "Successfully {} file: {}",
            action, args.file
        )))
    }
}

#[derive(Deserialize, JsonSchema)]
struct ReplaceArgs {
    /// Absolute path of the file to perform replacement on
    file: String,
    /// Original string to be replaced
    old_str: String,
    /// New string to replace with
    new_str: String,
}

pub struct FileStrReplaceTool;

#[async_trait]
impl Tool for FileStrReplaceTool {
    fn name(&self) -> &str {
        "file_str_replace"
    }

    fn description(&self) -> &str {
        "Replace specified string in a file. Use for updating specific content in files or fixing errors in code."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<ReplaceArgs>()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let args: ReplaceArgs = parse_args(args)?;
        let path = require_absolute(&args.file)?;
        if !path.exists() {
            return Err(ToolError::Execution(format!("File not found at: {}", args.file)));
        }
        let fail = |e: std::io::Error| {
            report_failure(
                ctx,
                format!("Failed to perform string replacement in '{}': {}", args.file, e),
            )
        };
        let content = tokio::fs::read_to_string(path).await.map_err(fail)?;
        let updated = content.replace(&args.old_str, &args.new_str);
        tokio::fs::write(path, &updated).await.map_err(fail)?;

        emit_editor(ctx, &args.file, updated);
        Ok(ToolResult::success(format!(
            "Successfully replaced string in file: {}",
            args.file
        )))
    }
}

#[derive(Deserialize, JsonSchema)]
struct FindByNameArgs {
    /// Absolute path of directory to search
    path: String,
    /// Filename pattern using glob syntax wildcards
    glob: String,
}

pub struct FileFindByNameTool;

#[async_trait]
impl Tool for FileFindByNameTool {
    fn name(&self) -> &str {
        "file_find_by_name"
    }

    fn description(&self) -> &str {
        "Finds files by a filename pattern (using glob syntax) within a specified directory."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<FindByNameArgs>()
    }

    async fn execute(&self, _ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let args: FindByNameArgs = parse_args(args)?;
        let dir = require_absolute(&args.path)?;
        if !dir.is_dir() {
            return Err(ToolError::Execution(format!(
                "Directory not found at: {}",
                args.path
            )));
        }

        let full = dir.join(&args.glob);
        let pattern = full.to_string_lossy();
        let paths = glob::glob(&pattern).map_err(|e| {
            ToolError::Execution(format!(
                "Failed to find files in '{}' with pattern '{}': {}",
                args.path, args.glob, e
            ))
        })?;
        let mut matches: Vec<String> = paths
            .filter_map(Result::ok)
            .map(|p| p.display().to_string())
            .collect();
        matches.sort();

        if matches.is_empty() {
            return Ok(ToolResult::success(format!(
                "No files found matching '{}' in '{}'.",
                args.glob, args.path
            )));
        }
        Ok(ToolResult::success(matches.join("\n")))
    }
}

#[derive(Deserialize, JsonSchema)]
struct FindInContentArgs {
    /// Absolute path of the file to search within
    file: String,
    /// Regular expression pattern to match
    regex: String,
}

pub struct FileFindInContentTool;

#[async_trait]
impl Tool for FileFindInContentTool {
    fn name(&self) -> &str {
        "file_find_in_content"
    }

    fn description(&self) -> &str {
        "Searches for matching text within a file using a regular expression pattern."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<FindInContentArgs>()
    }

    async fn execute(&self, _ctx: &ToolContext, args: Value) -> Result<ToolResult, ToolError> {
        let args: FindInContentArgs = parse_args(args)?;
        let path = require_absolute(&args.file)?;
        if !path.is_file() {
            return Err(ToolError::Execution(format!("File not found at: {}", args.file)));
        }
        let pattern = regex::Regex::new(&args.regex)
            .map_err(|e| ToolError::Execution(format!("Invalid regular expression: {}", e)))?;

        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ToolError::Execution(format!("Failed to search in file '{}': {}", args.file, e))
        })?;
        let content = String::from_utf8_lossy(&bytes);
        let found: Vec<String> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| pattern.is_match(line))
            .map(|(i, line)| format!("{:6}: {}", i + 1, line.trim()))
            .collect();

        if found.is_empty() {
            return Ok(ToolResult::success(format!(
                "No matches found for regex '{}' in file '{}'.",
                args.regex, args.file
            )));
        }
        Ok(ToolResult::success(found.join("\n")))
    }
}
