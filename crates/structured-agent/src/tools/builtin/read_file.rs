//! File read tool

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::tools::{truncate_output, ParameterProperty, ParameterSchema, Tool, ToolError};

const DEFAULT_MAX_OUTPUT_LEN: usize = 50_000;

/// Tool for reading text files below a root directory
pub struct ReadFileTool {
    root: PathBuf,
    max_output_len: usize,
}

impl ReadFileTool {
    /// Confine reads to `root`; fails if the directory does not exist
    pub fn new(root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = root
            .as_ref()
            .canonicalize()
            .with_context(|| format!("Cannot resolve read root {}", root.as_ref().display()))?;

        if !root.is_dir() {
            anyhow::bail!("Read root is not a directory: {}", root.display());
        }

        Ok(Self {
            root,
            max_output_len: DEFAULT_MAX_OUTPUT_LEN,
        })
    }

    pub fn with_max_output_len(mut self, max: usize) -> Self {
        self.max_output_len = max;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path_str: &str) -> Result<PathBuf, ToolError> {
        let candidate = if Path::new(path_str).is_absolute() {
            PathBuf::from(path_str)
        } else {
            self.root.join(path_str)
        };

        let path = candidate
            .canonicalize()
            .map_err(|_| anyhow!("File not found: {}", path_str))?;

        if !path.starts_with(&self.root) {
            return Err(anyhow!("Path is outside the readable directory: {}", path_str).into());
        }
        if !path.is_file() {
            return Err(anyhow!("Not a file: {}", path_str).into());
        }

        Ok(path)
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file. Paths are relative to the readable directory. Returns numbered lines."
    }

    fn parameters_schema(&self) -> ParameterSchema {
        ParameterSchema::new()
            .with_required("path", ParameterProperty::string("The path of the file to read"))
            .with_property(
                "offset",
                ParameterProperty::integer("Line number to start reading from (1-indexed, default: 1)")
                    .with_minimum(1)
                    .with_default(Value::Number(1.into())),
            )
            .with_property(
                "limit",
                ParameterProperty::integer("Maximum number of lines to read (default: unlimited)").with_minimum(1),
            )
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let path_str = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::MissingParameter("path".to_string()))?;

        let offset = args
            .get("offset")
            .and_then(|v| v.as_u64())
            .map(|v| v.saturating_sub(1) as usize)
            .unwrap_or(0);

        let limit = args.get("limit").and_then(|v| v.as_u64()).map(|v| v as usize);

        let path = self.resolve(path_str)?;

        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read file {}", path_str))?;

        let lines: Vec<&str> = content.lines().collect();
        let total_lines = lines.len();

        let selected_lines: Vec<_> = lines
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .enumerate()
            .map(|(i, line)| format!("{:>6}\t{}", offset + i + 1, line))
            .collect();

        let output = if selected_lines.is_empty() {
            format!(
                "File is empty or offset {} exceeds file length ({} lines)",
                offset + 1,
                total_lines
            )
        } else {
            let header = format!("File: {} ({} lines total)\n", path_str, total_lines);
            header + &selected_lines.join("\n")
        };

        Ok(Value::String(truncate_output(output, self.max_output_len)))
    }
}
