//! Filesystem tools, sandboxed to the workspace root.
//!
//! Every path argument resolves against the workspace root; anything whose
//! cleaned absolute form falls outside the root is rejected before any I/O.

use super::{int_arg, object_schema, str_arg};
use crate::backboard::types::ToolDefinition;
use crate::tools::{ExecutionContext, Tool, ToolError};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

const GREP_MATCH_LIMIT: usize = 100;

/// Resolve `input` against `root`, rejecting escapes. An empty input means
/// the root itself.
pub(crate) fn resolve_path(root: &Path, input: &str) -> Result<PathBuf, ToolError> {
    let input = input.trim();
    let candidate = if input.is_empty() {
        root.to_path_buf()
    } else if Path::new(input).is_absolute() {
        PathBuf::from(input)
    } else {
        root.join(input)
    };

    let root_abs = clean_path(&absolute(root)?);
    let candidate_abs = clean_path(&absolute(&candidate)?);

    if !candidate_abs.starts_with(&root_abs) {
        return Err(ToolError::new(format!(
            "path {} is outside workspace",
            if input.is_empty() { "." } else { input }
        )));
    }
    Ok(candidate_abs)
}

fn absolute(path: &Path) -> Result<PathBuf, ToolError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Lexical cleanup: resolves `.` and `..` components without touching the
/// filesystem, so escapes are caught even for paths that do not exist.
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

pub struct ReadTool;

#[async_trait]
impl Tool for ReadTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "read",
            "Read file contents from the workspace",
            object_schema(
                json!({
                    "path": {"type": "string", "description": "Absolute or workspace-relative file path"},
                    "max_bytes": {"type": "integer", "description": "Optional max bytes to read", "default": 20000},
                }),
                &["path"],
            ),
        )
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, ToolError> {
        let path = resolve_path(&ctx.workspace_root, str_arg(args, "path").unwrap_or(""))?;
        let max_bytes = int_arg(args, "max_bytes", 20000);

        let mut bytes = std::fs::read(&path)?;
        bytes.truncate(max_bytes);
        let content = String::from_utf8_lossy(&bytes).into_owned();

        Ok(json!({"path": path.display().to_string(), "content": content}))
    }
}

pub struct LsTool;

#[async_trait]
impl Tool for LsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "ls",
            "List entries in a directory",
            object_schema(
                json!({
                    "path": {"type": "string", "description": "Directory path. Defaults to workspace root."},
                }),
                &[],
            ),
        )
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, ToolError> {
        let path = resolve_path(&ctx.workspace_root, str_arg(args, "path").unwrap_or(""))?;

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&path)? {
            let entry = entry?;
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_dir() {
                name.push('/');
            }
            entries.push(name);
        }
        entries.sort();

        Ok(json!({"path": path.display().to_string(), "entries": entries}))
    }
}

pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "grep",
            "Search for a regex pattern in files under a path",
            object_schema(
                json!({
                    "pattern": {"type": "string"},
                    "path": {"type": "string", "description": "File or directory path. Defaults to workspace root."},
                }),
                &["pattern"],
            ),
        )
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, ToolError> {
        let pattern = str_arg(args, "pattern").ok_or_else(|| ToolError::new("pattern is required"))?;
        let re = regex::Regex::new(pattern)?;

        let root = resolve_path(&ctx.workspace_root, str_arg(args, "path").unwrap_or(""))?;

        let mut matches = Vec::new();
        let walker = WalkDir::new(&root).into_iter().filter_entry(|entry| {
            !entry.file_type().is_dir()
                || !matches!(
                    entry.file_name().to_str(),
                    Some(".git") | Some("node_modules")
                )
        });

        'walk: for entry in walker {
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_file() {
                continue;
            }
            // Binary or unreadable files are skipped rather than failing
            // the whole search.
            let Ok(text) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            for (idx, line) in text.lines().enumerate() {
                if re.is_match(line) {
                    matches.push(json!({
                        "path": entry.path().display().to_string(),
                        "line": idx + 1,
                        "content": line,
                    }));
                    if matches.len() >= GREP_MATCH_LIMIT {
                        break 'walk;
                    }
                }
            }
        }

        Ok(json!({"pattern": pattern, "matches": matches}))
    }
}

pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "glob",
            "Find files matching a glob pattern",
            object_schema(
                json!({
                    "pattern": {"type": "string"},
                    "path": {"type": "string", "description": "Base path. Defaults to workspace root."},
                }),
                &["pattern"],
            ),
        )
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, ToolError> {
        let pattern = str_arg(args, "pattern").ok_or_else(|| ToolError::new("pattern is required"))?;
        let base = resolve_path(&ctx.workspace_root, str_arg(args, "path").unwrap_or(""))?;

        let full_pattern = if Path::new(pattern).is_absolute() {
            pattern.to_string()
        } else {
            base.join(pattern).display().to_string()
        };

        let mut matches = Vec::new();
        for entry in glob::glob(&full_pattern)? {
            if let Ok(path) = entry {
                matches.push(path.display().to_string());
            }
        }

        Ok(json!({"pattern": full_pattern, "matches": matches}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TodoStore;
    use std::sync::Arc;

    fn ctx(root: &Path) -> ExecutionContext {
        ExecutionContext::new(root, Arc::new(TodoStore::new()))
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn read_rejects_paths_outside_workspace() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ReadTool
            .execute(&args(json!({"path": "../../etc/passwd"})), &ctx(tmp.path()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("outside workspace"));
    }

    #[tokio::test]
    async fn read_truncates_to_max_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("big.txt"), "a".repeat(500)).unwrap();

        let result = ReadTool
            .execute(
                &args(json!({"path": "big.txt", "max_bytes": 100})),
                &ctx(tmp.path()),
            )
            .await
            .unwrap();
        assert_eq!(result["content"].as_str().unwrap().len(), 100);

        // A file smaller than the cap comes back whole.
        let result = ReadTool
            .execute(
                &args(json!({"path": "big.txt", "max_bytes": 10000})),
                &ctx(tmp.path()),
            )
            .await
            .unwrap();
        assert_eq!(result["content"].as_str().unwrap().len(), 500);
    }

    #[tokio::test]
    async fn ls_sorts_and_marks_directories() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("b.txt"), "b").unwrap();
        std::fs::write(tmp.path().join("a.txt"), "a").unwrap();

        let result = LsTool.execute(&args(json!({})), &ctx(tmp.path())).await.unwrap();
        let entries: Vec<String> =
            serde_json::from_value(result["entries"].clone()).unwrap();
        assert_eq!(entries, vec!["a.txt", "b.txt", "sub/"]);
    }

    #[tokio::test]
    async fn grep_stops_at_match_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let lines = (0..150)
            .map(|i| format!("needle {}", i))
            .collect::<Vec<_>>()
            .join("\n");
        std::fs::write(tmp.path().join("hay.txt"), lines).unwrap();

        let result = GrepTool
            .execute(&args(json!({"pattern": "needle"})), &ctx(tmp.path()))
            .await
            .unwrap();
        assert_eq!(result["matches"].as_array().unwrap().len(), GREP_MATCH_LIMIT);
    }

    #[tokio::test]
    async fn grep_skips_git_and_node_modules() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join(".git")).unwrap();
        std::fs::write(tmp.path().join(".git/needle.txt"), "needle").unwrap();
        std::fs::write(tmp.path().join("visible.txt"), "needle").unwrap();

        let result = GrepTool
            .execute(&args(json!({"pattern": "needle"})), &ctx(tmp.path()))
            .await
            .unwrap();
        let matches = result["matches"].as_array().unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0]["path"].as_str().unwrap().contains("visible.txt"));
    }

    #[tokio::test]
    async fn glob_matches_under_base() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("one.rs"), "").unwrap();
        std::fs::write(tmp.path().join("two.txt"), "").unwrap();

        let result = GlobTool
            .execute(&args(json!({"pattern": "*.rs"})), &ctx(tmp.path()))
            .await
            .unwrap();
        let matches = result["matches"].as_array().unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].as_str().unwrap().ends_with("one.rs"));
    }

    #[test]
    fn clean_path_resolves_dotdot() {
        let cleaned = clean_path(Path::new("/work/root/../outside"));
        assert_eq!(cleaned, PathBuf::from("/work/outside"));
    }
}
