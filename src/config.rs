//! Environment-driven configuration.
//!
//! A `.env` file in the working directory is loaded by `main` before this
//! runs; real environment variables always take precedence over it.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub backboard_api_key: String,
    pub base_url: String,
    pub llm_provider: String,
    pub model_name: String,
    pub memory_mode: String,
    pub web_search_mode: String,
    pub server_addr: String,
    pub server_url: String,
    pub workspace_root: PathBuf,
    pub request_timeout: Duration,
    pub max_subagents: usize,
    pub max_iterations: usize,
    pub max_orch_rounds: usize,
    pub jina_api_key: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let cfg = Config {
            backboard_api_key: env_trimmed("BACKBOARD_API_KEY"),
            base_url: env_default("BACKBOARD_BASE_URL", "https://app.backboard.io/api"),
            llm_provider: env_default("BACKBOARD_LLM_PROVIDER", "openai"),
            model_name: env_default("BACKBOARD_MODEL_NAME", "gpt-4o"),
            memory_mode: env_default("BACKBOARD_MEMORY_MODE", "Auto"),
            web_search_mode: env_default("BACKBOARD_WEB_SEARCH_MODE", "off"),
            server_addr: env_default("WUVO_SERVER_ADDR", ":8080"),
            server_url: env_default("WUVO_SERVER_URL", "http://127.0.0.1:8080"),
            workspace_root: workspace_root(),
            request_timeout: duration_default("WUVO_REQUEST_TIMEOUT", Duration::from_secs(120)),
            max_subagents: int_default("WUVO_MAX_SUBAGENTS", 4),
            max_iterations: int_default("WUVO_MAX_ITERATIONS", 24),
            max_orch_rounds: int_default("WUVO_MAX_ORCH_ROUNDS", 3),
            jina_api_key: env_trimmed("JINA_API_KEY"),
        };

        if cfg.backboard_api_key.is_empty() {
            return Err("missing BACKBOARD_API_KEY".to_string());
        }

        Ok(cfg)
    }

    /// Address usable by the HTTP listener. `WUVO_SERVER_ADDR` may be given
    /// in the `:8080` shorthand, which binds every interface.
    pub fn bind_addr(&self) -> String {
        if self.server_addr.starts_with(':') {
            format!("0.0.0.0{}", self.server_addr)
        } else {
            self.server_addr.clone()
        }
    }
}

fn env_trimmed(key: &str) -> String {
    env::var(key).unwrap_or_default().trim().to_string()
}

fn env_default(key: &str, fallback: &str) -> String {
    let v = env_trimmed(key);
    if v.is_empty() {
        fallback.to_string()
    } else {
        v
    }
}

fn int_default(key: &str, fallback: usize) -> usize {
    match env_trimmed(key).parse::<usize>() {
        Ok(n) if n > 0 => n,
        _ => fallback,
    }
}

fn duration_default(key: &str, fallback: Duration) -> Duration {
    match parse_duration(&env_trimmed(key)) {
        Some(d) if !d.is_zero() => d,
        _ => fallback,
    }
}

/// Accepts plain seconds (`120`), `120s`, `500ms`, or `2m`.
fn parse_duration(v: &str) -> Option<Duration> {
    let v = v.trim();
    if v.is_empty() {
        return None;
    }
    if let Ok(secs) = v.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if let Some(ms) = v.strip_suffix("ms") {
        return ms.trim().parse::<u64>().ok().map(Duration::from_millis);
    }
    if let Some(secs) = v.strip_suffix('s') {
        return secs.trim().parse::<u64>().ok().map(Duration::from_secs);
    }
    if let Some(mins) = v.strip_suffix('m') {
        return mins
            .trim()
            .parse::<u64>()
            .ok()
            .map(|m| Duration::from_secs(m * 60));
    }
    None
}

fn workspace_root() -> PathBuf {
    let v = env_trimmed("WUVO_WORKSPACE_ROOT");
    if !v.is_empty() {
        return PathBuf::from(v);
    }
    let wd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    // Running from the backend subdirectory sandboxes tools to the repo root.
    if wd.file_name().and_then(|n| n.to_str()) == Some("be") {
        if let Some(parent) = wd.parent() {
            return parent.to_path_buf();
        }
    }
    wd
}
