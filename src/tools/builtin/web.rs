//! Web retrieval tools backed by the Jina endpoints: SERP search and
//! page-to-markdown fetching. Both authenticate with `JINA_API_KEY` and cap
//! response size, flagging truncation.

use super::{int_arg, object_schema, str_arg};
use crate::backboard::types::ToolDefinition;
use crate::http::shared_client;
use crate::tools::{ExecutionContext, Tool, ToolError};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::{json, Map, Value};
use std::time::Duration;

const ERROR_PREVIEW_LIMIT: usize = 220;

pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "websearch",
            "Search the web using Jina and return SERP content",
            object_schema(
                json!({
                    "query": {"type": "string"},
                    "max_bytes": {"type": "integer", "description": "Optional max bytes to return", "default": 30000},
                }),
                &["query"],
            ),
        )
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, ToolError> {
        let query = str_arg(args, "query").ok_or_else(|| ToolError::new("query is required"))?;
        if ctx.jina_api_key.trim().is_empty() {
            return Err(ToolError::new("JINA_API_KEY is required for websearch"));
        }

        let max_bytes = int_arg(args, "max_bytes", 30000);
        let endpoint = Url::parse_with_params("https://s.jina.ai/", &[("q", query)])
            .map_err(|e| ToolError::new(format!("build search url: {}", e)))?;

        let (content, status_code, truncated) = jina_request(
            endpoint.as_str(),
            &ctx.jina_api_key,
            ctx.request_timeout,
            &[("X-Respond-With", "no-content")],
            max_bytes,
        )
        .await?;

        Ok(json!({
            "query": query,
            "status_code": status_code,
            "content": content,
            "truncated": truncated,
        }))
    }
}

pub struct WebFetchTool;

#[async_trait]
impl Tool for WebFetchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "web_fetch",
            "Fetch a web page through Jina Reader and return markdown",
            object_schema(
                json!({
                    "url": {"type": "string", "description": "HTTP(S) URL to fetch"},
                    "max_bytes": {"type": "integer", "description": "Optional max bytes to return", "default": 40000},
                }),
                &["url"],
            ),
        )
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, ToolError> {
        let raw_url = str_arg(args, "url").ok_or_else(|| ToolError::new("url is required"))?;
        if ctx.jina_api_key.trim().is_empty() {
            return Err(ToolError::new("JINA_API_KEY is required for web_fetch"));
        }
        validate_http_url(raw_url)?;

        let max_bytes = int_arg(args, "max_bytes", 40000);
        let endpoint = format!("https://r.jina.ai/{}", raw_url);

        let (markdown, status_code, truncated) = jina_request(
            &endpoint,
            &ctx.jina_api_key,
            ctx.request_timeout,
            &[],
            max_bytes,
        )
        .await?;

        Ok(json!({
            "url": raw_url,
            "status_code": status_code,
            "markdown": markdown,
            "truncated": truncated,
        }))
    }
}

/// Bearer-authenticated GET with a byte cap. Reads just past the cap so the
/// truncation flag is accurate, then trims.
async fn jina_request(
    endpoint: &str,
    api_key: &str,
    timeout: Duration,
    extra_headers: &[(&str, &str)],
    max_bytes: usize,
) -> Result<(String, u16, bool), ToolError> {
    let timeout = if timeout.is_zero() {
        Duration::from_secs(60)
    } else {
        timeout
    };
    let max_bytes = if max_bytes == 0 { 20000 } else { max_bytes };

    let mut request = shared_client()
        .get(endpoint)
        .timeout(timeout)
        .header("Authorization", format!("Bearer {}", api_key));
    for (key, value) in extra_headers {
        request = request.header(*key, *value);
    }

    let mut resp = request
        .send()
        .await
        .map_err(|e| ToolError::new(e.to_string()))?;
    let status_code = resp.status().as_u16();

    let mut body: Vec<u8> = Vec::new();
    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|e| ToolError::new(e.to_string()))?
    {
        body.extend_from_slice(&chunk);
        if body.len() > max_bytes {
            break;
        }
    }

    let truncated = body.len() > max_bytes;
    if truncated {
        body.truncate(max_bytes);
    }
    let content = String::from_utf8_lossy(&body).into_owned();

    if !(200..300).contains(&status_code) {
        let preview: String = if content.chars().count() > ERROR_PREVIEW_LIMIT {
            let mut p: String = content.chars().take(ERROR_PREVIEW_LIMIT).collect();
            p.push_str("...");
            p
        } else {
            content
        };
        return Err(ToolError::new(format!(
            "jina request failed ({}): {}",
            status_code, preview
        )));
    }

    Ok((content, status_code, truncated))
}

fn validate_http_url(raw: &str) -> Result<(), ToolError> {
    let url = Url::parse(raw).map_err(|e| ToolError::new(format!("invalid url: {}", e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ToolError::new("url must start with http:// or https://"));
    }
    if url.host_str().map(str::trim).unwrap_or("").is_empty() {
        return Err(ToolError::new("url host is required"));
    }
    Ok(())
}
