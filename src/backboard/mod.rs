//! HTTP facade for the Backboard assistant service.
//!
//! Conversations live server-side: an assistant (system prompt + tool
//! schema) hosts threads, messages are posted to a thread, and tool outputs
//! are submitted against the thread's active run.

pub mod types;

use reqwest::multipart::Form;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use types::{
    AddMessageRequest, Assistant, CreateAssistantRequest, MessageResponse,
    SubmitToolOutputsRequest, Thread, ToolOutput,
};

/// Error from the assistant service, with the HTTP status when one was
/// received. The message text embeds `(<code>)` for non-2xx responses;
/// retry classification matches on that shape, so it is part of the
/// contract.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub message: String,
    pub status_code: Option<u16>,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        ApiError {
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status_code: u16) -> Self {
        ApiError {
            message: message.into(),
            status_code: Some(status_code),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        // Surface transport timeouts with a marker the retry classifier
        // recognizes.
        if err.is_timeout() {
            ApiError::new(format!("request timeout: {}", err))
        } else {
            ApiError::new(err.to_string())
        }
    }
}

pub struct Client {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl Client {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::new(format!("build http client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        })
    }

    pub async fn create_assistant(
        &self,
        req: &CreateAssistantRequest,
    ) -> Result<Assistant, ApiError> {
        self.post_json("/assistants", req).await
    }

    pub async fn create_thread(&self, assistant_id: &str) -> Result<Thread, ApiError> {
        let path = format!("/assistants/{}/threads", assistant_id);
        self.post_json(&path, &serde_json::json!({})).await
    }

    pub async fn add_message(&self, req: &AddMessageRequest) -> Result<MessageResponse, ApiError> {
        let path = format!("/threads/{}/messages", req.thread_id);

        let mut form = Form::new();
        form = text_field(form, "content", &req.content);
        form = text_field(form, "llm_provider", &req.llm_provider);
        form = text_field(form, "model_name", &req.model_name);
        form = text_field(form, "memory", &req.memory);
        form = text_field(form, "web_search", &req.web_search);
        form = text_field(form, "send_to_llm", default_str(&req.send_to_llm, "true"));
        form = form.text("stream", if req.stream { "true" } else { "false" });
        if !req.metadata_json.is_empty() {
            form = form.text("metadata", req.metadata_json.clone());
        }

        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("X-API-Key", &self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::with_status(
                format!(
                    "backboard add_message failed ({}): {}",
                    status.as_u16(),
                    body
                ),
                status.as_u16(),
            ));
        }

        resp.json::<MessageResponse>()
            .await
            .map_err(|e| ApiError::new(format!("decode add_message response: {}", e)))
    }

    pub async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<MessageResponse, ApiError> {
        let path = format!("/threads/{}/runs/{}/submit-tool-outputs", thread_id, run_id);
        let req = SubmitToolOutputsRequest {
            tool_outputs: outputs,
        };
        self.post_json(&path, &req).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("X-API-Key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::with_status(
                format!(
                    "backboard request POST {} failed ({}): {}",
                    path,
                    status.as_u16(),
                    body
                ),
                status.as_u16(),
            ));
        }

        resp.json::<T>()
            .await
            .map_err(|e| ApiError::new(format!("decode response from {}: {}", path, e)))
    }
}

fn text_field(form: Form, key: &'static str, value: &str) -> Form {
    if value.trim().is_empty() {
        form
    } else {
        form.text(key, value.to_string())
    }
}

fn default_str<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}
