//! HTTP transport: the same four operations spoken over the wire to a
//! standalone `blob-server` instance.

use crate::llm::provider::GenerateRequest;
use crate::transport::{ApiError, CompanionApi};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct HttpApi {
    client: Client,
    base_url: String,
}

/// Every endpoint answers with this envelope; `ok: false` carries the
/// error message and an HTTP 500.
#[derive(Debug, Deserialize)]
struct WireReply {
    ok: bool,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl WireReply {
    fn error_message(&self) -> String {
        self.error.clone().unwrap_or_else(|| "unknown error".into())
    }
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<WireReply, ApiError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        response
            .json::<WireReply>()
            .await
            .map_err(|e| ApiError::Transport(format!("bad reply from {}: {}", path, e)))
    }
}

#[async_trait]
impl CompanionApi for HttpApi {
    async fn generate(&self, request: GenerateRequest) -> Result<String, ApiError> {
        let body = serde_json::to_value(&request)
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let reply = self.post_json("/api/llm", &body).await?;
        if reply.ok {
            Ok(reply.text.unwrap_or_default())
        } else {
            Err(ApiError::Generation(reply.error_message()))
        }
    }

    async fn get_memory(&self, key: &str) -> Result<Option<Value>, ApiError> {
        let url = self.url(&format!("/api/memory/{}", urlencoding::encode(key)));
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let reply: WireReply = response
            .json()
            .await
            .map_err(|e| ApiError::Transport(format!("bad reply from memory get: {}", e)))?;
        if reply.ok {
            Ok(reply.value.filter(|v| !v.is_null()))
        } else {
            Err(ApiError::Memory(reply.error_message()))
        }
    }

    async fn set_memory(&self, key: &str, value: Value) -> Result<(), ApiError> {
        let reply = self
            .post_json("/api/memory", &json!({ "key": key, "value": value }))
            .await?;
        if reply.ok {
            Ok(())
        } else {
            Err(ApiError::Memory(reply.error_message()))
        }
    }

    async fn goodbye(&self) -> Result<String, ApiError> {
        let reply = self.post_json("/api/goodbye", &json!({})).await?;
        if reply.ok {
            Ok(reply.text.unwrap_or_default())
        } else {
            Err(ApiError::Generation(reply.error_message()))
        }
    }

    async fn quit(&self) -> Result<(), ApiError> {
        // The server decides whether this actually terminates anything.
        let _ = self.post_json("/api/quit", &json!({})).await?;
        Ok(())
    }
}
