//! Text-generation seam — common interface for generation backends.
//!
//! The engine and both transports talk to this trait, never to a concrete
//! client, so tests can swap in a scripted backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One generation request: the task plus the persona context the caller
/// is responsible for (everything else is assembled backend-side).
/// Persona fields are optional on the wire and fall back to a bland
/// default persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default = "default_mood")]
    pub mood: String,
    #[serde(default = "default_nickname")]
    pub nickname: String,
    #[serde(default)]
    pub inside_jokes: Vec<String>,
}

fn default_mood() -> String {
    "happy".to_string()
}

fn default_nickname() -> String {
    crate::memory::profile::DEFAULT_NICKNAME.to_string()
}

#[derive(Debug, Error)]
pub enum GenerateError {
    /// No credential was configured. Fails closed on first use.
    #[error("missing API key for the generation backend")]
    MissingCredential,
    /// The request never produced a usable HTTP response.
    #[error("request failed: {0}")]
    Network(String),
    /// The backend answered with a non-success status.
    #[error("API error: {0}")]
    Api(String),
    #[error("empty response from the model")]
    EmptyResponse,
}

/// A backend that turns a request into one short line of text.
/// Implementations do not retry; a failure is the caller's to absorb.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, GenerateError>;
}
