//! Transport seam between the engagement engine and its collaborators.
//!
//! The engine only ever sees `CompanionApi`; whether the calls stay
//! in-process or cross the wire is decided once, at construction.

pub mod direct;
pub mod http;
pub mod server;


pub use direct::DirectApi;
pub use http::HttpApi;
pub use server::ApiServer;

use crate::llm::provider::{GenerateError, GenerateRequest};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Fixed prompt for the farewell line requested at shutdown.
pub(crate) const FAREWELL_PROMPT: &str =
    "Dramatic but sweet goodbye line for when the app is closing.";
pub(crate) const FAREWELL_MOOD: &str = "dramatic";

#[derive(Debug, Error)]
pub enum ApiError {
    /// The generation backend answered but could not produce a line.
    #[error("{0}")]
    Generation(String),
    /// The call never completed (connection refused, timeout, bad wire data).
    #[error("{0}")]
    Transport(String),
    /// A memory operation was rejected by the remote side.
    #[error("memory error: {0}")]
    Memory(String),
}

impl From<GenerateError> for ApiError {
    fn from(e: GenerateError) -> Self {
        match e {
            GenerateError::Network(msg) => ApiError::Transport(msg),
            other => ApiError::Generation(other.to_string()),
        }
    }
}

/// The four operations the front end needs, plus quit. Both transports
/// expose exactly this surface; the engine works against either.
#[async_trait]
pub trait CompanionApi: Send + Sync {
    /// One short line of text for the given task + persona context.
    async fn generate(&self, request: GenerateRequest) -> Result<String, ApiError>;

    /// Read one profile field; `None` if it was never set.
    async fn get_memory(&self, key: &str) -> Result<Option<Value>, ApiError>;

    /// Write one profile field. Durable (or treated as such) on return.
    async fn set_memory(&self, key: &str, value: Value) -> Result<(), ApiError>;

    /// Farewell line built from the persisted nickname and jokes.
    async fn goodbye(&self) -> Result<String, ApiError>;

    /// Terminate the process in an embedded context; a standalone server
    /// ignores it unless explicitly configured otherwise.
    async fn quit(&self) -> Result<(), ApiError>;
}
