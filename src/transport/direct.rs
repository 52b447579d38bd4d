//! In-process transport: generation client and memory store are owned
//! directly, no wire in between. This is what an embedded desktop shell
//! constructs.

use crate::llm::provider::{GenerateError, GenerateRequest, TextGenerator};
use crate::memory::profile::{self, keys};
use crate::memory::MemoryStore;
use crate::transport::{ApiError, CompanionApi, FAREWELL_MOOD, FAREWELL_PROMPT};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub struct DirectApi {
    generator: Arc<dyn TextGenerator>,
    memory: Arc<MemoryStore>,
    allow_quit: bool,
}

impl DirectApi {
    /// Embedded construction: quit terminates the process.
    pub fn new(generator: Arc<dyn TextGenerator>, memory: Arc<MemoryStore>) -> Self {
        Self {
            generator,
            memory,
            allow_quit: true,
        }
    }

    pub fn with_allow_quit(mut self, allow_quit: bool) -> Self {
        self.allow_quit = allow_quit;
        self
    }
}

/// Farewell line from the persisted nickname and the full joke list.
/// Shared between the in-process transport and the HTTP server.
pub(crate) async fn farewell_line(
    generator: &dyn TextGenerator,
    memory: &MemoryStore,
) -> Result<String, GenerateError> {
    let nickname = profile::nickname_from(memory.get(keys::NICKNAME));
    let inside_jokes = profile::jokes_from(memory.get(keys::INSIDE_JOKES));
    generator
        .generate(&GenerateRequest {
            prompt: FAREWELL_PROMPT.to_string(),
            mood: FAREWELL_MOOD.to_string(),
            nickname,
            inside_jokes,
        })
        .await
}

#[async_trait]
impl CompanionApi for DirectApi {
    async fn generate(&self, request: GenerateRequest) -> Result<String, ApiError> {
        Ok(self.generator.generate(&request).await?)
    }

    async fn get_memory(&self, key: &str) -> Result<Option<Value>, ApiError> {
        Ok(self.memory.get(key))
    }

    async fn set_memory(&self, key: &str, value: Value) -> Result<(), ApiError> {
        // A failed flush is already logged by the store and not retried.
        self.memory.set(key, value);
        Ok(())
    }

    async fn goodbye(&self) -> Result<String, ApiError> {
        Ok(farewell_line(self.generator.as_ref(), &self.memory).await?)
    }

    async fn quit(&self) -> Result<(), ApiError> {
        if self.allow_quit {
            tokio::spawn(async {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                std::process::exit(0);
            });
        }
        Ok(())
    }
}
