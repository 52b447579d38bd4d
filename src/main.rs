//! Standalone API server for the Blob companion.
//!
//! Runs the generation proxy and the persisted memory without an embedding
//! shell, so the companion UI can live in a wallpaper or overlay tool and
//! talk to `http://127.0.0.1:<port>/api/...`.

use anyhow::Result;
use blob_engine::config::{self, EngineConfig};
use blob_engine::llm::{GeminiClient, TextGenerator};
use blob_engine::memory::MemoryStore;
use blob_engine::transport::ApiServer;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let data_dir = config::data_dir();
    std::fs::create_dir_all(&data_dir)?;

    let cfg = EngineConfig::load(&data_dir.join("blob_config.json"));
    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(cfg.port);
    let allow_quit = match std::env::var("ALLOW_QUIT") {
        Ok(v) => v == "1",
        Err(_) => cfg.allow_quit,
    };

    let memory_path = cfg
        .memory_file
        .clone()
        .unwrap_or_else(|| data_dir.join("blob-memory.json"));
    let memory = Arc::new(MemoryStore::open(memory_path));
    let generator: Arc<dyn TextGenerator> = Arc::new(GeminiClient::new(&cfg.generation));

    let mut server = ApiServer::new(generator, memory, allow_quit);
    server.start(port).await?;
    tracing::info!("[Server] listening on http://127.0.0.1:{}", server.port());
    if allow_quit {
        tracing::warn!("[Server] /api/quit may terminate this process");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("[Server] shutting down");
    Ok(())
}
