//! Standalone HTTP API server.
//!
//! Hosts the wire side of the transport so the companion can run without
//! an embedding shell (wallpaper/overlay setups). Quit over the network is
//! refused unless explicitly enabled, so a shared instance cannot be shut
//! down by any local page.

use crate::llm::provider::{GenerateRequest, TextGenerator};
use crate::memory::MemoryStore;
use crate::transport::direct::farewell_line;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::Filter;

pub struct ApiServer {
    port: u16,
    generator: Arc<dyn TextGenerator>,
    memory: Arc<MemoryStore>,
    allow_quit: bool,
}

#[derive(Debug, Deserialize)]
struct SetMemoryBody {
    key: String,
    value: Value,
}

fn with<T: Clone + Send>(t: T) -> impl Filter<Extract = (T,), Error = Infallible> + Clone {
    warp::any().map(move || t.clone())
}

fn ok_reply(body: Value) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(warp::reply::json(&body), StatusCode::OK)
}

fn error_reply(message: String) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&json!({ "ok": false, "error": message })),
        StatusCode::INTERNAL_SERVER_ERROR,
    )
}

impl ApiServer {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        memory: Arc<MemoryStore>,
        allow_quit: bool,
    ) -> Self {
        Self {
            port: 0,
            generator,
            memory,
            allow_quit,
        }
    }

    /// Actual port after `start`. Useful with port 0.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind and serve in the background. Pass port 0 for an ephemeral port.
    pub async fn start(&mut self, port: u16) -> Result<()> {
        let generator = self.generator.clone();
        let memory = self.memory.clone();
        let allow_quit = self.allow_quit;

        let llm = warp::path!("api" / "llm")
            .and(warp::post())
            .and(warp::body::json())
            .and(with(generator.clone()))
            .and_then(handle_llm);

        let memory_get = warp::path!("api" / "memory" / String)
            .and(warp::get())
            .and(with(memory.clone()))
            .and_then(handle_memory_get);

        let memory_set = warp::path!("api" / "memory")
            .and(warp::post())
            .and(warp::body::json())
            .and(with(memory.clone()))
            .and_then(handle_memory_set);

        let goodbye = warp::path!("api" / "goodbye")
            .and(warp::post())
            .and(with(generator))
            .and(with(memory))
            .and_then(handle_goodbye);

        let quit = warp::path!("api" / "quit")
            .and(warp::post())
            .and(with(allow_quit))
            .and_then(handle_quit);

        let routes = llm.or(memory_get).or(memory_set).or(goodbye).or(quit);

        let (addr, fut) = warp::serve(routes)
            .try_bind_ephemeral(([127, 0, 0, 1], port))
            .map_err(|e| anyhow::anyhow!("failed to bind port {}: {}", port, e))?;
        self.port = addr.port();
        tokio::spawn(fut);
        Ok(())
    }
}

async fn handle_llm(
    request: GenerateRequest,
    generator: Arc<dyn TextGenerator>,
) -> Result<impl warp::Reply, warp::Rejection> {
    match generator.generate(&request).await {
        Ok(text) => Ok(ok_reply(json!({ "ok": true, "text": text }))),
        Err(e) => Ok(error_reply(e.to_string())),
    }
}

async fn handle_memory_get(
    key: String,
    memory: Arc<MemoryStore>,
) -> Result<impl warp::Reply, warp::Rejection> {
    // warp hands path params through still percent-encoded.
    let key = urlencoding::decode(&key)
        .map(|k| k.into_owned())
        .unwrap_or(key);
    let value = memory.get(&key).unwrap_or(Value::Null);
    Ok(ok_reply(json!({ "ok": true, "value": value })))
}

async fn handle_memory_set(
    body: SetMemoryBody,
    memory: Arc<MemoryStore>,
) -> Result<impl warp::Reply, warp::Rejection> {
    memory.set(&body.key, body.value);
    Ok(ok_reply(json!({ "ok": true })))
}

async fn handle_goodbye(
    generator: Arc<dyn TextGenerator>,
    memory: Arc<MemoryStore>,
) -> Result<impl warp::Reply, warp::Rejection> {
    match farewell_line(generator.as_ref(), &memory).await {
        Ok(text) => Ok(ok_reply(json!({ "ok": true, "text": text }))),
        Err(e) => Ok(error_reply(e.to_string())),
    }
}

async fn handle_quit(allow_quit: bool) -> Result<impl warp::Reply, warp::Rejection> {
    if allow_quit {
        tracing::info!("[Server] quit requested — exiting shortly");
        tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            std::process::exit(0);
        });
        return Ok(ok_reply(json!({ "ok": true })));
    }
    Ok(ok_reply(json!({
        "ok": true,
        "note": "Quit disabled for web server."
    })))
}
