// Query Bridge - HTTP Server
// Serves natural-language queries over databases and OpenAPI-described APIs
// Run with: cargo run --bin server

//! # Query Bridge Server Binary
//!
//! Starts the HTTP front end. Everything interesting lives in the library crate;
//! this file only loads settings, wires collaborators and starts listening.
//!
//! ## What This Server Provides
//!
//! - **POST /api/v1/database/query**: question + database URL → answer
//! - **POST /api/v1/api/query**: question + Swagger/OpenAPI URL (+ auth) → answer
//! - **GET /health**: liveness probe
//!
//! ## Architecture
//!
//! ```text
//! main()
//!   ↓ loads
//! Settings (.env + environment)
//!   ↓ builds
//! QueryServiceBuilder → QueryServiceImpl
//!   ↓ served by
//! QueryServer (Axum)
//! ```
//!
//! ## Rust Learning Notes:
//!
//! `anyhow::Result` is the usual choice for binaries: any error type converts into it
//! with `?`, and the library keeps its precise `QueryBridgeError` for callers that
//! want to match on it.

use anyhow::{anyhow, Context};
use query_bridge::config::{init_logging, Settings};
use query_bridge::server::QueryServerBuilder;
use query_bridge::QueryServiceBuilder;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load settings")?;
    init_logging(&settings.log_level);

    info!("🚀 Starting Query Bridge server");
    info!("🧠 Language model: {}", settings.openai_model);

    let service = QueryServiceBuilder::from_settings(&settings)
        .build()
        .context("failed to build query service")?;

    let server = QueryServerBuilder::new()
        .with_host(settings.server_host.clone())
        .with_port(settings.server_port)
        .with_cors(true)
        .with_service(Arc::new(service))
        .build()?;

    server.run().await.map_err(|e| anyhow!(e))?;

    Ok(())
}
