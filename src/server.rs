//! Server module for Mural
//!
//! Configuration loading and HTTP server startup.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use mural_storage::{BlobStore, CanvasStorage, FsBlobStore, MemoryBlobStore, StorageLimits};

use crate::api::{api_router, AppState};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub blobs: BlobConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Blob storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BlobConfig {
    /// Filesystem root for stored assets. Unset keeps assets in memory.
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default = "default_public_base")]
    pub public_base: String,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            root: None,
            public_base: default_public_base(),
        }
    }
}

fn default_public_base() -> String {
    "/blobs".to_string()
}

/// Payload limit configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_elements")]
    pub max_elements: usize,
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_elements: default_max_elements(),
            max_image_bytes: default_max_image_bytes(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

fn default_max_elements() -> usize {
    1000
}

fn default_max_image_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_max_payload_bytes() -> usize {
    15 * 1024 * 1024
}

impl LimitsConfig {
    fn to_storage_limits(&self) -> StorageLimits {
        StorageLimits::new()
            .with_max_elements(self.max_elements)
            .with_max_image_bytes(self.max_image_bytes)
            .with_max_payload_bytes(self.max_payload_bytes)
    }
}

/// Embedded default configuration (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Load configuration from files and environment
pub(crate) fn load_config() -> Result<AppConfig> {
    let config = Config::builder()
        // 1. Embedded defaults (always available)
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        // 2. External overrides (optional)
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name("config/local").required(false))
        // 3. Environment variables (highest priority)
        // prefix_separator("_") so MURAL_SERVER__PORT works with a
        // single underscore after the prefix.
        .add_source(
            Environment::with_prefix("MURAL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

/// Build the application router over initialized storage.
pub(crate) fn app(state: AppState) -> Router {
    api_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Run the HTTP server until shutdown.
pub(crate) async fn run(config: AppConfig) -> Result<()> {
    let connect_options = SqliteConnectOptions::from_str(&config.database.url)
        .context("Invalid database URL")?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await
        .context("Failed to open database")?;

    let blobs: Arc<dyn BlobStore> = match &config.blobs.root {
        Some(root) => {
            info!(%root, "using filesystem blob store");
            Arc::new(FsBlobStore::new(root, &config.blobs.public_base))
        }
        None => {
            info!("using in-memory blob store");
            Arc::new(MemoryBlobStore::new(&config.blobs.public_base))
        }
    };

    let storage = CanvasStorage::new(pool, blobs, config.limits.to_storage_limits());
    storage.init().await.context("Failed to initialize schema")?;

    let app = app(AppState::new(Arc::new(storage)));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    info!("HTTP server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .await
        .context("HTTP server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults_deserialize() {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.limits.max_elements, 1000);
        assert!(config.blobs.root.is_none());
    }
}
