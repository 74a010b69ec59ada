use anyhow::{Context, Result};
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod auth;
mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use config::{AppConfig, RunMode};
use services::{
    blob_store::{BlobStore, TimeoutBlobStore},
    extractor::FilenameExtractor,
    index_store::IndexStore,
    library_service::{DirectoryPolicy, LibraryService},
    local_blob_store::LocalBlobStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + run mode ---
    let (cfg, mode) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting photo-library with config: {:?}", redacted(&cfg));

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_path = cfg
        .database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }
    let options = SqliteConnectOptions::from_str(&cfg.database_url)
        .with_context(|| format!("parsing database URL `{}`", cfg.database_url))?
        .create_if_missing(true);
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?,
    );

    let index = IndexStore::new(db);
    index.migrate().await.context("applying schema")?;

    // --- Handle migration mode ---
    if mode == RunMode::Migrate {
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    // --- Initialize core service ---
    let signing_secret = match &cfg.signing_secret {
        Some(secret) => secret.clone(),
        None => {
            tracing::warn!(
                "PHOTO_LIBRARY_SIGNING_SECRET is not set; signed URLs will not survive a restart"
            );
            Uuid::new_v4().to_string()
        }
    };
    let local = LocalBlobStore::new(&cfg.storage_dir, signing_secret, &cfg.public_url);
    let blobs: Arc<dyn BlobStore> = Arc::new(TimeoutBlobStore::new(Arc::new(local), cfg.blob_timeout));
    let policy = if cfg.materialize_ancestors {
        DirectoryPolicy::Ancestors
    } else {
        DirectoryPolicy::ImmediateParent
    };
    let service = LibraryService::new(index, blobs, Arc::new(FilenameExtractor), policy);

    // --- Offline reconciliation mode ---
    if let RunMode::Sync {
        owner,
        refresh_metadata,
    } = mode
    {
        let report = service.sync(owner, refresh_metadata).await?;
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    // --- Build router ---
    let state = state::AppState {
        service,
        auth: cfg.auth.clone(),
    };
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Config as logged at startup, without the signing secret.
fn redacted(cfg: &AppConfig) -> AppConfig {
    AppConfig {
        signing_secret: cfg.signing_secret.as_ref().map(|_| "<redacted>".into()),
        ..cfg.clone()
    }
}
