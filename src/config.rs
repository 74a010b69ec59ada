use crate::{auth::AuthMode, models::user::OwnerId};
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub auth: AuthMode,
    /// Secret for locally signed URLs. `None` means one is generated per process.
    pub signing_secret: Option<String>,
    pub public_url: String,
    pub blob_timeout: Duration,
    pub materialize_ancestors: bool,
}

/// What the process does after configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Serve,
    Migrate,
    Sync { owner: OwnerId, refresh_metadata: bool },
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Photo library over a blob store with a SQLite index")]
pub struct Args {
    /// Host to bind to (overrides PHOTO_LIBRARY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PHOTO_LIBRARY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory holding the blobs (overrides PHOTO_LIBRARY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides PHOTO_LIBRARY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// `fixed` or `header` (overrides PHOTO_LIBRARY_AUTH_MODE)
    #[arg(long)]
    pub auth_mode: Option<String>,

    /// Owner id used in fixed auth mode (overrides PHOTO_LIBRARY_OWNER_ID)
    #[arg(long)]
    pub owner_id: Option<OwnerId>,

    /// Header carrying the username in header auth mode (overrides PHOTO_LIBRARY_IDENTITY_HEADER)
    #[arg(long)]
    pub identity_header: Option<String>,

    /// Secret for signed URLs (overrides PHOTO_LIBRARY_SIGNING_SECRET)
    #[arg(long)]
    pub signing_secret: Option<String>,

    /// Base URL that signed URLs point at (overrides PHOTO_LIBRARY_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Upper bound for a single blob store call (overrides PHOTO_LIBRARY_BLOB_TIMEOUT_SECS)
    #[arg(long)]
    pub blob_timeout_secs: Option<u64>,

    /// Materialize every ancestor directory, not just the parent
    /// (overrides PHOTO_LIBRARY_MATERIALIZE_ANCESTORS)
    #[arg(long)]
    pub materialize_ancestors: bool,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Reconcile this owner's index against the blob store and exit
    #[arg(long)]
    pub sync_owner: Option<OwnerId>,

    /// With --sync-owner, also re-extract metadata from every blob
    #[arg(long, requires = "sync_owner")]
    pub refresh_metadata: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and run mode.
    pub fn from_env_and_args() -> Result<(Self, RunMode)> {
        let args = Args::parse();
        Self::resolve(args, |name| env::var(name).ok())
    }

    /// Merge `args` over the variables visible through `env`.
    pub fn resolve(args: Args, env: impl Fn(&str) -> Option<String>) -> Result<(Self, RunMode)> {
        let host = args
            .host
            .or_else(|| env("PHOTO_LIBRARY_HOST"))
            .unwrap_or_else(|| "0.0.0.0".into());
        let port = match args.port {
            Some(port) => port,
            None => parse_env(&env, "PHOTO_LIBRARY_PORT")?.unwrap_or(3000),
        };
        let storage_dir = args
            .storage_dir
            .or_else(|| env("PHOTO_LIBRARY_STORAGE_DIR"))
            .unwrap_or_else(|| "./data/blobs".into());
        let database_url = args
            .database_url
            .or_else(|| env("PHOTO_LIBRARY_DATABASE_URL"))
            .unwrap_or_else(|| "sqlite://./data/meta/photo_library.db".into());

        let owner_id = match args.owner_id {
            Some(id) => id,
            None => parse_env(&env, "PHOTO_LIBRARY_OWNER_ID")?.unwrap_or(1),
        };
        let identity_header = args
            .identity_header
            .or_else(|| env("PHOTO_LIBRARY_IDENTITY_HEADER"))
            .unwrap_or_else(|| "x-forwarded-user".into());
        let auth_mode = args
            .auth_mode
            .or_else(|| env("PHOTO_LIBRARY_AUTH_MODE"))
            .unwrap_or_else(|| "fixed".into());
        let auth = match auth_mode.to_ascii_lowercase().as_str() {
            "fixed" => AuthMode::Fixed(owner_id),
            "header" => AuthMode::Header(identity_header.to_ascii_lowercase()),
            other => bail!("unknown auth mode `{}` (expected fixed or header)", other),
        };

        let signing_secret = args
            .signing_secret
            .or_else(|| env("PHOTO_LIBRARY_SIGNING_SECRET"))
            .filter(|s| !s.is_empty());
        let public_url = args
            .public_url
            .or_else(|| env("PHOTO_LIBRARY_PUBLIC_URL"))
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", port));
        let blob_timeout_secs = match args.blob_timeout_secs {
            Some(secs) => secs,
            None => parse_env(&env, "PHOTO_LIBRARY_BLOB_TIMEOUT_SECS")?.unwrap_or(60),
        };
        if blob_timeout_secs == 0 {
            bail!("blob timeout must be at least one second");
        }
        let materialize_ancestors = args.materialize_ancestors
            || parse_env::<bool>(&env, "PHOTO_LIBRARY_MATERIALIZE_ANCESTORS")?.unwrap_or(false);

        let mode = match (args.migrate, args.sync_owner) {
            (true, Some(_)) => bail!("--migrate and --sync-owner are mutually exclusive"),
            (true, None) => RunMode::Migrate,
            (false, Some(owner)) => RunMode::Sync {
                owner,
                refresh_metadata: args.refresh_metadata,
            },
            (false, None) => RunMode::Serve,
        };

        let cfg = Self {
            host,
            port,
            storage_dir,
            database_url,
            auth,
            signing_secret,
            public_url,
            blob_timeout: Duration::from_secs(blob_timeout_secs),
            materialize_ancestors,
        };
        Ok((cfg, mode))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        None => Ok(None),
    }
}
