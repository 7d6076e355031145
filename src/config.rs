use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Local hour (Kathmandu time) at which the daily cleanup runs.
    pub cleanup_hour: u32,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Storage quota housekeeping for the school media library")]
pub struct Args {
    /// Host to bind to (overrides STORAGE_WARDEN_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides STORAGE_WARDEN_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Blob root where media payloads live (overrides STORAGE_WARDEN_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides STORAGE_WARDEN_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Daily cleanup hour, 0-23 local (overrides STORAGE_WARDEN_CLEANUP_HOUR)
    #[arg(long)]
    pub cleanup_hour: Option<u32>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("STORAGE_WARDEN_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("STORAGE_WARDEN_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing STORAGE_WARDEN_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading STORAGE_WARDEN_PORT"),
        };
        let env_storage =
            env::var("STORAGE_WARDEN_STORAGE_DIR").unwrap_or_else(|_| "./data/files".into());
        let env_db = env::var("STORAGE_WARDEN_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/storage_warden.db".into());
        let env_cleanup_hour = match env::var("STORAGE_WARDEN_CLEANUP_HOUR") {
            Ok(value) => value
                .parse::<u32>()
                .with_context(|| format!("parsing STORAGE_WARDEN_CLEANUP_HOUR value `{}`", value))?,
            Err(env::VarError::NotPresent) => 2,
            Err(err) => return Err(err).context("reading STORAGE_WARDEN_CLEANUP_HOUR"),
        };

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            cleanup_hour: args.cleanup_hour.unwrap_or(env_cleanup_hour),
        };

        if cfg.cleanup_hour > 23 {
            anyhow::bail!("cleanup hour must be between 0 and 23, got {}", cfg.cleanup_hour);
        }

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
