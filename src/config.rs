use std::{path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result};

/// Which [`LinkRepository`](crate::store::LinkRepository) backs the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// One JSON document rewritten on every mutation.
    Json,
    Sqlite,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "sqlite" => Ok(Self::Sqlite),
            other => anyhow::bail!("unknown storage backend '{other}' (expected json or sqlite)"),
        }
    }
}

/// Whether geo enrichment may call out to the external lookup service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoMode {
    Online,
    Offline,
}

impl FromStr for GeoMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            other => anyhow::bail!("unknown geo mode '{other}' (expected online or offline)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind the HTTP server to, e.g. "0.0.0.0"
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Public base URL used when generating short links, e.g. "https://go.example.com"
    /// Must NOT have a trailing slash.
    pub base_url: String,

    pub storage: StorageBackend,

    /// JSON document used by the `json` backend
    pub data_path: PathBuf,

    /// SQLite connection string used by the `sqlite` backend, e.g. "sqlite:./linktrail.db"
    pub database_url: String,

    pub geo_mode: GeoMode,

    /// ip-api compatible endpoint; the client IP is appended as a path segment
    pub geo_api_url: String,

    /// Hard cap on each geo lookup tier
    pub geo_timeout: Duration,
}

impl AppConfig {
    /// Load configuration from environment variables (populated by dotenvy before this is called).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key → value source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_owned());

        let port = var("PORT", "3000")
            .parse::<u16>()
            .context("PORT must be a valid port number (1–65535)")?;

        let base_url = var("BASE_URL", &format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_owned();

        let storage = var("STORAGE_BACKEND", "json")
            .parse::<StorageBackend>()
            .context("invalid STORAGE_BACKEND")?;

        let geo_mode = var("GEO_MODE", "online")
            .parse::<GeoMode>()
            .context("invalid GEO_MODE")?;

        let geo_timeout_ms = var("GEO_TIMEOUT_MS", "2500")
            .parse::<u64>()
            .context("GEO_TIMEOUT_MS must be a whole number of milliseconds")?;
        if geo_timeout_ms == 0 {
            anyhow::bail!("GEO_TIMEOUT_MS must be greater than zero");
        }

        Ok(Self {
            host: var("HOST", "0.0.0.0"),
            port,
            base_url,
            storage,
            data_path: PathBuf::from(var("DATA_PATH", "./links.json")),
            database_url: var("DATABASE_URL", "sqlite:./linktrail.db"),
            geo_mode,
            geo_api_url: var("GEO_API_URL", "http://ip-api.com/json"),
            geo_timeout: Duration::from_millis(geo_timeout_ms),
        })
    }
}
