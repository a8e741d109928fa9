use crate::env::EnvManager;
use error::SettingsError;
use reqwest::Url;
use std::{fmt, path::Path, str::FromStr, time::Duration};
use tracing::info;

pub mod error;

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const SOURCE_URL: &str = "SOURCE_URL";
pub const SOURCE_DATABASE_URL: &str = "SOURCE_DATABASE_URL";
pub const SOURCE_STREAM_PATH: &str = "SOURCE_STREAM_PATH";
pub const SOURCE_BINARY_EXPORT_PATH: &str = "SOURCE_BINARY_EXPORT_PATH";
pub const SYNC_TABLE: &str = "SYNC_TABLE";
pub const SYNC_PAGE_SIZE: &str = "SYNC_PAGE_SIZE";
pub const SYNC_BATCH_SIZE: &str = "SYNC_BATCH_SIZE";
pub const SYNC_COPY_CHUNK_BYTES: &str = "SYNC_COPY_CHUNK_BYTES";
pub const SYNC_HTTP_TIMEOUT_SECS: &str = "SYNC_HTTP_TIMEOUT_SECS";

pub const DEFAULT_SOURCE_URL: &str = "http://localhost:5080";
pub const DEFAULT_STREAM_PATH: &str = "ef-core-stream";
pub const DEFAULT_BINARY_EXPORT_PATH: &str = "binary-export";
pub const DEFAULT_TABLE: &str = "users";
pub const DEFAULT_PAGE_SIZE: u32 = 1000;
pub const DEFAULT_BATCH_SIZE: usize = 5000;
pub const DEFAULT_COPY_CHUNK_BYTES: usize = 64 * 1024;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Everything a benchmark run needs to reach the source and the destination.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    pub source_url: String,
    /// When set, binary exports are read straight from this database.
    pub source_database_url: Option<String>,
    /// Source routes, relative to `source_url`.
    pub stream_path: String,
    pub binary_export_path: String,
    pub table: String,
    pub page_size: u32,
    pub batch_size: usize,
    pub copy_chunk_bytes: usize,
    pub http_timeout: Duration,
}

impl Settings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_manager(&EnvManager::new())
    }

    /// Reads settings from the process environment overlaid with `path`.
    pub fn from_env_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let mut env = EnvManager::new();
        env.load_from_file(path)?;
        Self::from_manager(&env)
    }

    pub fn from_manager(env: &EnvManager) -> Result<Self, SettingsError> {
        let database_url = env
            .non_empty(DATABASE_URL)
            .ok_or(SettingsError::Missing(DATABASE_URL))?
            .to_string();

        let source_url = env
            .non_empty(SOURCE_URL)
            .unwrap_or(DEFAULT_SOURCE_URL)
            .to_string();
        Url::parse(&source_url).map_err(|e| SettingsError::InvalidUrl {
            key: SOURCE_URL,
            value: source_url.clone(),
            reason: e.to_string(),
        })?;

        Ok(Settings {
            database_url,
            source_url,
            source_database_url: env.non_empty(SOURCE_DATABASE_URL).map(String::from),
            stream_path: env
                .non_empty(SOURCE_STREAM_PATH)
                .unwrap_or(DEFAULT_STREAM_PATH)
                .to_string(),
            binary_export_path: env
                .non_empty(SOURCE_BINARY_EXPORT_PATH)
                .unwrap_or(DEFAULT_BINARY_EXPORT_PATH)
                .to_string(),
            table: env
                .non_empty(SYNC_TABLE)
                .unwrap_or(DEFAULT_TABLE)
                .to_string(),
            page_size: positive(env, SYNC_PAGE_SIZE, DEFAULT_PAGE_SIZE)?,
            batch_size: positive(env, SYNC_BATCH_SIZE, DEFAULT_BATCH_SIZE)?,
            copy_chunk_bytes: positive(env, SYNC_COPY_CHUNK_BYTES, DEFAULT_COPY_CHUNK_BYTES)?,
            http_timeout: Duration::from_secs(positive(
                env,
                SYNC_HTTP_TIMEOUT_SECS,
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?),
        })
    }

    pub fn log_summary(&self) {
        info!(
            destination = %redact_url(&self.database_url),
            source = %self.source_url,
            source_db = ?self.source_database_url.as_deref().map(redact_url),
            stream_path = %self.stream_path,
            binary_export_path = %self.binary_export_path,
            table = %self.table,
            page_size = self.page_size,
            batch_size = self.batch_size,
            copy_chunk_bytes = self.copy_chunk_bytes,
            "Loaded settings"
        );
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("database_url", &redact_url(&self.database_url))
            .field("source_url", &self.source_url)
            .field(
                "source_database_url",
                &self.source_database_url.as_deref().map(redact_url),
            )
            .field("stream_path", &self.stream_path)
            .field("binary_export_path", &self.binary_export_path)
            .field("table", &self.table)
            .field("page_size", &self.page_size)
            .field("batch_size", &self.batch_size)
            .field("copy_chunk_bytes", &self.copy_chunk_bytes)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

fn positive<T>(env: &EnvManager, key: &'static str, default: T) -> Result<T, SettingsError>
where
    T: FromStr + PartialEq + Default,
{
    let Some(raw) = env.non_empty(key) else {
        return Ok(default);
    };
    match raw.parse::<T>() {
        Ok(value) if value != T::default() => Ok(value),
        _ => Err(SettingsError::InvalidNumber {
            key,
            value: raw.to_string(),
        }),
    }
}

/// Masks the password of a URL or `key=value` connection string.
pub fn redact_url(conn: &str) -> String {
    if let Ok(mut url) = Url::parse(conn) {
        if url.password().is_some() {
            let _ = url.set_password(Some("***"));
        }
        return url.to_string();
    }

    conn.split_whitespace()
        .map(|part| match part.split_once('=') {
            Some((key, _)) if key.eq_ignore_ascii_case("password") => format!("{key}=***"),
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
