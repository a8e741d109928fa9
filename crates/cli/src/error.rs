use connectors::sql::base::error::{ConnectorError, DbError};
use engine_config::settings::error::SettingsError;
use engine_runtime::error::BenchmarkError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to load settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("Benchmark failed: {0}")]
    Benchmark(#[from] BenchmarkError),

    #[error("PostgreSQL connection failed: {0}")]
    Connection(#[from] ConnectorError),

    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] DbError),

    #[error("Shutdown requested")]
    ShutdownRequested,
}
