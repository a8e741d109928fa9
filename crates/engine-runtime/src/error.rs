use connectors::{http::error::HttpError, sql::base::error::ConnectorError};
use engine_config::settings::error::SettingsError;
use engine_core::error::{FetchError, InsertError, StoreError};
use model::execution::errors::SelectorError;
use thiserror::Error;

/// Everything that can end a benchmark run, or stop one from starting.
#[derive(Debug, Error)]
pub enum BenchmarkError {
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error("Failed to connect to destination: {0}")]
    Connect(#[from] ConnectorError),

    #[error("Failed to set up source client: {0}")]
    Source(#[from] HttpError),

    #[error("No async runtime to launch the run on: {0}")]
    Runtime(String),

    #[error("Failed to clear destination: {0}")]
    Clear(#[source] StoreError),

    #[error("Fetch failed: {0}")]
    Fetch(#[source] FetchError),

    #[error("Insert failed: {0}")]
    Insert(#[source] InsertError),

    #[error("Run cancelled")]
    Cancelled,
}

impl From<InsertError> for BenchmarkError {
    fn from(err: InsertError) -> Self {
        if err.is_cancelled() {
            return BenchmarkError::Cancelled;
        }
        match err {
            InsertError::Fetch(err) => BenchmarkError::Fetch(err),
            other => BenchmarkError::Insert(other),
        }
    }
}

impl BenchmarkError {
    /// Configuration problems are reported before any I/O happens.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BenchmarkError::Settings(_) | BenchmarkError::Selector(_)
        )
    }
}
