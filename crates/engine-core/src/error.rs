use connectors::{
    http::{error::HttpError, json_stream::JsonStreamError},
    sql::{
        base::error::{ConnectorError, DbError},
        postgres::binary::CodecError,
    },
};
use thiserror::Error;
use uuid::Uuid;

/// Failures of a fetch strategy. Any of them ends the record sequence.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Source request failed: {0}")]
    Http(#[from] HttpError),

    #[error("Source database error: {0}")]
    Db(#[from] DbError),

    #[error("Failed to connect to source database: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Malformed binary export: {0}")]
    Codec(#[from] CodecError),

    #[error("Malformed record stream: {0}")]
    JsonStream(#[from] JsonStreamError),

    #[error("Source failed: {0}")]
    Source(String),

    #[error("Fetch cancelled")]
    Cancelled,
}

/// Failures of the destination store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Connection error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Store rejected the write: {0}")]
    Rejected(String),
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(err: tokio_postgres::Error) -> Self {
        StoreError::Db(DbError::from(err))
    }
}

#[derive(Error, Debug)]
pub enum InsertError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Record {0} is already tracked by the current batch")]
    IdentityConflict(Uuid),

    #[error("Insert cancelled")]
    Cancelled,
}

impl InsertError {
    /// True when the insert stopped because the run was cancelled, on either
    /// side of the pipe.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            InsertError::Cancelled | InsertError::Fetch(FetchError::Cancelled)
        )
    }
}
