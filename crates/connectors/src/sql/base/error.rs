use crate::sql::postgres::binary::CodecError;
use thiserror::Error;

/// All errors coming from the database/query layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// Low‐level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// PostgreSQL driver error.
    #[error("PostgreSQL error: {0}")]
    PgError(#[from] tokio_postgres::Error),

    /// A binary COPY payload could not be encoded or decoded.
    #[error("Binary COPY codec error: {0}")]
    Codec(#[from] CodecError),

    /// The server accepted fewer rows than were sent.
    #[error("Write error: {0}")]
    Write(String),

    /// A dedicated connection could not be opened.
    #[error("Connection error: {0}")]
    Connector(#[from] ConnectorError),
}

/// Errors happening during adapter or connection setup.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Invalid connection string: {0}")]
    InvalidUrl(String),

    #[error("Failed to connect to PostgreSQL: {0}")]
    Connection(#[from] tokio_postgres::Error),

    #[error("Failed to configure TLS: {0}")]
    TlsConfig(#[from] native_tls::Error),
}
