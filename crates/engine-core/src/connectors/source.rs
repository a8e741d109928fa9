use crate::{error::FetchError, fetch::RecordStream};
use async_trait::async_trait;
use bytes::Bytes;
use connectors::{
    http::source::HttpSource,
    sql::postgres::{adapter::copy_out_binary, utils::connect_client},
};
use futures::{StreamExt, stream::BoxStream};
use model::records::record::Record;
use tracing::debug;
use uuid::Uuid;

/// Raw response body, chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// What a binary export hands back.
pub enum BinaryExportBody {
    /// A raw `PGCOPY` payload that still has to be decoded.
    Payload(ByteStream),
    /// Rows already decoded by the database driver.
    Rows(RecordStream),
}

/// The remote side of the pipe. One method per source endpoint; a `None`
/// page means the source answered with no body.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn offset_page(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Option<Vec<Record>>, FetchError>;

    async fn keyset_page(
        &self,
        last_id: Option<Uuid>,
        page_size: u32,
    ) -> Result<Option<Vec<Record>>, FetchError>;

    /// Opens the streamed JSON array of every record.
    async fn open_stream(&self) -> Result<ByteStream, FetchError>;

    /// Opens a PostgreSQL binary COPY export of every record.
    async fn open_binary_export(&self) -> Result<BinaryExportBody, FetchError>;
}

/// Where the binary export is read from.
#[derive(Debug, Clone)]
pub enum BinaryExport {
    /// The source's `/binary-export` endpoint.
    Http,
    /// `COPY ... TO STDOUT` straight from the source database.
    Database { url: String, table: String },
}

#[derive(Debug, Clone)]
pub struct HttpRecordSource {
    http: HttpSource,
    export: BinaryExport,
}

impl HttpRecordSource {
    pub fn new(http: HttpSource, export: BinaryExport) -> Self {
        Self { http, export }
    }

    pub fn http(&self) -> &HttpSource {
        &self.http
    }
}

#[async_trait]
impl RecordSource for HttpRecordSource {
    async fn offset_page(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Option<Vec<Record>>, FetchError> {
        Ok(self.http.offset_page(page, page_size).await?)
    }

    async fn keyset_page(
        &self,
        last_id: Option<Uuid>,
        page_size: u32,
    ) -> Result<Option<Vec<Record>>, FetchError> {
        Ok(self.http.keyset_page(last_id, page_size).await?)
    }

    async fn open_stream(&self) -> Result<ByteStream, FetchError> {
        let body = self.http.open_stream().await?;
        Ok(body.map(|chunk| chunk.map_err(FetchError::from)).boxed())
    }

    async fn open_binary_export(&self) -> Result<BinaryExportBody, FetchError> {
        match &self.export {
            BinaryExport::Http => {
                let body = self.http.open_binary_export().await?;
                Ok(BinaryExportBody::Payload(
                    body.map(|chunk| chunk.map_err(FetchError::from)).boxed(),
                ))
            }
            BinaryExport::Database { url, table } => {
                debug!(table, "Opening binary export on source database");
                let client = connect_client(url).await?;
                let rows = copy_out_binary(client, table).await?;
                Ok(BinaryExportBody::Rows(
                    rows.map(|row| row.map_err(FetchError::from)).boxed(),
                ))
            }
        }
    }
}
