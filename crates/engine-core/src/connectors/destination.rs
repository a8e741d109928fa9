use crate::error::StoreError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use connectors::sql::postgres::{
    adapter::PgAdapter,
    binary::{RECORD_TYPES, record_params},
    encoder::PgCopyValueEncoder,
    query,
};
use futures::SinkExt;
use model::records::record::Record;
use std::{fmt, pin::Pin};
use tokio_postgres::{Client, CopyInSink, binary_copy::BinaryCopyInWriter};
use tracing::{debug, info};

pub const DEFAULT_COPY_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyFormat {
    /// CSV text, streamed over the shared connection.
    Csv,
    /// PostgreSQL binary tuples, streamed over a dedicated connection.
    Binary,
}

impl fmt::Display for CopyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyFormat::Csv => write!(f, "csv"),
            CopyFormat::Binary => write!(f, "binary"),
        }
    }
}

/// The destination table, as seen by the insert strategies.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Removes every row from the destination table.
    async fn truncate(&self) -> Result<(), StoreError>;

    /// Writes tracked records one statement per row, as a single unit.
    async fn save_changes(&self, records: &[Record]) -> Result<u64, StoreError>;

    /// Writes records with multi-row statements, as a single unit.
    async fn bulk_insert(&self, records: &[Record]) -> Result<u64, StoreError>;

    /// Refreshes planner statistics for the destination table.
    async fn sync_metadata(&self) -> Result<(), StoreError>;

    /// Starts a copy into the destination table. Nothing is visible until
    /// [`CopyWriter::finish`] succeeds; dropping the writer aborts the copy.
    async fn begin_copy(&self, format: CopyFormat) -> Result<Box<dyn CopyWriter>, StoreError>;
}

#[async_trait]
pub trait CopyWriter: Send {
    async fn write_record(&mut self, record: &Record) -> Result<(), StoreError>;

    /// Completes the copy and returns the number of rows the store accepted.
    async fn finish(self: Box<Self>) -> Result<u64, StoreError>;
}

#[derive(Clone)]
pub struct PgStore {
    adapter: PgAdapter,
    table: String,
    copy_chunk_bytes: usize,
}

impl PgStore {
    pub fn new(adapter: PgAdapter, table: impl Into<String>) -> Self {
        Self {
            adapter,
            table: table.into(),
            copy_chunk_bytes: DEFAULT_COPY_CHUNK_BYTES,
        }
    }

    pub fn with_copy_chunk_bytes(mut self, bytes: usize) -> Self {
        self.copy_chunk_bytes = bytes.max(1);
        self
    }

    pub fn adapter(&self) -> &PgAdapter {
        &self.adapter
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn truncate(&self) -> Result<(), StoreError> {
        self.adapter.truncate_table(&self.table).await?;
        info!(table = %self.table, "Destination table truncated");
        Ok(())
    }

    async fn save_changes(&self, records: &[Record]) -> Result<u64, StoreError> {
        Ok(self.adapter.insert_rows(&self.table, records).await?)
    }

    async fn bulk_insert(&self, records: &[Record]) -> Result<u64, StoreError> {
        Ok(self.adapter.bulk_insert(&self.table, records).await?)
    }

    async fn sync_metadata(&self) -> Result<(), StoreError> {
        Ok(self.adapter.analyze_table(&self.table).await?)
    }

    async fn begin_copy(&self, format: CopyFormat) -> Result<Box<dyn CopyWriter>, StoreError> {
        match format {
            CopyFormat::Csv => {
                let sink = self
                    .adapter
                    .copy_in(&query::copy_in_csv(&self.table))
                    .await?;
                Ok(Box::new(CsvCopyWriter::new(sink, self.copy_chunk_bytes)))
            }
            CopyFormat::Binary => {
                let client = self.adapter.connect_dedicated().await?;
                let sink = client
                    .copy_in(query::copy_in_binary(&self.table).as_str())
                    .await?;
                Ok(Box::new(BinaryCopyWriter::new(client, sink)))
            }
        }
    }
}

/// Buffers CSV lines and ships them to the server in chunks of at least
/// `chunk_bytes`.
struct CsvCopyWriter {
    sink: Pin<Box<CopyInSink<Bytes>>>,
    encoder: PgCopyValueEncoder,
    buf: BytesMut,
    chunk_bytes: usize,
    rows: u64,
}

impl CsvCopyWriter {
    fn new(sink: CopyInSink<Bytes>, chunk_bytes: usize) -> Self {
        Self {
            sink: Box::pin(sink),
            encoder: PgCopyValueEncoder::new(),
            buf: BytesMut::with_capacity(chunk_bytes),
            chunk_bytes,
            rows: 0,
        }
    }

    async fn flush_chunk(&mut self) -> Result<(), StoreError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = self.buf.split().freeze();
        debug!(bytes = chunk.len(), "Sending COPY chunk");
        self.sink.send(chunk).await?;
        Ok(())
    }
}

#[async_trait]
impl CopyWriter for CsvCopyWriter {
    async fn write_record(&mut self, record: &Record) -> Result<(), StoreError> {
        self.encoder.encode_record(record, &mut self.buf);
        self.rows += 1;
        if self.buf.len() >= self.chunk_bytes {
            self.flush_chunk().await?;
        }
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<u64, StoreError> {
        self.flush_chunk().await?;
        let written = self.sink.as_mut().finish().await?;
        if written != self.rows {
            return Err(StoreError::Rejected(format!(
                "copy accepted {written} of {} rows",
                self.rows
            )));
        }
        Ok(written)
    }
}

/// Writes tuples through the driver's binary COPY writer, which buffers
/// them and flushes on its own. Owns its connection for the lifetime of the
/// copy.
struct BinaryCopyWriter {
    _client: Client,
    writer: Pin<Box<BinaryCopyInWriter>>,
    rows: u64,
}

impl BinaryCopyWriter {
    fn new(client: Client, sink: CopyInSink<Bytes>) -> Self {
        Self {
            _client: client,
            writer: Box::pin(BinaryCopyInWriter::new(sink, &RECORD_TYPES)),
            rows: 0,
        }
    }
}

#[async_trait]
impl CopyWriter for BinaryCopyWriter {
    async fn write_record(&mut self, record: &Record) -> Result<(), StoreError> {
        self.writer.as_mut().write(&record_params(record)).await?;
        self.rows += 1;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<u64, StoreError> {
        let written = self.writer.as_mut().finish().await?;
        debug!(rows = written, "Binary COPY finished");
        if written != self.rows {
            return Err(StoreError::Rejected(format!(
                "binary copy accepted {written} of {} rows",
                self.rows
            )));
        }
        Ok(written)
    }
}
