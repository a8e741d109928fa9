//! In-memory source and store used by the strategy and runner tests.
//!
//! Both doubles log every call they receive and can be told to cancel a
//! token, or to fail, after a given number of calls or writes. When a token is being
//! watched, calls that arrive after it was cancelled are counted separately.

use crate::{
    connectors::{
        destination::{CopyFormat, CopyWriter, RecordStore},
        source::{BinaryExportBody, ByteStream, RecordSource},
    },
    error::{FetchError, StoreError},
    fetch::RecordStream,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use connectors::sql::postgres::{
    binary::{BinaryRowDecoder, encode_all, encode_header, encode_row, encode_trailer},
    encoder::PgCopyValueEncoder,
};
use futures::{StreamExt, stream};
use model::records::record::Record;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicUsize, Ordering},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const DEFAULT_CHUNK_BYTES: usize = 8 * 1024;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Deterministic records with ascending ids. Text fields include separators,
/// quotes and newlines; every third record has no patronymic.
pub fn sample_records(count: usize) -> Vec<Record> {
    const SURNAMES: [&str; 4] = [
        "Ivanov",
        "O'Brien, Jr.",
        "Smith \"the elder\"",
        "Kowalska\nNowak",
    ];
    const FIRST: i64 = 1_704_067_200_000_000;

    (0..count)
        .map(|i| Record {
            id: Uuid::from_u128(((i as u128 + 1) << 64) | 0x5eed),
            surname: SURNAMES[i % SURNAMES.len()].to_string(),
            name: format!("Ёлка-{i}"),
            patronymic: (i % 3 != 0).then(|| format!("Petrovich {i}")),
            created_at: chrono::DateTime::from_timestamp_micros(FIRST + i as i64 * 1_000_001)
                .unwrap_or_default(),
            is_active: i % 2 == 0,
        })
        .collect()
}

/// A pipe that yields `records` without touching any source.
pub fn records_stream(records: Vec<Record>) -> RecordStream {
    stream::iter(records.into_iter().map(Ok)).boxed()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCall {
    OffsetPage { page: u32, page_size: u32 },
    KeysetPage { last_id: Option<Uuid>, page_size: u32 },
    OpenStream,
    OpenBinaryExport,
    ReadChunk,
}

#[derive(Default)]
struct CallLog {
    calls: Mutex<Vec<SourceCall>>,
    calls_after_cancel: AtomicUsize,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
    fail_after: Mutex<Option<usize>>,
}

impl CallLog {
    fn record(&self, call: SourceCall) -> Result<(), FetchError> {
        let trigger = lock(&self.cancel_after).clone();
        let mut calls = lock(&self.calls);

        if trigger.as_ref().is_some_and(|(_, token)| token.is_cancelled()) {
            self.calls_after_cancel.fetch_add(1, Ordering::SeqCst);
        }
        calls.push(call);
        let count = calls.len();

        if let Some((after, token)) = trigger
            && count == after
        {
            token.cancel();
        }
        if lock(&self.fail_after).is_some_and(|limit| count > limit) {
            return Err(FetchError::Source(format!("injected failure on call {count}")));
        }
        Ok(())
    }
}

/// Serves a fixed, id-ordered record set through every source endpoint.
#[derive(Clone)]
pub struct MemorySource {
    records: Arc<Vec<Record>>,
    chunk_bytes: usize,
    stall: bool,
    null_when_exhausted: bool,
    truncate_at: Option<usize>,
    suffix: Bytes,
    log: Arc<CallLog>,
}

impl MemorySource {
    pub fn new(mut records: Vec<Record>) -> Self {
        records.sort_by_key(|r| r.id);
        Self {
            records: Arc::new(records),
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            stall: false,
            null_when_exhausted: false,
            truncate_at: None,
            suffix: Bytes::new(),
            log: Arc::new(CallLog::default()),
        }
    }

    /// Size of the chunks streamed bodies are split into.
    pub fn with_chunk_bytes(mut self, bytes: usize) -> Self {
        self.chunk_bytes = bytes.max(1);
        self
    }

    /// Keyset requests ignore `lastId` and always return the first page.
    pub fn stalling(mut self) -> Self {
        self.stall = true;
        self
    }

    /// Pages past the end are returned as `null` instead of `[]`.
    pub fn null_when_exhausted(mut self) -> Self {
        self.null_when_exhausted = true;
        self
    }

    /// Streamed bodies end after `bytes` bytes.
    pub fn truncate_body_at(mut self, bytes: usize) -> Self {
        self.truncate_at = Some(bytes);
        self
    }

    /// Streamed bodies carry `suffix` after their payload.
    pub fn with_body_suffix(mut self, suffix: Bytes) -> Self {
        self.suffix = suffix;
        self
    }

    /// Cancels `token` while serving the `calls`-th call.
    pub fn cancel_after(self, calls: usize, token: CancellationToken) -> Self {
        *lock(&self.log.cancel_after) = Some((calls, token));
        self
    }

    /// Counts calls made after `token` is cancelled.
    pub fn watch(self, token: CancellationToken) -> Self {
        self.cancel_after(usize::MAX, token)
    }

    /// Every call after the first `calls` fails.
    pub fn failing_after(self, calls: usize) -> Self {
        *lock(&self.log.fail_after) = Some(calls);
        self
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn calls(&self) -> Vec<SourceCall> {
        lock(&self.log.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.log.calls).len()
    }

    pub fn calls_after_cancel(&self) -> usize {
        self.log.calls_after_cancel.load(Ordering::SeqCst)
    }

    fn page(&self, start: usize, page_size: u32) -> Option<Vec<Record>> {
        let page: Vec<_> = self
            .records
            .iter()
            .skip(start)
            .take(page_size as usize)
            .cloned()
            .collect();
        if page.is_empty() && self.null_when_exhausted {
            None
        } else {
            Some(page)
        }
    }

    fn body(&self, payload: Bytes) -> ByteStream {
        let mut payload = BytesMut::from(&payload[..]);
        payload.extend_from_slice(&self.suffix);
        if let Some(limit) = self.truncate_at {
            payload.truncate(limit);
        }
        let payload = payload.freeze();

        let chunks: Vec<Bytes> = (0..payload.len())
            .step_by(self.chunk_bytes)
            .map(|start| payload.slice(start..(start + self.chunk_bytes).min(payload.len())))
            .collect();

        let log = self.log.clone();
        stream::iter(chunks)
            .map(move |chunk| log.record(SourceCall::ReadChunk).map(|()| chunk))
            .boxed()
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn offset_page(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Option<Vec<Record>>, FetchError> {
        self.log.record(SourceCall::OffsetPage { page, page_size })?;
        let start = page.saturating_sub(1) as usize * page_size as usize;
        Ok(self.page(start, page_size))
    }

    async fn keyset_page(
        &self,
        last_id: Option<Uuid>,
        page_size: u32,
    ) -> Result<Option<Vec<Record>>, FetchError> {
        self.log.record(SourceCall::KeysetPage { last_id, page_size })?;
        let start = match last_id {
            Some(last) if !self.stall => self.records.partition_point(|r| r.id <= last),
            _ => 0,
        };
        Ok(self.page(start, page_size))
    }

    async fn open_stream(&self) -> Result<ByteStream, FetchError> {
        self.log.record(SourceCall::OpenStream)?;
        let payload = serde_json::to_vec(self.records.as_slice())
            .map_err(|e| FetchError::Source(e.to_string()))?;
        Ok(self.body(Bytes::from(payload)))
    }

    async fn open_binary_export(&self) -> Result<BinaryExportBody, FetchError> {
        self.log.record(SourceCall::OpenBinaryExport)?;
        let payload = encode_all(self.records.iter())?;
        Ok(BinaryExportBody::Payload(self.body(payload)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Truncate,
    SaveChanges(usize),
    BulkInsert(usize),
    SyncMetadata,
    BeginCopy(CopyFormat),
    FinishCopy { format: CopyFormat, rows: u64 },
}

#[derive(Default)]
struct StoreState {
    rows: Vec<Record>,
    ops: Vec<StoreOp>,
    ops_after_cancel: usize,
    writes: usize,
}

/// A destination table held in memory.
///
/// Copies only become visible when their writer finishes; the binary writer
/// decodes the payload it was sent rather than keeping the records.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
    watch: Option<CancellationToken>,
    cancel_on_write: Option<(usize, CancellationToken)>,
    fail_after_writes: Option<usize>,
    unreachable: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with `rows` already in the table.
    pub fn with_rows(self, rows: Vec<Record>) -> Self {
        lock(&self.state).rows = rows;
        self
    }

    /// Counts operations made after `token` is cancelled.
    pub fn watch(mut self, token: CancellationToken) -> Self {
        self.watch = Some(token);
        self
    }

    /// Cancels `token` while accepting the `write`-th row write, as if the
    /// run were stopped with that write in flight. The write itself succeeds.
    pub fn cancelling_on_write(mut self, write: usize, token: CancellationToken) -> Self {
        self.cancel_on_write = Some((write, token));
        self
    }

    /// Row writes after the first `writes` fail. Each saved or bulk-inserted
    /// batch and each copied row is one write.
    pub fn failing_after_writes(mut self, writes: usize) -> Self {
        self.fail_after_writes = Some(writes);
        self
    }

    /// Every truncate fails as if the database could not be reached.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn rows(&self) -> Vec<Record> {
        lock(&self.state).rows.clone()
    }

    pub fn ops(&self) -> Vec<StoreOp> {
        lock(&self.state).ops.clone()
    }

    /// Operations that persisted rows: saves, bulk inserts and finished copies.
    pub fn write_ops(&self) -> usize {
        lock(&self.state)
            .ops
            .iter()
            .filter(|op| {
                matches!(
                    op,
                    StoreOp::SaveChanges(_) | StoreOp::BulkInsert(_) | StoreOp::FinishCopy { .. }
                )
            })
            .count()
    }

    pub fn ops_after_cancel(&self) -> usize {
        lock(&self.state).ops_after_cancel
    }

    fn enter(&self) -> MutexGuard<'_, StoreState> {
        let mut state = lock(&self.state);
        if self.watch.as_ref().is_some_and(|t| t.is_cancelled()) {
            state.ops_after_cancel += 1;
        }
        state
    }

    fn check_write(&self, state: &mut StoreState) -> Result<(), StoreError> {
        state.writes += 1;
        if let Some((write, token)) = &self.cancel_on_write
            && state.writes == *write
        {
            token.cancel();
        }
        match self.fail_after_writes {
            Some(limit) if state.writes > limit => Err(StoreError::Rejected(format!(
                "injected failure on write {}",
                state.writes
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn truncate(&self) -> Result<(), StoreError> {
        let mut state = self.enter();
        if self.unreachable {
            return Err(StoreError::Rejected("destination unreachable".into()));
        }
        state.rows.clear();
        state.ops.push(StoreOp::Truncate);
        Ok(())
    }

    async fn save_changes(&self, records: &[Record]) -> Result<u64, StoreError> {
        let mut state = self.enter();
        self.check_write(&mut state)?;
        state.rows.extend_from_slice(records);
        state.ops.push(StoreOp::SaveChanges(records.len()));
        Ok(records.len() as u64)
    }

    async fn bulk_insert(&self, records: &[Record]) -> Result<u64, StoreError> {
        let mut state = self.enter();
        self.check_write(&mut state)?;
        state.rows.extend_from_slice(records);
        state.ops.push(StoreOp::BulkInsert(records.len()));
        Ok(records.len() as u64)
    }

    async fn sync_metadata(&self) -> Result<(), StoreError> {
        self.enter().ops.push(StoreOp::SyncMetadata);
        Ok(())
    }

    async fn begin_copy(&self, format: CopyFormat) -> Result<Box<dyn CopyWriter>, StoreError> {
        self.enter().ops.push(StoreOp::BeginCopy(format));

        let mut buf = BytesMut::new();
        if format == CopyFormat::Binary {
            encode_header(&mut buf);
        }
        Ok(Box::new(MemoryCopyWriter {
            store: self.clone(),
            format,
            encoder: PgCopyValueEncoder::new(),
            buf,
            pending: Vec::new(),
        }))
    }
}

struct MemoryCopyWriter {
    store: MemoryStore,
    format: CopyFormat,
    encoder: PgCopyValueEncoder,
    buf: BytesMut,
    pending: Vec<Record>,
}

impl MemoryCopyWriter {
    fn decode_binary(&self) -> Result<Vec<Record>, StoreError> {
        let mut decoder = BinaryRowDecoder::new();
        decoder.extend(&self.buf);

        let mut rows = Vec::new();
        while let Some(record) = decoder
            .decode_next()
            .map_err(|e| StoreError::Rejected(e.to_string()))?
        {
            rows.push(record);
        }
        decoder
            .finish()
            .map_err(|e| StoreError::Rejected(e.to_string()))?;
        Ok(rows)
    }
}

#[async_trait]
impl CopyWriter for MemoryCopyWriter {
    async fn write_record(&mut self, record: &Record) -> Result<(), StoreError> {
        {
            let mut state = self.store.enter();
            self.store.check_write(&mut state)?;
        }
        match self.format {
            CopyFormat::Csv => {
                self.encoder.encode_record(record, &mut self.buf);
                self.pending.push(record.clone());
            }
            CopyFormat::Binary => encode_row(record, &mut self.buf)
                .map_err(|e| StoreError::Rejected(e.to_string()))?,
        }
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<u64, StoreError> {
        let rows = match self.format {
            CopyFormat::Csv => std::mem::take(&mut self.pending),
            CopyFormat::Binary => {
                encode_trailer(&mut self.buf);
                self.decode_binary()?
            }
        };

        let written = rows.len() as u64;
        let mut state = self.store.enter();
        state.rows.extend(rows);
        state.ops.push(StoreOp::FinishCopy {
            format: self.format,
            rows: written,
        });
        Ok(written)
    }
}
