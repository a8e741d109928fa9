//! Insert strategies: the consumer side of the pipe.

use crate::{
    connectors::destination::{CopyFormat, CopyWriter, RecordStore},
    error::InsertError,
    fetch::RecordStream,
};
use async_trait::async_trait;
use futures::StreamExt;
use model::{execution::strategy::InsertKind, records::record::Record};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub mod binary;
pub mod bulk;
pub mod copy;
pub mod tracked;

pub use binary::BinaryImport;
pub use bulk::BufferedBulk;
pub use copy::BulkCopy;
pub use tracked::TrackedWrites;

pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// What a consumer did with the sequence it drained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertSummary {
    pub rows_written: u64,
    /// Batches flushed or copies completed.
    pub write_ops: u64,
}

#[async_trait]
pub trait RecordConsumer: Send + Sync {
    fn kind(&self) -> InsertKind;

    async fn consume(
        &self,
        store: &dyn RecordStore,
        records: RecordStream,
        cancel: &CancellationToken,
    ) -> Result<InsertSummary, InsertError>;
}

/// Builds the consumer for `kind`.
pub fn consumer_for(kind: InsertKind, batch_size: usize) -> Box<dyn RecordConsumer> {
    match kind {
        InsertKind::Tracked => Box::new(TrackedWrites::new(batch_size)),
        InsertKind::Bulk => Box::new(BufferedBulk::new(batch_size)),
        InsertKind::Copy => Box::new(BulkCopy),
        InsertKind::BinaryImport => Box::new(BinaryImport),
    }
}

/// Pulls the next record unless the run is cancelled first.
pub(crate) async fn next_record(
    records: &mut RecordStream,
    cancel: &CancellationToken,
) -> Result<Option<Record>, InsertError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(InsertError::Cancelled),
        next = records.next() => Ok(next.transpose()?),
    }
}

pub(crate) fn ensure_active(cancel: &CancellationToken) -> Result<(), InsertError> {
    if cancel.is_cancelled() {
        Err(InsertError::Cancelled)
    } else {
        Ok(())
    }
}

/// Streams the whole sequence through a single copy. The copy is only
/// started once the first record arrives, and is dropped (aborted) on error
/// or cancellation.
pub(crate) async fn copy_all(
    store: &dyn RecordStore,
    format: CopyFormat,
    mut records: RecordStream,
    cancel: &CancellationToken,
) -> Result<InsertSummary, InsertError> {
    let mut writer: Option<Box<dyn CopyWriter>> = None;

    while let Some(record) = next_record(&mut records, cancel).await? {
        ensure_active(cancel)?;
        let active = match &mut writer {
            Some(active) => active,
            slot => {
                debug!(%format, "Starting copy");
                let started = slot.insert(store.begin_copy(format).await?);
                ensure_active(cancel)?;
                started
            }
        };
        active.write_record(&record).await?;
    }

    let Some(writer) = writer else {
        return Ok(InsertSummary::default());
    };
    ensure_active(cancel)?;
    let rows_written = writer.finish().await?;
    Ok(InsertSummary {
        rows_written,
        write_ops: 1,
    })
}
