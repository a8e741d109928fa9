use crate::{
    connectors::destination::RecordStore,
    error::InsertError,
    fetch::RecordStream,
    insert::{
        DEFAULT_BATCH_SIZE, InsertSummary, RecordConsumer, ensure_active, next_record,
    },
};
use async_trait::async_trait;
use model::{execution::strategy::InsertKind, records::batch::Batch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Buffers records and flushes each full buffer with one bulk insert
/// followed by a statistics refresh. Each flush commits on its own.
#[derive(Debug, Clone)]
pub struct BufferedBulk {
    batch_size: usize,
}

impl BufferedBulk {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    async fn flush(
        &self,
        store: &dyn RecordStore,
        batch: &mut Batch,
        summary: &mut InsertSummary,
        cancel: &CancellationToken,
    ) -> Result<(), InsertError> {
        ensure_active(cancel)?;
        let written = store.bulk_insert(batch.records()).await?;
        ensure_active(cancel)?;
        store.sync_metadata().await?;
        debug!(rows = written, bytes = batch.size_bytes(), "Flushed bulk batch");

        summary.rows_written += written;
        summary.write_ops += 1;
        batch.clear();
        Ok(())
    }
}

impl Default for BufferedBulk {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

#[async_trait]
impl RecordConsumer for BufferedBulk {
    fn kind(&self) -> InsertKind {
        InsertKind::Bulk
    }

    async fn consume(
        &self,
        store: &dyn RecordStore,
        mut records: RecordStream,
        cancel: &CancellationToken,
    ) -> Result<InsertSummary, InsertError> {
        let mut batch = Batch::new(self.batch_size);
        let mut summary = InsertSummary::default();

        while let Some(record) = next_record(&mut records, cancel).await? {
            if batch.push(record) {
                self.flush(store, &mut batch, &mut summary, cancel).await?;
            }
        }

        if !batch.is_empty() {
            self.flush(store, &mut batch, &mut summary, cancel).await?;
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::FetchError,
        testing::{MemoryStore, StoreOp, records_stream, sample_records},
    };
    use futures::StreamExt;

    #[tokio::test]
    async fn test_each_flush_is_followed_by_metadata_sync() {
        let records = sample_records(7);
        let store = MemoryStore::new();

        let summary = BufferedBulk::new(3)
            .consume(&store, records_stream(records.clone()), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary, InsertSummary { rows_written: 7, write_ops: 3 });
        assert_eq!(store.rows(), records);
        assert_eq!(
            store.ops(),
            vec![
                StoreOp::BulkInsert(3),
                StoreOp::SyncMetadata,
                StoreOp::BulkInsert(3),
                StoreOp::SyncMetadata,
                StoreOp::BulkInsert(1),
                StoreOp::SyncMetadata,
            ]
        );
    }

    #[tokio::test]
    async fn test_fewer_records_than_capacity_flush_once_at_end() {
        let store = MemoryStore::new();

        let summary = BufferedBulk::default()
            .consume(&store, records_stream(sample_records(2500)), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.write_ops, 1);
        assert_eq!(store.rows().len(), 2500);
    }

    #[tokio::test]
    async fn test_fetch_error_after_a_flush_keeps_the_flushed_batch() {
        let records = sample_records(4);
        let failing = futures::stream::iter(records.clone().into_iter().map(Ok))
            .chain(futures::stream::once(async {
                Err(FetchError::Source("connection reset".into()))
            }))
            .boxed();
        let store = MemoryStore::new();

        let err = BufferedBulk::new(2)
            .consume(&store, failing, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, InsertError::Fetch(FetchError::Source(_))));
        assert_eq!(store.rows(), records);
    }

    #[tokio::test]
    async fn test_cancelled_run_does_not_flush() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = BufferedBulk::new(2)
            .consume(&store, records_stream(sample_records(3)), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(store.ops().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_bulk_insert_skips_metadata_sync() {
        let cancel = CancellationToken::new();
        let store = MemoryStore::new()
            .watch(cancel.clone())
            .cancelling_on_write(1, cancel.clone());

        let err = BufferedBulk::new(2)
            .consume(&store, records_stream(sample_records(5)), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(store.ops(), vec![StoreOp::BulkInsert(2)]);
        assert_eq!(store.ops_after_cancel(), 0);
    }
}
