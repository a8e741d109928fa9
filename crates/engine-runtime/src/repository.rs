use crate::error::BenchmarkError;
use engine_core::{
    connectors::destination::RecordStore,
    fetch::RecordStream,
    insert::{InsertSummary, consumer_for},
};
use model::execution::strategy::InsertKind;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The destination table plus the insert strategy that writes to it.
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn RecordStore>,
    batch_size: usize,
}

impl Repository {
    pub fn new(store: Arc<dyn RecordStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Truncates the destination table.
    pub async fn clear_destination(&self, cancel: &CancellationToken) -> Result<(), BenchmarkError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BenchmarkError::Cancelled),
            result = self.store.truncate() => result.map_err(BenchmarkError::Clear),
        }
    }

    /// Drains `records` into the destination with exactly one insert strategy.
    pub async fn persist(
        &self,
        records: RecordStream,
        kind: InsertKind,
        cancel: &CancellationToken,
    ) -> Result<InsertSummary, BenchmarkError> {
        debug!(insert = %kind, batch_size = self.batch_size, "Persisting record stream");
        let consumer = consumer_for(kind, self.batch_size);
        Ok(consumer.consume(self.store.as_ref(), records, cancel).await?)
    }
}
