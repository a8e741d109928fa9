use crate::{
    connectors::destination::RecordStore,
    error::InsertError,
    fetch::RecordStream,
    insert::{
        DEFAULT_BATCH_SIZE, InsertSummary, RecordConsumer, ensure_active, next_record,
    },
};
use async_trait::async_trait;
use model::{
    execution::strategy::InsertKind,
    records::{batch::Batch, record::Record},
};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Pending inserts keyed by identity, cleared after every save.
#[derive(Debug)]
pub struct ChangeTracker {
    identities: HashSet<Uuid>,
    pending: Batch,
}

impl ChangeTracker {
    pub fn new(capacity: usize) -> Self {
        let pending = Batch::new(capacity);
        Self {
            identities: HashSet::with_capacity(pending.capacity()),
            pending,
        }
    }

    /// Starts tracking `record`. Returns `true` once the tracker is full.
    pub fn track(&mut self, record: Record) -> Result<bool, InsertError> {
        if !self.identities.insert(record.id) {
            return Err(InsertError::IdentityConflict(record.id));
        }
        Ok(self.pending.push(record))
    }

    pub fn pending(&self) -> &[Record] {
        self.pending.records()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.identities.clear();
        self.pending.clear();
    }
}

/// Row-by-row writes through a change tracker, saved every `batch_size`
/// records and once more for the remainder.
#[derive(Debug, Clone)]
pub struct TrackedWrites {
    batch_size: usize,
}

impl TrackedWrites {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    async fn save(
        &self,
        store: &dyn RecordStore,
        tracker: &mut ChangeTracker,
        summary: &mut InsertSummary,
        cancel: &CancellationToken,
    ) -> Result<(), InsertError> {
        ensure_active(cancel)?;
        let written = store.save_changes(tracker.pending()).await?;
        debug!(rows = written, "Saved tracked changes");
        summary.rows_written += written;
        summary.write_ops += 1;
        tracker.clear();
        Ok(())
    }
}

impl Default for TrackedWrites {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

#[async_trait]
impl RecordConsumer for TrackedWrites {
    fn kind(&self) -> InsertKind {
        InsertKind::Tracked
    }

    async fn consume(
        &self,
        store: &dyn RecordStore,
        mut records: RecordStream,
        cancel: &CancellationToken,
    ) -> Result<InsertSummary, InsertError> {
        let mut tracker = ChangeTracker::new(self.batch_size);
        let mut summary = InsertSummary::default();

        while let Some(record) = next_record(&mut records, cancel).await? {
            if tracker.track(record)? {
                self.save(store, &mut tracker, &mut summary, cancel).await?;
            }
        }

        if !tracker.is_empty() {
            self.save(store, &mut tracker, &mut summary, cancel).await?;
        }
        Ok(summary)
    }
}
