use crate::{
    connectors::destination::{CopyFormat, RecordStore},
    error::InsertError,
    fetch::RecordStream,
    insert::{InsertSummary, RecordConsumer, copy_all},
};
use async_trait::async_trait;
use model::execution::strategy::InsertKind;
use tokio_util::sync::CancellationToken;

/// One CSV `COPY FROM STDIN` for the whole run. Chunking is left to the
/// store's writer.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkCopy;

#[async_trait]
impl RecordConsumer for BulkCopy {
    fn kind(&self) -> InsertKind {
        InsertKind::Copy
    }

    async fn consume(
        &self,
        store: &dyn RecordStore,
        records: RecordStream,
        cancel: &CancellationToken,
    ) -> Result<InsertSummary, InsertError> {
        copy_all(store, CopyFormat::Csv, records, cancel).await
    }
}
