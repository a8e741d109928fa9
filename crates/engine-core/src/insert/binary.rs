use crate::{
    connectors::destination::{CopyFormat, RecordStore},
    error::InsertError,
    fetch::RecordStream,
    insert::{InsertSummary, RecordConsumer, copy_all},
};
use async_trait::async_trait;
use model::execution::strategy::InsertKind;
use tokio_util::sync::CancellationToken;

/// One binary `COPY FROM STDIN` on a dedicated connection. Rows are written
/// in fixed column order as they arrive; the trailer goes out when the
/// sequence ends.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryImport;

#[async_trait]
impl RecordConsumer for BinaryImport {
    fn kind(&self) -> InsertKind {
        InsertKind::BinaryImport
    }

    async fn consume(
        &self,
        store: &dyn RecordStore,
        records: RecordStream,
        cancel: &CancellationToken,
    ) -> Result<InsertSummary, InsertError> {
        copy_all(store, CopyFormat::Binary, records, cancel).await
    }
}
