//! Fetch strategies: the producer side of the pipe.
//!
//! Every strategy turns a [`RecordSource`] into a lazy, ordered
//! [`RecordStream`]. Nothing is requested until the consumer polls, and the
//! cancellation token is checked before every network call.

use crate::{connectors::source::RecordSource, error::FetchError};
use futures::stream::BoxStream;
use model::{execution::strategy::FetchKind, records::record::Record};
use std::{future::Future, sync::Arc};
use tokio_util::sync::CancellationToken;

pub mod binary;
pub mod keyset;
pub mod offset;
pub mod stream;

pub use binary::BinaryExportFetch;
pub use keyset::KeysetPaging;
pub use offset::OffsetPaging;
pub use stream::ServerStream;

pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// The pipe between one producer and one consumer.
pub type RecordStream = BoxStream<'static, Result<Record, FetchError>>;

pub trait RecordProducer: Send + Sync {
    fn kind(&self) -> FetchKind;

    fn produce(&self, source: Arc<dyn RecordSource>, cancel: CancellationToken) -> RecordStream;
}

/// Builds the producer for `kind`.
pub fn producer_for(kind: FetchKind, page_size: u32) -> Box<dyn RecordProducer> {
    match kind {
        FetchKind::OffsetPaging => Box::new(OffsetPaging::new(page_size)),
        FetchKind::KeysetPaging => Box::new(KeysetPaging::new(page_size)),
        FetchKind::ServerStream => Box::new(ServerStream),
        FetchKind::BinaryExport => Box::new(BinaryExportFetch),
    }
}

/// Runs `fut` unless `cancel` fires first. A token that is already cancelled
/// wins without polling `fut`.
pub(crate) async fn until_cancelled<F>(cancel: &CancellationToken, fut: F) -> Option<F::Output>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = fut => Some(output),
    }
}
