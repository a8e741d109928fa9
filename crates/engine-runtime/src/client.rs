use engine_core::{
    connectors::source::RecordSource,
    fetch::{RecordStream, producer_for},
};
use model::execution::strategy::FetchKind;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Turns the remote source into a record stream with one fetch strategy.
#[derive(Clone)]
pub struct SourceClient {
    source: Arc<dyn RecordSource>,
    page_size: u32,
}

impl SourceClient {
    pub fn new(source: Arc<dyn RecordSource>, page_size: u32) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
        }
    }

    /// Nothing is requested until the returned stream is polled.
    pub fn fetch(&self, kind: FetchKind, cancel: &CancellationToken) -> RecordStream {
        producer_for(kind, self.page_size).produce(self.source.clone(), cancel.clone())
    }
}
