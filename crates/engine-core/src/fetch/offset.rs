use crate::{
    connectors::source::RecordSource,
    error::FetchError,
    fetch::{DEFAULT_PAGE_SIZE, RecordProducer, RecordStream, until_cancelled},
};
use async_stream::stream;
use model::{execution::strategy::FetchKind, pagination::cursor::FetchCursor};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// `page=1, 2, ...` until the source answers with an empty or null page.
#[derive(Debug, Clone)]
pub struct OffsetPaging {
    page_size: u32,
}

impl OffsetPaging {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }
}

impl Default for OffsetPaging {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl RecordProducer for OffsetPaging {
    fn kind(&self) -> FetchKind {
        FetchKind::OffsetPaging
    }

    fn produce(&self, source: Arc<dyn RecordSource>, cancel: CancellationToken) -> RecordStream {
        let page_size = self.page_size;

        Box::pin(stream! {
            let mut cursor = FetchCursor::first_page();

            while let Some(page) = cursor.page() {
                let response = match until_cancelled(&cancel, source.offset_page(page, page_size)).await {
                    Some(response) => response,
                    None => {
                        yield Err(FetchError::Cancelled);
                        return;
                    }
                };

                let records = match response {
                    Ok(Some(records)) if !records.is_empty() => records,
                    Ok(_) => {
                        debug!(page, "Offset paging exhausted");
                        return;
                    }
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                };

                debug!(page, rows = records.len(), "Fetched offset page");
                for record in records {
                    yield Ok(record);
                }
                cursor.next_page();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemorySource, SourceCall, sample_records};
    use futures::StreamExt;

    #[tokio::test]
    async fn test_full_pages_then_terminating_request() {
        let source = Arc::new(MemorySource::new(sample_records(3000)));
        let stream = OffsetPaging::new(1000).produce(source.clone(), CancellationToken::new());

        let records: Vec<_> = stream.map(|r| r.unwrap()).collect().await;

        assert_eq!(records.len(), 3000);
        assert!(records.windows(2).all(|w| w[0].id < w[1].id));

        let pages: Vec<_> = source
            .calls()
            .into_iter()
            .map(|call| match call {
                SourceCall::OffsetPage { page, page_size } => {
                    assert_eq!(page_size, 1000);
                    page
                }
                other => panic!("unexpected call {other:?}"),
            })
            .collect();
        assert_eq!(pages, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_null_page_ends_the_sequence() {
        let source = Arc::new(MemorySource::new(sample_records(5)).null_when_exhausted());
        let stream = OffsetPaging::new(2).produce(source.clone(), CancellationToken::new());

        let records: Vec<_> = stream.collect().await;

        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| r.is_ok()));
        assert_eq!(source.call_count(), 4);
    }

    #[tokio::test]
    async fn test_empty_source_issues_a_single_request() {
        let source = Arc::new(MemorySource::new(Vec::new()));
        let stream = OffsetPaging::default().produce(source.clone(), CancellationToken::new());

        assert_eq!(stream.count().await, 0);
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_request() {
        let source = Arc::new(MemorySource::new(sample_records(10)));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut stream = OffsetPaging::new(5).produce(source.clone(), cancel);

        assert!(matches!(stream.next().await, Some(Err(FetchError::Cancelled))));
        assert!(stream.next().await.is_none());
        assert_eq!(source.call_count(), 0);
    }

    #[tokio::test]
    async fn test_source_error_ends_the_sequence() {
        let source = Arc::new(MemorySource::new(sample_records(10)).failing_after(1));
        let stream = OffsetPaging::new(5).produce(source.clone(), CancellationToken::new());

        let items: Vec<_> = stream.collect().await;

        assert_eq!(items.len(), 6);
        assert!(items[..5].iter().all(|r| r.is_ok()));
        assert!(matches!(items[5], Err(FetchError::Source(_))));
    }
}
