use crate::{
    connectors::source::RecordSource,
    error::FetchError,
    fetch::{DEFAULT_PAGE_SIZE, RecordProducer, RecordStream, until_cancelled},
};
use async_stream::stream;
use model::{execution::strategy::FetchKind, pagination::cursor::FetchCursor};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Pages by the last identifier seen.
///
/// Stops on an empty or null page, or when a page fails to move the cursor
/// forward. A page that does not advance is dropped rather than yielded.
#[derive(Debug, Clone)]
pub struct KeysetPaging {
    page_size: u32,
}

impl KeysetPaging {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }
}

impl Default for KeysetPaging {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl RecordProducer for KeysetPaging {
    fn kind(&self) -> FetchKind {
        FetchKind::KeysetPaging
    }

    fn produce(&self, source: Arc<dyn RecordSource>, cancel: CancellationToken) -> RecordStream {
        let page_size = self.page_size;

        Box::pin(stream! {
            let mut cursor = FetchCursor::keyset_start();

            loop {
                let last_id = cursor.last_id();
                let response = match until_cancelled(&cancel, source.keyset_page(last_id, page_size)).await {
                    Some(response) => response,
                    None => {
                        yield Err(FetchError::Cancelled);
                        return;
                    }
                };

                let records = match response {
                    Ok(Some(records)) => records,
                    Ok(None) => Vec::new(),
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                };

                let Some(last) = records.last().map(|r| r.id) else {
                    debug!(%cursor, "Keyset paging exhausted");
                    return;
                };

                if !cursor.advance_to(last) {
                    warn!(%cursor, %last, "Keyset cursor did not advance, stopping");
                    return;
                }

                debug!(%cursor, rows = records.len(), "Fetched keyset page");
                for record in records {
                    yield Ok(record);
                }
            }
        })
    }
}
