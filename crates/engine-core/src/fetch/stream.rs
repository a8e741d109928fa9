use crate::{
    connectors::source::RecordSource,
    error::FetchError,
    fetch::{RecordProducer, RecordStream, until_cancelled},
};
use async_stream::stream;
use connectors::http::json_stream::JsonArrayDecoder;
use futures::StreamExt;
use model::{execution::strategy::FetchKind, records::record::Record};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One long-lived request whose body is a JSON array of records.
///
/// The body is read only when the decoder has no complete element buffered,
/// so the source is never read further ahead than the consumer pulls.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerStream;

impl RecordProducer for ServerStream {
    fn kind(&self) -> FetchKind {
        FetchKind::ServerStream
    }

    fn produce(&self, source: Arc<dyn RecordSource>, cancel: CancellationToken) -> RecordStream {
        Box::pin(stream! {
            let mut body = match until_cancelled(&cancel, source.open_stream()).await {
                Some(Ok(body)) => body,
                Some(Err(err)) => {
                    yield Err(err);
                    return;
                }
                None => {
                    yield Err(FetchError::Cancelled);
                    return;
                }
            };

            let mut decoder = JsonArrayDecoder::<Record>::new();
            let mut yielded = 0u64;

            loop {
                loop {
                    match decoder.decode_next() {
                        Ok(Some(record)) => {
                            yielded += 1;
                            yield Ok(record);
                        }
                        Ok(None) => break,
                        Err(err) => {
                            yield Err(FetchError::from(err));
                            return;
                        }
                    }
                }

                match until_cancelled(&cancel, body.next()).await {
                    Some(Some(Ok(chunk))) => decoder.extend(&chunk),
                    Some(Some(Err(err))) => {
                        yield Err(err);
                        return;
                    }
                    Some(None) => break,
                    None => {
                        yield Err(FetchError::Cancelled);
                        return;
                    }
                }
            }

            if let Err(err) = decoder.finish() {
                yield Err(FetchError::from(err));
                return;
            }
            debug!(rows = yielded, "Record stream closed");
        })
    }
}
