use crate::{
    connectors::source::{BinaryExportBody, RecordSource},
    error::FetchError,
    fetch::{RecordProducer, RecordStream, until_cancelled},
};
use async_stream::stream;
use connectors::sql::postgres::binary::BinaryRowDecoder;
use futures::StreamExt;
use model::execution::strategy::FetchKind;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Reads a PostgreSQL binary COPY export row by row.
///
/// A raw payload is decoded here and read to the end of the body, so bytes
/// after the trailer are reported. Rows the database driver already decoded
/// are passed through.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryExportFetch;

impl RecordProducer for BinaryExportFetch {
    fn kind(&self) -> FetchKind {
        FetchKind::BinaryExport
    }

    fn produce(&self, source: Arc<dyn RecordSource>, cancel: CancellationToken) -> RecordStream {
        Box::pin(stream! {
            let body = match until_cancelled(&cancel, source.open_binary_export()).await {
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

            match body {
                BinaryExportBody::Payload(mut payload) => {
                    let mut decoder = BinaryRowDecoder::new();

                    loop {
                        loop {
                            match decoder.decode_next() {
                                Ok(Some(record)) => yield Ok(record),
                                Ok(None) => break,
                                Err(err) => {
                                    yield Err(FetchError::from(err));
                                    return;
                                }
                            }
                        }

                        match until_cancelled(&cancel, payload.next()).await {
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
                    debug!(rows = decoder.rows_decoded(), "Binary export decoded");
                }
                BinaryExportBody::Rows(mut rows) => {
                    let mut yielded = 0u64;

                    loop {
                        match until_cancelled(&cancel, rows.next()).await {
                            Some(Some(Ok(record))) => {
                                yielded += 1;
                                yield Ok(record);
                            }
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
                    debug!(rows = yielded, "Binary export read from source database");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemorySource, SourceCall, sample_records};
    use bytes::Bytes;
    use connectors::sql::postgres::binary::{CodecError, encode_all};

    #[tokio::test]
    async fn test_decodes_all_fields_across_chunks() {
        let records = sample_records(250);
        for chunk in [1, 13, 4096] {
            let source = Arc::new(MemorySource::new(records.clone()).with_chunk_bytes(chunk));
            let stream = BinaryExportFetch.produce(source, CancellationToken::new());

            let fetched: Vec<_> = stream.map(|r| r.unwrap()).collect().await;
            assert_eq!(fetched, records, "chunk size {chunk}");
        }
    }

    #[tokio::test]
    async fn test_empty_export() {
        let source = Arc::new(MemorySource::new(Vec::new()));
        let stream = BinaryExportFetch.produce(source, CancellationToken::new());

        assert_eq!(stream.count().await, 0);
    }

    #[tokio::test]
    async fn test_missing_trailer_is_an_error() {
        let records = sample_records(3);
        let full_len = encode_all(&records).unwrap().len();
        let source = Arc::new(MemorySource::new(records).truncate_body_at(full_len - 2));
        let stream = BinaryExportFetch.produce(source, CancellationToken::new());

        let items: Vec<_> = stream.collect().await;

        assert_eq!(items.len(), 4);
        assert!(matches!(
            items[3],
            Err(FetchError::Codec(CodecError::MissingTrailer))
        ));
    }

    #[tokio::test]
    async fn test_bytes_after_the_trailer_in_a_later_chunk_are_an_error() {
        let records = sample_records(3);
        let payload_len = encode_all(&records).unwrap().len();
        let source = Arc::new(
            MemorySource::new(records.clone())
                .with_chunk_bytes(payload_len)
                .with_body_suffix(Bytes::from_static(b"xyz")),
        );
        let stream = BinaryExportFetch.produce(source.clone(), CancellationToken::new());

        let items: Vec<_> = stream.collect().await;

        assert_eq!(items.len(), 4);
        assert!(items[..3].iter().all(|r| r.is_ok()));
        assert!(matches!(
            items[3],
            Err(FetchError::Codec(CodecError::TrailingData(3)))
        ));
        let reads = source
            .calls()
            .iter()
            .filter(|call| **call == SourceCall::ReadChunk)
            .count();
        assert_eq!(reads, 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_export_opens() {
        let source = Arc::new(MemorySource::new(sample_records(5)));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let items: Vec<_> = BinaryExportFetch.produce(source.clone(), cancel).collect().await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(FetchError::Cancelled)));
        assert_eq!(source.call_count(), 0);
    }
}
