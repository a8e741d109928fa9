use crate::http::error::HttpError;
use bytes::Bytes;
use futures_util::{StreamExt, stream::BoxStream};
use model::records::record::Record;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

pub const OFFSET_PAGING_PATH: &str = "offset-paging";
pub const KEYSET_PAGING_PATH: &str = "keyset-paging";
pub const DEFAULT_STREAM_PATH: &str = "ef-core-stream";
pub const DEFAULT_BINARY_EXPORT_PATH: &str = "binary-export";

/// Client for the HTTP data source.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone, Debug)]
pub struct HttpSource {
    client: Client,
    base_url: Url,
    stream_path: String,
    binary_export_path: String,
}

impl HttpSource {
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, HttpError> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Self::with_client(client, base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self, HttpError> {
        // A trailing slash keeps `Url::join` from replacing the last path segment.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized).map_err(|e| HttpError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            client,
            base_url,
            stream_path: DEFAULT_STREAM_PATH.to_string(),
            binary_export_path: DEFAULT_BINARY_EXPORT_PATH.to_string(),
        })
    }

    /// Path of the streamed JSON listing, relative to the base URL.
    pub fn with_stream_path(mut self, path: impl Into<String>) -> Self {
        self.stream_path = path.into();
        self
    }

    /// Path of the raw binary COPY listing, relative to the base URL.
    pub fn with_binary_export_path(mut self, path: impl Into<String>) -> Self {
        self.binary_export_path = path.into();
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, HttpError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| HttpError::InvalidUrl {
                url: format!("{}{path}", self.base_url),
                reason: e.to_string(),
            })
    }

    /// `GET /offset-paging?page=&pageSize=`. A `null` body is returned as `None`.
    pub async fn offset_page(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Option<Vec<Record>>, HttpError> {
        let url = self.endpoint(OFFSET_PAGING_PATH)?;
        debug!(%url, page, page_size, "Requesting offset page");

        let records = self
            .client
            .get(url)
            .query(&[("page", page.to_string()), ("pageSize", page_size.to_string())])
            .send()
            .await?
            .error_for_status()?
            .json::<Option<Vec<Record>>>()
            .await?;
        Ok(records)
    }

    /// `GET /keyset-paging?pageSize=[&lastId=]`. `lastId` is omitted for the first page.
    pub async fn keyset_page(
        &self,
        last_id: Option<Uuid>,
        page_size: u32,
    ) -> Result<Option<Vec<Record>>, HttpError> {
        let url = self.endpoint(KEYSET_PAGING_PATH)?;
        debug!(%url, ?last_id, page_size, "Requesting keyset page");

        let mut query = vec![("pageSize", page_size.to_string())];
        if let Some(last_id) = last_id {
            query.push(("lastId", last_id.to_string()));
        }

        let records = self
            .client
            .get(url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json::<Option<Vec<Record>>>()
            .await?;
        Ok(records)
    }

    /// Opens the streamed listing (`GET /ef-core-stream` unless overridden)
    /// and returns its body as it arrives.
    pub async fn open_stream(
        &self,
    ) -> Result<BoxStream<'static, Result<Bytes, HttpError>>, HttpError> {
        self.open_body(&self.stream_path).await
    }

    /// Opens the binary listing (`GET /binary-export` unless overridden) and
    /// returns the raw COPY payload as it arrives.
    pub async fn open_binary_export(
        &self,
    ) -> Result<BoxStream<'static, Result<Bytes, HttpError>>, HttpError> {
        self.open_body(&self.binary_export_path).await
    }

    async fn open_body(
        &self,
        path: &str,
    ) -> Result<BoxStream<'static, Result<Bytes, HttpError>>, HttpError> {
        let url = self.endpoint(path)?;
        debug!(%url, "Opening streamed response");

        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(HttpError::from))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_are_joined_under_base_path() {
        let source = HttpSource::with_client(Client::new(), "http://localhost:5080/api").unwrap();
        assert_eq!(
            source.endpoint(OFFSET_PAGING_PATH).unwrap().as_str(),
            "http://localhost:5080/api/offset-paging"
        );

        let source = HttpSource::with_client(Client::new(), "http://localhost:5080").unwrap();
        assert_eq!(
            source.endpoint(&source.binary_export_path).unwrap().as_str(),
            "http://localhost:5080/binary-export"
        );
    }

    #[test]
    fn test_stream_path_defaults_to_source_server_route() {
        let source = HttpSource::with_client(Client::new(), "http://localhost:5080").unwrap();
        assert_eq!(
            source.endpoint(&source.stream_path).unwrap().as_str(),
            "http://localhost:5080/ef-core-stream"
        );

        let source = source
            .with_stream_path("/stream")
            .with_binary_export_path("copy/binary");
        assert_eq!(
            source.endpoint(&source.stream_path).unwrap().as_str(),
            "http://localhost:5080/stream"
        );
        assert_eq!(
            source.endpoint(&source.binary_export_path).unwrap().as_str(),
            "http://localhost:5080/copy/binary"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = HttpSource::with_client(Client::new(), "not a url").unwrap_err();
        assert!(matches!(err, HttpError::InvalidUrl { .. }));
    }
}
