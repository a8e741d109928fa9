use crate::sql::{
    base::error::{ConnectorError, DbError},
    postgres::{
        binary::{RECORD_TYPES, record_params},
        query,
        utils::connect_client,
    },
};
use bytes::Bytes;
use futures_util::{StreamExt, stream::BoxStream};
use model::records::record::Record;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_postgres::{
    Client, CopyInSink, Row,
    binary_copy::{BinaryCopyOutRow, BinaryCopyOutStream},
};
use tracing::debug;

/// Process-wide PostgreSQL handle.
///
/// The shared client serves truncates, inserts and text copies; binary COPY
/// runs on a dedicated connection opened through [`PgAdapter::connect_dedicated`].
#[derive(Clone)]
pub struct PgAdapter {
    client: Arc<RwLock<Client>>,
    url: Arc<str>,
}

impl PgAdapter {
    pub async fn connect(url: &str) -> Result<Self, ConnectorError> {
        let client = Arc::new(RwLock::new(connect_client(url).await?));
        Ok(PgAdapter {
            client,
            url: Arc::from(url),
        })
    }

    /// Opens a fresh connection with the same connection string.
    pub async fn connect_dedicated(&self) -> Result<Client, ConnectorError> {
        connect_client(&self.url).await
    }

    pub async fn exec(&self, query: &str) -> Result<(), DbError> {
        let client = self.client.read().await;
        client.batch_execute(query).await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), DbError> {
        let client = self.client.read().await;
        let row = client.query_one("SELECT 1", &[]).await?;
        let val: i32 = row.get(0);
        if val != 1 {
            return Err(DbError::Write(format!("ping returned {val}")));
        }
        Ok(())
    }

    pub async fn truncate_table(&self, table: &str) -> Result<(), DbError> {
        self.exec(&query::truncate(table)).await
    }

    pub async fn analyze_table(&self, table: &str) -> Result<(), DbError> {
        self.exec(&query::analyze(table)).await
    }

    /// Inserts every row with its own `INSERT` inside one transaction.
    pub async fn insert_rows(&self, table: &str, rows: &[Record]) -> Result<u64, DbError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut client = self.client.write().await;
        let tx = client.transaction().await?;
        let statement = tx.prepare(&query::insert_values(table, 1)).await?;

        let mut written = 0;
        for row in rows {
            written += tx.execute(&statement, &record_params(row)).await?;
        }
        tx.commit().await?;

        debug!(table, rows = written, "Row-by-row insert committed");
        Ok(written)
    }

    /// Inserts rows with multi-row `INSERT ... VALUES` statements, chunked to
    /// stay under the bind parameter limit, inside one transaction.
    pub async fn bulk_insert(&self, table: &str, rows: &[Record]) -> Result<u64, DbError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut client = self.client.write().await;
        let tx = client.transaction().await?;

        let mut written = 0;
        for chunk in rows.chunks(query::MAX_ROWS_PER_INSERT) {
            let sql = query::insert_values(table, chunk.len());
            let params = chunk.iter().flat_map(record_params).collect::<Vec<_>>();
            written += tx.execute(sql.as_str(), &params).await?;
        }
        tx.commit().await?;

        if written != rows.len() as u64 {
            return Err(DbError::Write(format!(
                "bulk insert wrote {written} of {} rows",
                rows.len()
            )));
        }

        debug!(table, rows = written, "Bulk insert committed");
        Ok(written)
    }

    /// Starts a `COPY ... FROM STDIN` on the shared client.
    pub async fn copy_in(&self, statement: &str) -> Result<CopyInSink<Bytes>, DbError> {
        debug!("COPY statement: {}", statement);
        let client = self.client.read().await;
        Ok(client.copy_in(statement).await?)
    }

    pub async fn fetch_all(&self, table: &str) -> Result<Vec<Record>, DbError> {
        let client = self.client.read().await;
        let rows = client.query(&query::select_all_ordered(table), &[]).await?;
        rows.iter().map(record_from_row).collect()
    }

    pub async fn row_count(&self, table: &str) -> Result<i64, DbError> {
        let client = self.client.read().await;
        let row = client.query_one(&query::count_rows(table), &[]).await?;
        Ok(row.try_get(0)?)
    }
}

/// Streams a binary `COPY ... TO STDOUT` of `table` over `client`, one
/// record per row.
///
/// The client is moved into the stream so the connection outlives the export.
pub async fn copy_out_binary(
    client: Client,
    table: &str,
) -> Result<BoxStream<'static, Result<Record, DbError>>, DbError> {
    let statement = query::copy_out_binary(table);
    debug!("COPY statement: {}", statement);

    let stream = client.copy_out(statement.as_str()).await?;
    let rows = BinaryCopyOutStream::new(stream, &RECORD_TYPES).map(move |row| {
        let _keep_alive = &client;
        record_from_copy_row(&row?)
    });
    Ok(rows.boxed())
}

fn record_from_row(row: &Row) -> Result<Record, DbError> {
    Ok(Record {
        id: row.try_get("id")?,
        surname: row.try_get("surname")?,
        name: row.try_get("name")?,
        patronymic: row.try_get("patronymic")?,
        created_at: row.try_get("created_at")?,
        is_active: row.try_get("is_active")?,
    })
}

fn record_from_copy_row(row: &BinaryCopyOutRow) -> Result<Record, DbError> {
    Ok(Record {
        id: row.try_get(0)?,
        surname: row.try_get(1)?,
        name: row.try_get(2)?,
        patronymic: row.try_get(3)?,
        created_at: row.try_get(4)?,
        is_active: row.try_get(5)?,
    })
}
