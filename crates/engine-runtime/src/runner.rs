use crate::{client::SourceClient, error::BenchmarkError, repository::Repository};
use connectors::{http::source::HttpSource, sql::postgres::adapter::PgAdapter};
use engine_config::settings::Settings;
use engine_core::connectors::{
    destination::PgStore,
    source::{BinaryExport, HttpRecordSource},
};
use model::execution::strategy::{FetchKind, InsertKind};
use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Clearing,
    Timing,
    Completed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Clearing => "clearing",
            RunState::Timing => "timing",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunReport {
    pub fetch: FetchKind,
    pub insert: InsertKind,
    pub elapsed: Duration,
    pub rows_written: u64,
    pub write_ops: u64,
}

impl RunReport {
    pub fn rows_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.rows_written as f64 / secs
        } else {
            0.0
        }
    }
}

/// Clears the destination, then times one fetch strategy piped straight into
/// one insert strategy.
pub struct Runner {
    repository: Repository,
    client: SourceClient,
    state: RunState,
}

impl Runner {
    pub fn new(repository: Repository, client: SourceClient) -> Self {
        Self {
            repository,
            client,
            state: RunState::Idle,
        }
    }

    /// Connects to the destination database and builds the source client.
    pub async fn connect(settings: &Settings) -> Result<Self, BenchmarkError> {
        let adapter = PgAdapter::connect(&settings.database_url).await?;
        let store = PgStore::new(adapter, settings.table.clone())
            .with_copy_chunk_bytes(settings.copy_chunk_bytes);

        let http = HttpSource::new(&settings.source_url, settings.http_timeout)?
            .with_stream_path(settings.stream_path.clone())
            .with_binary_export_path(settings.binary_export_path.clone());
        let export = match &settings.source_database_url {
            Some(url) => BinaryExport::Database {
                url: url.clone(),
                table: settings.table.clone(),
            },
            None => BinaryExport::Http,
        };
        let source = HttpRecordSource::new(http, export);

        Ok(Self::new(
            Repository::new(Arc::new(store), settings.batch_size),
            SourceClient::new(Arc::new(source), settings.page_size),
        ))
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub async fn run(
        &mut self,
        fetch: FetchKind,
        insert: InsertKind,
        cancel: &CancellationToken,
    ) -> Result<RunReport, BenchmarkError> {
        let run_id = Uuid::new_v4();

        self.state = RunState::Clearing;
        info!(%run_id, %fetch, %insert, "Clearing destination");
        if let Err(err) = self.repository.clear_destination(cancel).await {
            self.state = RunState::Failed;
            error!(%run_id, %fetch, %insert, error = %err, "Benchmark run failed before timing");
            return Err(err);
        }

        self.state = RunState::Timing;
        info!(%run_id, %fetch, %insert, "Benchmark started");
        let started = Instant::now();

        let records = self.client.fetch(fetch, cancel);
        let outcome = self.repository.persist(records, insert, cancel).await;
        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;

        match outcome {
            Ok(summary) => {
                self.state = RunState::Completed;
                let report = RunReport {
                    fetch,
                    insert,
                    elapsed,
                    rows_written: summary.rows_written,
                    write_ops: summary.write_ops,
                };
                info!(
                    %run_id,
                    %fetch,
                    %insert,
                    elapsed_ms,
                    rows = report.rows_written,
                    write_ops = report.write_ops,
                    rows_per_sec = report.rows_per_sec().round() as u64,
                    "Benchmark completed"
                );
                Ok(report)
            }
            Err(BenchmarkError::Cancelled) => {
                self.state = RunState::Failed;
                warn!(%run_id, %fetch, %insert, elapsed_ms, "Benchmark cancelled");
                Err(BenchmarkError::Cancelled)
            }
            Err(err) => {
                self.state = RunState::Failed;
                error!(%run_id, %fetch, %insert, elapsed_ms, error = %err, "Benchmark failed");
                Err(err)
            }
        }
    }
}
