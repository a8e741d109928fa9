use crate::{error::BenchmarkError, runner::Runner};
use model::execution::strategy::{FetchKind, InsertKind};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Resolves both selectors. Nothing is contacted when either is invalid.
pub fn parse_selectors(insert: &str, fetch: &str) -> Result<(InsertKind, FetchKind), BenchmarkError> {
    Ok((insert.parse()?, fetch.parse()?))
}

/// Starts a run in the background and returns as soon as it is spawned.
///
/// There is no result channel: the outcome only shows up in the logs.
pub fn launch(
    mut runner: Runner,
    insert: &str,
    fetch: &str,
    cancel: CancellationToken,
) -> Result<(), BenchmarkError> {
    let (insert, fetch) = parse_selectors(insert, fetch)?;
    let handle = Handle::try_current().map_err(|e| BenchmarkError::Runtime(e.to_string()))?;

    debug!(%fetch, %insert, "Launching detached benchmark run");
    handle.spawn(async move {
        // The runner logs its own outcome.
        let _ = runner.run(fetch, insert, &cancel).await;
    });
    Ok(())
}
