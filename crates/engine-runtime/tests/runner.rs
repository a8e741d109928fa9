use engine_core::testing::{MemorySource, MemoryStore, SourceCall, StoreOp, sample_records};
use engine_runtime::{
    client::SourceClient,
    error::BenchmarkError,
    launch,
    repository::Repository,
    runner::{RunState, Runner},
};
use model::execution::strategy::{FetchKind, InsertKind};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

fn runner(source: &MemorySource, store: &MemoryStore, page_size: u32, batch_size: usize) -> Runner {
    Runner::new(
        Repository::new(Arc::new(store.clone()), batch_size),
        SourceClient::new(Arc::new(source.clone()), page_size),
    )
}

#[tokio::test]
#[traced_test]
async fn test_keyset_into_bulk_with_2500_records() {
    let records = sample_records(2500);
    let source = MemorySource::new(records.clone());
    let store = MemoryStore::new().with_rows(sample_records(3));
    let mut runner = runner(&source, &store, 1000, 5000);

    let report = runner
        .run(FetchKind::KeysetPaging, InsertKind::Bulk, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(runner.state(), RunState::Completed);
    assert_eq!(report.rows_written, 2500);
    assert_eq!(report.write_ops, 1);

    let cursors: Vec<_> = source
        .calls()
        .into_iter()
        .map(|call| match call {
            SourceCall::KeysetPage { last_id, page_size: 1000 } => last_id,
            other => panic!("unexpected call {other:?}"),
        })
        .collect();
    assert_eq!(
        cursors,
        vec![
            None,
            Some(records[999].id),
            Some(records[1999].id),
            Some(records[2499].id),
        ]
    );

    assert_eq!(
        store.ops(),
        vec![StoreOp::Truncate, StoreOp::BulkInsert(2500), StoreOp::SyncMetadata]
    );
    assert_eq!(store.rows(), records);
    assert!(logs_contain("Benchmark completed"));
}

#[tokio::test]
async fn test_empty_source_completes_without_writes() {
    for fetch in FetchKind::ALL {
        for insert in InsertKind::ALL {
            let source = MemorySource::new(Vec::new());
            let store = MemoryStore::new();
            let mut runner = runner(&source, &store, 1000, 5000);

            let report = runner
                .run(fetch, insert, &CancellationToken::new())
                .await
                .unwrap();

            assert_eq!(runner.state(), RunState::Completed, "{fetch} -> {insert}");
            assert_eq!(report.rows_written, 0);
            assert_eq!(store.ops(), vec![StoreOp::Truncate], "{fetch} -> {insert}");
        }
    }
}

#[tokio::test]
async fn test_every_combination_copies_every_field() {
    let records = sample_records(1234);

    for fetch in FetchKind::ALL {
        for insert in InsertKind::ALL {
            let source = MemorySource::new(records.clone()).with_chunk_bytes(1000);
            let store = MemoryStore::new();
            let mut runner = runner(&source, &store, 100, 500);

            let report = runner
                .run(fetch, insert, &CancellationToken::new())
                .await
                .unwrap();

            assert_eq!(report.rows_written, 1234, "{fetch} -> {insert}");
            assert_eq!(store.rows(), records, "{fetch} -> {insert}");
        }
    }
}

#[tokio::test]
async fn test_offset_paging_issues_one_terminating_request() {
    let source = MemorySource::new(sample_records(3000));
    let store = MemoryStore::new();
    let mut runner = runner(&source, &store, 1000, 5000);

    runner
        .run(FetchKind::OffsetPaging, InsertKind::Tracked, &CancellationToken::new())
        .await
        .unwrap();

    let pages: Vec<_> = source
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            SourceCall::OffsetPage { page, .. } => Some(page),
            _ => None,
        })
        .collect();
    assert_eq!(pages, vec![1, 2, 3, 4]);
    assert_eq!(store.write_ops(), 1);
}

#[tokio::test]
async fn test_cancellation_mid_run_fails_every_combination() {
    for fetch in FetchKind::ALL {
        for insert in InsertKind::ALL {
            let cancel = CancellationToken::new();
            let source = MemorySource::new(sample_records(3000))
                .with_chunk_bytes(512)
                .cancel_after(3, cancel.clone());
            let store = MemoryStore::new().watch(cancel.clone());
            let mut runner = runner(&source, &store, 100, 100);

            let err = runner.run(fetch, insert, &cancel).await.unwrap_err();

            assert!(matches!(err, BenchmarkError::Cancelled), "{fetch} -> {insert}: {err}");
            assert_eq!(runner.state(), RunState::Failed);
            assert_eq!(source.calls_after_cancel(), 0, "{fetch} -> {insert}");
            assert_eq!(store.ops_after_cancel(), 0, "{fetch} -> {insert}");
            assert!(store.rows().len() < 3000, "{fetch} -> {insert}");
        }
    }
}

#[tokio::test]
async fn test_cancel_during_first_write_stops_every_combination() {
    for fetch in FetchKind::ALL {
        for insert in InsertKind::ALL {
            let cancel = CancellationToken::new();
            let source = MemorySource::new(sample_records(3000))
                .with_chunk_bytes(512)
                .watch(cancel.clone());
            let store = MemoryStore::new()
                .watch(cancel.clone())
                .cancelling_on_write(1, cancel.clone());
            let mut runner = runner(&source, &store, 100, 100);

            let err = runner.run(fetch, insert, &cancel).await.unwrap_err();

            assert!(matches!(err, BenchmarkError::Cancelled), "{fetch} -> {insert}: {err}");
            assert_eq!(runner.state(), RunState::Failed);
            assert_eq!(source.calls_after_cancel(), 0, "{fetch} -> {insert}");
            assert_eq!(store.ops_after_cancel(), 0, "{fetch} -> {insert}");
        }
    }
}

#[tokio::test]
async fn test_cancelled_before_clear() {
    let source = MemorySource::new(sample_records(10));
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut runner = runner(&source, &store, 10, 10);

    let err = runner
        .run(FetchKind::OffsetPaging, InsertKind::Copy, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, BenchmarkError::Cancelled));
    assert_eq!(runner.state(), RunState::Failed);
    assert!(store.ops().is_empty());
    assert_eq!(source.call_count(), 0);
}

#[tokio::test]
async fn test_unreachable_store_fails_while_clearing() {
    let source = MemorySource::new(sample_records(10));
    let store = MemoryStore::new().unreachable();
    let mut runner = runner(&source, &store, 10, 10);

    let err = runner
        .run(FetchKind::KeysetPaging, InsertKind::Bulk, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, BenchmarkError::Clear(_)));
    assert_eq!(runner.state(), RunState::Failed);
    assert_eq!(source.call_count(), 0);
}

#[tokio::test]
async fn test_fetch_failure_keeps_committed_batches() {
    let records = sample_records(500);
    let source = MemorySource::new(records.clone()).failing_after(2);
    let store = MemoryStore::new();
    let mut runner = runner(&source, &store, 100, 100);

    let err = runner
        .run(FetchKind::OffsetPaging, InsertKind::Bulk, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, BenchmarkError::Fetch(_)), "{err}");
    assert_eq!(runner.state(), RunState::Failed);
    assert_eq!(store.rows(), records[..200].to_vec());
}

#[tokio::test]
async fn test_invalid_selectors_fail_before_any_io() {
    let source = MemorySource::new(sample_records(10));
    let store = MemoryStore::new();

    for (insert, fetch) in [("0", "keyset"), ("bulk", "undefined"), ("merge", "offset"), ("bulk", "")] {
        let err = launch(runner(&source, &store, 10, 10), insert, fetch, CancellationToken::new())
            .unwrap_err();
        assert!(err.is_configuration(), "{insert}/{fetch}: {err}");
    }

    tokio::task::yield_now().await;
    assert_eq!(source.call_count(), 0);
    assert!(store.ops().is_empty());
}

#[tokio::test]
#[traced_test]
async fn test_launch_returns_before_the_run_finishes() {
    let source = MemorySource::new(sample_records(50));
    let store = MemoryStore::new();

    launch(runner(&source, &store, 10, 10), "2", "keyset", CancellationToken::new()).unwrap();

    // The run proceeds on its own; wait for its rows to land.
    for _ in 0..100 {
        if store.rows().len() == 50 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(store.rows().len(), 50);
    assert_eq!(store.write_ops(), 5);
}

#[test]
fn test_launch_outside_a_runtime_is_an_error() {
    let source = MemorySource::new(Vec::new());
    let store = MemoryStore::new();

    let err = launch(runner(&source, &store, 10, 10), "copy", "stream", CancellationToken::new())
        .unwrap_err();

    assert!(matches!(err, BenchmarkError::Runtime(_)));
}
