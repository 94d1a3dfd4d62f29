//! End-to-end coverage of the retry path through the full worker pipeline:
//! coordinator submit -> worker dequeue -> rendering fetch -> circuit
//! breaker -> retry queue -> re-dequeue, against a mocked rendering service.

use std::time::Duration;

use crawl_engine::{CrawlerOptions, CrawlProgressUpdate, EngineConfig, JobStatus, PageOptions, Plan, TenantId};

/// Drains a crawl's progress stream to its terminal update, tolerating a
/// lagged subscriber by falling back to the aggregator's snapshot.
async fn drain_to_terminal_status(
    progress: &crawl_engine::ProgressAggregator,
    mut updates: tokio::sync::broadcast::Receiver<CrawlProgressUpdate>,
    timeout: Duration,
) -> JobStatus {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut last_status = None;
    loop {
        let (current, total) = progress.snapshot();
        if current >= total {
            if let Some(status) = last_status {
                return status;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("crawl did not reach a terminal status within {timeout:?}: {current}/{total}");
        }
        match tokio::time::timeout(Duration::from_millis(50), updates.recv()).await {
            Ok(Ok(update)) => last_status = Some(update.status),
            Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(_))) => {}
            Ok(Err(tokio::sync::broadcast::error::RecvError::Closed)) => break,
            Err(_) => {}
        }
    }
    last_status.expect("at least one progress update recorded before the channel closed")
}

#[tokio::test]
async fn transient_failures_retry_until_success() {
    let mut server = mockito::Server::new_async().await;

    // Created first so the 503 mock below takes precedence while its
    // expectation is unmet; once exhausted, matching falls back to this one.
    let _success = server
        .mock("POST", "/render")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"content":"<html><body>ok</body></html>","pageStatusCode":200,"pageError":null}"#)
        .create_async()
        .await;

    let _failures = server
        .mock("POST", "/render")
        .with_status(503)
        .with_body("service unavailable")
        .expect(3)
        .create_async()
        .await;

    let config = EngineConfig::builder()
        .worker_count(1)
        .rendering_endpoint(format!("{}/render", server.url()))
        .max_concurrent_per_domain(1)
        .domain_rate_rps(50.0)
        .circuit_breaker(10, 1, 60)
        .build();

    let coordinator = crawl_engine::spawn_engine(&config);

    let origin = format!("{}/seed", server.url());
    let id = coordinator
        .submit(
            origin,
            CrawlerOptions::default(),
            PageOptions::default(),
            TenantId("tenant-a".into()),
            Plan::Free,
            Vec::new(),
            None,
        )
        .await
        .expect("submit should accept a valid seed url");

    let progress = coordinator
        .progress(id)
        .expect("progress aggregator exists immediately after submit");
    let updates = progress.subscribe();

    let status = drain_to_terminal_status(&progress, updates, Duration::from_secs(5)).await;
    assert_eq!(status, JobStatus::Completed);
}

#[tokio::test]
async fn permanent_failure_is_not_retried() {
    let mut server = mockito::Server::new_async().await;

    let _m = server
        .mock("POST", "/render")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"content":"","pageStatusCode":404,"pageError":"not found"}"#)
        .expect(1)
        .create_async()
        .await;

    let config = EngineConfig::builder()
        .worker_count(1)
        .rendering_endpoint(format!("{}/render", server.url()))
        .domain_rate_rps(50.0)
        .build();

    let coordinator = crawl_engine::spawn_engine(&config);

    let origin = format!("{}/missing", server.url());
    let id = coordinator
        .submit(
            origin,
            CrawlerOptions::default(),
            PageOptions::default(),
            TenantId("tenant-b".into()),
            Plan::Free,
            Vec::new(),
            None,
        )
        .await
        .expect("submit should accept a valid seed url");

    let progress = coordinator.progress(id).expect("progress aggregator exists");
    let updates = progress.subscribe();

    let status = drain_to_terminal_status(&progress, updates, Duration::from_secs(5)).await;
    assert_eq!(status, JobStatus::Failed);

    // The mock's expect(1) is checked at server drop; a retried job would
    // have sent a second request and failed the expectation there.
}
