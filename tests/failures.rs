mod common;

use std::time::{Duration, Instant};

use aioreq::{
    get_request, BatchError, ClientConfig, Coordinator, Endpoint, FailurePolicy, RequestError,
    REQUEST_LINE,
};
use common::{init_logging, spawn_echo, spawn_reset_after, spawn_silent, unused_addr};

fn coordinator(policy: FailurePolicy) -> Coordinator {
    Coordinator::new(ClientConfig {
        failure_policy: policy,
        ..ClientConfig::default()
    })
}

#[tokio::test]
async fn nothing_listening_is_a_connect_error() {
    init_logging();
    let addr = unused_addr().await;

    let err = get_request("127.0.0.1", addr.port()).await.unwrap_err();
    assert!(matches!(err, RequestError::Connect { .. }), "got {err:?}");
    assert_eq!(err.endpoint(), &Endpoint::from(addr));
}

#[tokio::test]
async fn refused_endpoint_fails_batch_without_leaking_connections() {
    init_logging();
    let ok = spawn_echo().await;
    let refused = unused_addr().await;

    let coordinator = coordinator(FailurePolicy::WaitAll);
    assert_eq!(coordinator.open_connections(), 0);

    let err = coordinator.run([ok, refused]).await.unwrap_err();
    let failures = err.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].index, 1);
    assert!(matches!(failures[0].error, RequestError::Connect { .. }));
    assert_eq!(coordinator.open_connections(), 0);
}

#[tokio::test]
async fn wait_all_reports_every_failed_endpoint() {
    init_logging();
    let ok = spawn_echo().await;
    let refused = unused_addr().await;

    let err = coordinator(FailurePolicy::WaitAll)
        .run([refused, ok, refused])
        .await
        .unwrap_err();

    let BatchError::Failed(batch) = &err else {
        panic!("unexpected error: {err:?}");
    };
    assert_eq!(batch.total, 3);
    let indexes: Vec<usize> = batch.failures.iter().map(|f| f.index).collect();
    assert_eq!(indexes, vec![0, 2]);
    assert_eq!(
        batch.first().map(|e| e.endpoint().clone()),
        Some(Endpoint::from(refused))
    );
    assert!(err.to_string().starts_with("2 of 3 requests failed"));
}

#[tokio::test]
async fn fail_fast_cancels_slow_siblings() {
    init_logging();
    let silent = spawn_silent().await;
    let refused = unused_addr().await;

    let coordinator = coordinator(FailurePolicy::FailFast);
    assert_eq!(coordinator.config().failure_policy, FailurePolicy::FailFast);
    let started = Instant::now();
    let err = tokio::time::timeout(
        Duration::from_secs(5),
        coordinator.run([silent, silent, refused]),
    )
    .await
    .expect("fail-fast batch must not wait for silent peers")
    .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(2));
    let failures = err.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].index, 2);
    assert!(matches!(failures[0].error, RequestError::Connect { .. }));
    assert_eq!(coordinator.open_connections(), 0);
}

#[tokio::test]
async fn settled_run_keeps_successes_next_to_failures() {
    init_logging();
    let ok = spawn_echo().await;
    let refused = unused_addr().await;

    let outcomes = Coordinator::default()
        .run_settled([ok, refused, ok])
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 3);
    assert_eq!(&outcomes[0].as_ref().unwrap()[..], REQUEST_LINE);
    assert!(matches!(outcomes[1], Err(RequestError::Connect { .. })));
    assert_eq!(&outcomes[2].as_ref().unwrap()[..], REQUEST_LINE);
}

#[tokio::test]
async fn reset_mid_response_is_a_read_error_with_partial_payload() {
    init_logging();
    let addr = spawn_reset_after(b"HTTP/1.0 200 OK\r\n").await;

    let err = get_request("127.0.0.1", addr.port()).await.unwrap_err();
    assert!(matches!(err, RequestError::Read { .. }), "got {err:?}");
    let partial = err.partial_payload().expect("read errors carry the partial payload");
    assert!(b"HTTP/1.0 200 OK\r\n".starts_with(partial));
}

#[tokio::test]
async fn unresolvable_host_is_a_connect_error() {
    init_logging();
    let coordinator = Coordinator::new(ClientConfig {
        connect_timeout: Some(Duration::from_secs(2)),
        ..ClientConfig::default()
    });

    let err = coordinator
        .run([("no-such-host.invalid", 80u16)])
        .await
        .unwrap_err();
    assert!(matches!(
        err.failures()[0].error,
        RequestError::Connect { .. }
    ));
}

#[tokio::test]
async fn request_timeout_releases_the_connection() {
    init_logging();
    let silent = spawn_silent().await;
    let coordinator = Coordinator::new(ClientConfig {
        request_timeout: Some(Duration::from_millis(200)),
        ..ClientConfig::default()
    });

    let err = coordinator.run([silent]).await.unwrap_err();
    match &err.failures()[0].error {
        RequestError::Timeout { after, .. } => assert_eq!(*after, Duration::from_millis(200)),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(coordinator.open_connections(), 0);
}
