use std::collections::BTreeMap;
use std::time::Duration;

use alb_logs_shipper::backoff::BackoffPolicy;
use alb_logs_shipper::error::PushError;
use alb_logs_shipper::loki::{Batch, PushClient, BATCH_SIZE};
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use http::StatusCode;

mod common;
use common::*;

fn labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("namespace".to_owned(), "teamA".to_owned()),
        ("ingress".to_owned(), "my-ingress".to_owned()),
    ])
}

#[tokio::test]
async fn test_retries_transient_failures() {
    let loki = FakeLoki::with_statuses(&[503, 503, 503, 200]).await;
    let retries = loki
        .client()
        .send(Bytes::from_static(b"irrelevant"))
        .await
        .unwrap();

    assert_eq!(retries, 3);
    assert_eq!(loki.request_count(), 4);
}

#[tokio::test]
async fn test_retries_rate_limiting() {
    let loki = FakeLoki::with_statuses(&[429, 500, 204]).await;
    let retries = loki.client().send(Bytes::from_static(b"x")).await.unwrap();
    assert_eq!(retries, 2);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let loki = FakeLoki::with_statuses(&[400, 204]).await;
    let err = loki
        .client()
        .send(Bytes::from_static(b"x"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PushError::Status {
            status: StatusCode::BAD_REQUEST,
            ..
        }
    ));
    assert!(!err.is_retryable());
    assert_eq!(loki.request_count(), 1);
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let loki = FakeLoki::with_statuses(&[503; 12]).await;
    let err = loki
        .client()
        .send(Bytes::from_static(b"x"))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(loki.request_count(), 10);
}

#[tokio::test]
async fn test_attempt_budget_follows_policy() {
    for (max_attempts, requests) in [(1, 1), (3, 3)] {
        let loki = FakeLoki::with_statuses(&[500; 5]).await;
        let client = loki.client().with_retry_policy(BackoffPolicy::new(
            Duration::from_millis(1),
            2.0,
            Duration::from_millis(5),
            max_attempts,
        ));

        let err = client.send(Bytes::from_static(b"x")).await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(loki.request_count(), requests, "max_attempts {max_attempts}");
    }
}

#[tokio::test]
async fn test_request_headers() {
    let loki = FakeLoki::start().await;
    PushClient::new(&loki.url(), "tenant", Some("secret"))
        .unwrap()
        .send(Bytes::from_static(b"x"))
        .await
        .unwrap();

    let received = loki.received();
    assert_eq!(
        received[0].content_type.as_deref(),
        Some("application/x-protobuf")
    );
    assert_eq!(received[0].user_agent.as_deref(), Some("alb-logs-shipper"));
    // base64("tenant:secret")
    assert_eq!(
        received[0].authorization.as_deref(),
        Some("Basic dGVuYW50OnNlY3JldA==")
    );
}

#[tokio::test]
async fn test_no_auth_without_password() {
    let loki = FakeLoki::start().await;
    PushClient::new(&loki.url(), "tenant", None)
        .unwrap()
        .send(Bytes::from_static(b"x"))
        .await
        .unwrap();
    assert_eq!(loki.received()[0].authorization, None);
}

#[tokio::test]
async fn test_full_batch_flushes_once() {
    let loki = FakeLoki::start().await;
    let client = loki.client();
    let mut batch = Batch::new(&labels(), &client);

    let ts = Utc.timestamp_opt(1_530_570_180, 0).unwrap();
    for n in 0..BATCH_SIZE {
        batch.add(ts, format!("line {n}")).await.unwrap();
    }

    assert_eq!(loki.request_count(), 1);
    assert!(batch.is_empty());
    assert_eq!(batch.shipped(), BATCH_SIZE);

    // nothing left for the end of object flush
    batch.flush().await.unwrap();
    assert_eq!(loki.request_count(), 1);

    let accepted = loki.accepted();
    assert_eq!(accepted[0].streams.len(), 1);
    assert_eq!(
        accepted[0].streams[0].labels,
        r#"{ingress="my-ingress", namespace="teamA"}"#
    );
    assert_eq!(accepted[0].streams[0].entries.len(), BATCH_SIZE);
    assert_eq!(accepted[0].streams[0].entries[99].line, "line 99");
}

#[tokio::test]
async fn test_partial_batch_flushes_at_end() {
    let loki = FakeLoki::start().await;
    let client = loki.client();
    let mut batch = Batch::new(&labels(), &client);

    let ts = Utc.timestamp_opt(1_530_570_180, 500).unwrap();
    for n in 0..BATCH_SIZE - 1 {
        batch.add(ts, format!("line {n}")).await.unwrap();
    }
    assert_eq!(loki.request_count(), 0);
    assert_eq!(batch.len(), 99);

    batch.flush().await.unwrap();
    assert_eq!(loki.request_count(), 1);
    let entries = loki.entries();
    assert_eq!(entries.len(), 99);
    let timestamp = entries[0].timestamp.unwrap();
    assert_eq!((timestamp.seconds, timestamp.nanos), (1_530_570_180, 500));
}

#[tokio::test]
async fn test_failed_flush_keeps_entries() {
    let loki = FakeLoki::with_statuses(&[400]).await;
    let client = loki.client();
    let mut batch = Batch::new(&labels(), &client);

    let ts = Utc.timestamp_opt(1_530_570_180, 0).unwrap();
    batch.add(ts, "line".to_owned()).await.unwrap();
    assert!(batch.flush().await.is_err());
    assert_eq!(batch.len(), 1);
    assert_eq!(batch.shipped(), 0);

    batch.flush().await.unwrap();
    assert_eq!(loki.lines(), vec!["line"]);
}
