//! Shared test utilities: a fake Loki push endpoint, gzip fixtures and sample log lines.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alb_logs_shipper::backoff::BackoffPolicy;
use alb_logs_shipper::elb::{StaticTagSource, CLUSTER_TAG, OWNERSHIP_TAG};
use alb_logs_shipper::loki::proto::{EntryAdapter, PushRequest};
use alb_logs_shipper::loki::PushClient;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use flate2::write::GzEncoder;
use flate2::Compression;
use prost::Message;

pub const ACCOUNT_ID: &str = "123456789012";
pub const PUSH_PATH: &str = "/loki/api/v1/push";

/// One request as received by [`FakeLoki`].
#[derive(Debug, Clone)]
pub struct ReceivedPush {
    pub content_type: Option<String>,
    pub user_agent: Option<String>,
    pub authorization: Option<String>,
    /// `None` when the body was not snappy compressed protobuf.
    pub request: Option<PushRequest>,
}

#[derive(Default)]
struct FakeLokiState {
    statuses: VecDeque<StatusCode>,
    received: Vec<ReceivedPush>,
}

/// An in-process push endpoint answering with a scripted sequence of statuses, then 204.
pub struct FakeLoki {
    addr: SocketAddr,
    state: Arc<Mutex<FakeLokiState>>,
}

impl FakeLoki {
    pub async fn start() -> Self {
        Self::with_statuses(&[]).await
    }

    pub async fn with_statuses(statuses: &[u16]) -> Self {
        let state = Arc::new(Mutex::new(FakeLokiState {
            statuses: statuses
                .iter()
                .map(|s| StatusCode::from_u16(*s).unwrap())
                .collect(),
            received: Vec::new(),
        }));

        let app = Router::new()
            .route(PUSH_PATH, post(push))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}{PUSH_PATH}", self.addr)
    }

    /// A client for this endpoint that backs off for milliseconds instead of seconds.
    pub fn client(&self) -> PushClient {
        PushClient::new(&self.url(), "", None)
            .unwrap()
            .with_retry_policy(fast_retries())
    }

    pub fn received(&self) -> Vec<ReceivedPush> {
        self.state.lock().unwrap().received.clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().received.len()
    }

    /// Decoded requests that were answered with a success status, in arrival order.
    pub fn accepted(&self) -> Vec<PushRequest> {
        let state = self.state.lock().unwrap();
        state
            .received
            .iter()
            .filter_map(|r| r.request.clone())
            .collect()
    }

    /// Lines of every stream received, in arrival order.
    pub fn lines(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.line).collect()
    }

    pub fn entries(&self) -> Vec<EntryAdapter> {
        self.accepted()
            .into_iter()
            .flat_map(|r| r.streams)
            .flat_map(|s| s.entries)
            .collect()
    }
}

async fn push(
    State(state): State<Arc<Mutex<FakeLokiState>>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let get_header = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };

    let mut state = state.lock().unwrap();
    let status = state.statuses.pop_front().unwrap_or(StatusCode::NO_CONTENT);
    let request = if status.is_success() {
        snap::raw::Decoder::new()
            .decompress_vec(&body)
            .ok()
            .and_then(|raw| PushRequest::decode(raw.as_slice()).ok())
    } else {
        None
    };

    state.received.push(ReceivedPush {
        content_type: get_header(header::CONTENT_TYPE),
        user_agent: get_header(header::USER_AGENT),
        authorization: get_header(header::AUTHORIZATION),
        request,
    });
    status
}

pub fn fast_retries() -> BackoffPolicy {
    BackoffPolicy::new(Duration::from_millis(1), 2.0, Duration::from_millis(10), 10)
}

pub fn gzip(lines: &[String]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    for line in lines {
        encoder.write_all(line.as_bytes()).unwrap();
        encoder.write_all(b"\n").unwrap();
    }
    encoder.finish().unwrap()
}

/// Key of an application load balancer log object as delivered by ELB.
pub fn object_key(load_balancer: &str, n: usize) -> String {
    format!(
        "alb-logs/AWSLogs/{ACCOUNT_ID}/elasticloadbalancing/us-east-1/2022/01/24/{ACCOUNT_ID}_elasticloadbalancing_us-east-1_app.{load_balancer}.b13ea9d19f16d015_20220124T{n:04}Z_10.0.0.1_2et2e1mx.log.gz"
    )
}

/// A well formed access log line whose request path carries `n`.
pub fn sample_line(n: usize) -> String {
    format!(
        r#"https 2018-07-02T22:23:{:02}.{:06}Z app/my-lb/50dc6c495c0c9188 192.168.131.39:2817 10.0.0.1:80 0.086 0.048 0.037 200 200 0 57 "GET https://www.example.com:443/items/{n} HTTP/1.1" "curl/7.46.0" ECDHE-RSA-AES128-GCM-SHA256 TLSv1.2 arn:aws:elasticloadbalancing:us-east-2:123456789012:targetgroup/my-targets/73e2d6bc24d8a067 "Root=1-58337281-1d84f3d73c47ec4e58577259" "www.example.com" "arn:aws:acm:us-east-2:123456789012:certificate/12345678-1234-1234-1234-123456789012" 1 2018-07-02T22:22:48.364000Z "authenticate,forward" "-" "-" "10.0.0.1:80" "200" "-" "-" TID_1234abcd5678ef90"#,
        n % 60,
        n % 1_000_000
    )
}

/// Tags of `my-lb` owned by namespace `teamA`, ingress `my-ingress`, no cluster.
pub fn tag_source() -> StaticTagSource {
    StaticTagSource::new()
        .with_load_balancer(ACCOUNT_ID, "my-lb", &[(OWNERSHIP_TAG, "teamA/my-ingress")])
        .with_load_balancer(
            ACCOUNT_ID,
            "clustered-lb",
            &[(OWNERSHIP_TAG, "teamB/api"), (CLUSTER_TAG, "prod-eu")],
        )
        .with_load_balancer(ACCOUNT_ID, "bad-lb", &[(OWNERSHIP_TAG, "no-separator")])
}
