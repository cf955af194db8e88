use std::time::Duration;

use bytes::Bytes;
use reqwest::{header, Client, Response};
use tokio::time::sleep;
use tracing::error;

use crate::backoff::BackoffPolicy;
use crate::error::PushError;

/// Loki gives up on a push after 10s
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(11);

const MAX_ERROR_BODY: usize = 1024;

/// Sends encoded push requests to Loki, retrying transient failures.
#[derive(Clone)]
pub struct PushClient {
    http_client: Client,
    url: String,
    credentials: Option<(String, String)>,
    retry_policy: BackoffPolicy,
}

impl PushClient {
    pub fn new(url: &str, user: &str, password: Option<&str>) -> Result<Self, PushError> {
        let mut headers = header::HeaderMap::new();
        // Loki expects snappy compressed protobuf for this content type
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/x-protobuf"),
        );
        let http_client = Client::builder()
            .default_headers(headers)
            .user_agent("alb-logs-shipper")
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(PushError::Build)?;

        let credentials = match password {
            Some(password) if !user.is_empty() && !password.is_empty() => {
                Some((user.to_owned(), password.to_owned()))
            }
            _ => None,
        };

        Ok(Self {
            http_client,
            url: url.to_owned(),
            credentials,
            retry_policy: BackoffPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry_policy: BackoffPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Sends `body` until Loki accepts it, the error is not retryable or the attempt budget
    /// runs out. Returns how many times it backed off before succeeding.
    pub async fn send(&self, body: Bytes) -> Result<u32, PushError> {
        let mut attempt = 0;
        loop {
            metrics::counter!("alb_logs_shipper_push_requests_total").increment(1);
            let err = match self.request(body.clone()).await {
                Ok(()) => return Ok(attempt),
                Err(err) => err,
            };

            if !err.is_retryable() || attempt + 1 >= self.retry_policy.max_attempts {
                return Err(err);
            }

            let delay = self.retry_policy.next_delay(attempt);
            error!(
                status = ?err.status().map(|s| s.as_u16()),
                attempt,
                ?delay,
                "error sending batch, will retry: {err}"
            );
            metrics::counter!("alb_logs_shipper_push_retries_total").increment(1);
            sleep(delay).await;
            attempt += 1;
        }
    }

    async fn request(&self, body: Bytes) -> Result<(), PushError> {
        let mut request = self.http_client.post(&self.url).body(body);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await.map_err(PushError::Request)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        Err(PushError::Status {
            status,
            response: first_line_of_response(response).await,
        })
    }
}

/// First line of the response body, read up to [`MAX_ERROR_BODY`] bytes.
async fn first_line_of_response(mut response: Response) -> String {
    let mut buffer = Vec::with_capacity(MAX_ERROR_BODY);
    while buffer.len() < MAX_ERROR_BODY {
        match response.chunk().await {
            Ok(Some(chunk)) => buffer.extend_from_slice(&chunk),
            Ok(None) | Err(_) => break,
        }
    }
    buffer.truncate(MAX_ERROR_BODY);

    let body = String::from_utf8_lossy(&buffer);
    body.lines().next().unwrap_or_default().to_owned()
}
