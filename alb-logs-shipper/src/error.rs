use std::fmt;

use http::StatusCode;
use thiserror::Error;

/// Errors raised while turning one access log line into a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("failed to parse log line: {0}")]
    Grammar(String),
    #[error("skipping log line with invalid timestamp {value:?} ({reason}): {line}")]
    InvalidTimestamp {
        value: String,
        reason: String,
        line: String,
    },
}

/// Errors raised while resolving the ownership labels of a load balancer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("load balancer {0} not found")]
    NotFound(String),
    #[error("invalid ingress tag format: {0}")]
    MalformedOwnershipTag(String),
    #[error("load balancer lookup failed: {0}")]
    Remote(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("object storage operation failed: {0}")]
    OperationFailed(String),
}

/// Errors raised while pushing a batch to Loki.
#[derive(Error, Debug)]
pub enum PushError {
    Encode(#[from] prost::EncodeError),
    Compress(#[from] snap::Error),
    Build(#[source] reqwest::Error),
    Request(#[source] reqwest::Error),
    Status {
        status: StatusCode,
        response: String,
    },
}

impl fmt::Display for PushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Encode(_) => write!(f, "failed to encode push request"),
            PushError::Compress(_) => write!(f, "failed to compress push request"),
            PushError::Build(_) => write!(f, "failed to build push request"),
            PushError::Request(error) => write!(f, "push request failed: {error}"),
            PushError::Status { status, response } => {
                write!(
                    f,
                    "server returned HTTP status {status} ({}): {response}",
                    status.as_u16()
                )
            }
        }
    }
}

impl PushError {
    /// Connection level failures, 429 and 5xx are worth another attempt; anything else is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            PushError::Request(_) => true,
            PushError::Status { status, .. } => is_retryable_status(*status),
            PushError::Encode(_) | PushError::Compress(_) | PushError::Build(_) => false,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            PushError::Status { status, .. } => Some(*status),
            PushError::Request(error) => error.status(),
            _ => None,
        }
    }
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Failure of one object. The object is left in the bucket so the next discovery cycle sees it
/// again.
#[derive(Error, Debug)]
pub enum ObjectError {
    #[error("failed to get metadata for load balancer {account_id}/{load_balancer}")]
    Lookup {
        account_id: String,
        load_balancer: String,
        #[source]
        source: LookupError,
    },
    #[error("failed to get object {key}")]
    Fetch {
        key: String,
        #[source]
        source: StorageError,
    },
    #[error("failed to read object {key}")]
    Read {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("failed to send batch")]
    Push(#[from] PushError),
}

#[derive(Error, Debug)]
pub enum ShipperError {
    #[error("failed to list objects in bucket")]
    List(#[source] StorageError),
    #[error("failed to ship object {key}")]
    Object {
        key: String,
        #[source]
        source: ObjectError,
    },
    #[error("pipeline task panicked or was cancelled")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid label format (k=v): {0}")]
    InvalidLabel(String),
    #[error("invalid role ARN: {0}")]
    InvalidRoleArn(String),
    #[error("{0} is not a valid output format (raw, logfmt, json)")]
    InvalidFormat(String),
    #[error("{0} is not a valid parser strategy (scan, pattern)")]
    InvalidParser(String),
    #[error("at least one worker is required")]
    NoWorkers,
}

/// Renders `err` followed by its sources, separated by `: `.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(err) = source {
        out.push_str(": ");
        out.push_str(&err.to_string());
        source = err.source();
    }
    out
}
