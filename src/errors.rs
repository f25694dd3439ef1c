//! Error classification and deduplicating aggregation.
//!
//! Every failed task is classified into an [`ErrorKind`] and reported to
//! [`ErrorStats`], which collapses the stream of reports into a bounded set of
//! counted [`UniqueError`] classes keyed by [`ErrorKey`].

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::debug;

use crate::task::TaskFailure;
use crate::utils::truncate_string;

/// Maximum stored length of a sample response body.
pub const MAX_SAMPLE_BODY_LEN: usize = 500;

/// Classes of failure a task can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// HTTP 4xx where a 2xx was required
    ClientError,

    /// HTTP 5xx errors
    ServerError,

    /// Network connectivity errors (DNS, connection refused, reset, body read)
    NetworkError,

    /// Transport timeout
    TimeoutError,

    /// TLS/SSL certificate errors
    TlsError,

    /// The request could not be built
    RequestError,

    /// A response body could not be parsed where structured data was required
    DecodeError,

    /// One or more later steps of a CRUD cycle failed after create succeeded
    CycleError,

    /// Anything else
    OtherError,
}

impl ErrorKind {
    /// Classifies an HTTP status code; `None` for 1xx-3xx.
    pub fn from_status_code(status_code: u16) -> Option<Self> {
        match status_code {
            100..=399 => None,
            400..=499 => Some(ErrorKind::ClientError),
            500..=599 => Some(ErrorKind::ServerError),
            _ => Some(ErrorKind::OtherError),
        }
    }

    /// Classifies a transport error.
    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            ErrorKind::TimeoutError
        } else if error.is_builder() {
            ErrorKind::RequestError
        } else if error.is_decode() {
            ErrorKind::DecodeError
        } else if error.is_connect() || error.is_request() || error.is_body() {
            let error_msg = error.to_string().to_lowercase();
            if error_msg.contains("certificate") || error_msg.contains("tls") {
                ErrorKind::TlsError
            } else {
                ErrorKind::NetworkError
            }
        } else if error.is_redirect() {
            ErrorKind::ClientError
        } else if let Some(status) = error.status() {
            Self::from_status_code(status.as_u16()).unwrap_or(ErrorKind::OtherError)
        } else {
            ErrorKind::OtherError
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::ClientError => "client_error",
            ErrorKind::ServerError => "server_error",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::TimeoutError => "timeout_error",
            ErrorKind::TlsError => "tls_error",
            ErrorKind::RequestError => "request_error",
            ErrorKind::DecodeError => "decode_error",
            ErrorKind::CycleError => "cycle_error",
            ErrorKind::OtherError => "other_error",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::ClientError => "HTTP 4xx Client Errors",
            ErrorKind::ServerError => "HTTP 5xx Server Errors",
            ErrorKind::NetworkError => "Network/Connection Errors",
            ErrorKind::TimeoutError => "Request Timeout Errors",
            ErrorKind::TlsError => "TLS/SSL Certificate Errors",
            ErrorKind::RequestError => "Request Build Errors",
            ErrorKind::DecodeError => "Response Decoding Errors",
            ErrorKind::CycleError => "Partial CRUD Cycle Failures",
            ErrorKind::OtherError => "Other/Unknown Errors",
        }
    }

    pub fn all() -> Vec<ErrorKind> {
        vec![
            ErrorKind::ClientError,
            ErrorKind::ServerError,
            ErrorKind::NetworkError,
            ErrorKind::TimeoutError,
            ErrorKind::TlsError,
            ErrorKind::RequestError,
            ErrorKind::DecodeError,
            ErrorKind::CycleError,
            ErrorKind::OtherError,
        ]
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Human-readable reason phrase for common status codes.
pub fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown Status",
    }
}

lazy_static::lazy_static! {
    static ref ADDR_PATTERN: Regex =
        Regex::new(r"\b\d{1,3}(?:\.\d{1,3}){3}(?::\d+)?\b").expect("valid address pattern");
    static ref UUID_PATTERN: Regex =
        Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b")
            .expect("valid uuid pattern");
    static ref NUMBER_PATTERN: Regex = Regex::new(r"\b\d+\b").expect("valid number pattern");
}

/// How error messages are normalized before keying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorNormalizer {
    /// Messages are keyed as reported.
    #[default]
    Passthrough,

    /// IP addresses, UUIDs and bare numbers are replaced by placeholders.
    StripDynamic,
}

impl ErrorNormalizer {
    pub fn normalize(&self, msg: &str) -> String {
        match self {
            ErrorNormalizer::Passthrough => msg.to_string(),
            ErrorNormalizer::StripDynamic => {
                let msg = ADDR_PATTERN.replace_all(msg, "<addr>");
                let msg = UUID_PATTERN.replace_all(&msg, "<uuid>");
                NUMBER_PATTERN.replace_all(&msg, "<n>").into_owned()
            }
        }
    }
}

/// Identity of one error class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorKey {
    pub operation: String,
    pub kind: ErrorKind,
    pub message: String,
    pub status_code: Option<u16>,
}

/// One aggregated error class.
#[derive(Debug, Clone)]
pub struct UniqueError {
    pub operation: String,
    pub kind: ErrorKind,
    /// Normalized message.
    pub message: String,
    pub status_code: Option<u16>,
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Body of the first occurrence, trimmed and truncated.
    pub sample_body: String,
}

#[derive(Default)]
struct ErrorStatsInner {
    unique: HashMap<ErrorKey, UniqueError>,
    total: u64,
}

/// Thread-safe deduplicating error aggregator.
///
/// All operations run under a single aggregator-wide lock, so totals and the
/// per-class counts always agree.
#[derive(Default)]
pub struct ErrorStats {
    normalizer: ErrorNormalizer,
    inner: Mutex<ErrorStatsInner>,
}

impl ErrorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_normalizer(normalizer: ErrorNormalizer) -> Self {
        Self {
            normalizer,
            inner: Mutex::new(ErrorStatsInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ErrorStatsInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records one error occurrence, creating its class on first sight.
    pub fn record_error(
        &self,
        operation: &str,
        kind: ErrorKind,
        message: &str,
        status_code: Option<u16>,
        sample_body: Option<&str>,
    ) {
        let key = ErrorKey {
            operation: operation.to_string(),
            kind,
            message: self.normalizer.normalize(message),
            status_code,
        };
        let now = Utc::now();

        let mut inner = self.lock();
        inner.total += 1;

        match inner.unique.entry(key) {
            Entry::Occupied(mut existing) => {
                let existing = existing.get_mut();
                existing.count += 1;
                existing.last_seen = now;
            }
            Entry::Vacant(slot) => {
                let key = slot.key();
                debug!(
                    operation = %key.operation,
                    error_category = %kind.label(),
                    status_code = ?status_code,
                    "New error class"
                );
                let entry = UniqueError {
                    operation: key.operation.clone(),
                    kind,
                    message: key.message.clone(),
                    status_code,
                    count: 1,
                    first_seen: now,
                    last_seen: now,
                    sample_body: truncate_string(
                        sample_body.unwrap_or_default(),
                        MAX_SAMPLE_BODY_LEN,
                    ),
                };
                slot.insert(entry);
            }
        }
    }

    /// Records a classified task failure.
    pub fn record_failure(&self, failure: &TaskFailure) {
        self.record_error(
            &failure.operation,
            failure.kind,
            &failure.message,
            failure.status_code,
            failure.body_sample.as_deref(),
        );
    }

    /// All error classes, most frequent first. Order among ties is unspecified.
    pub fn sorted_errors(&self) -> Vec<UniqueError> {
        let inner = self.lock();
        let mut errors: Vec<UniqueError> = inner.unique.values().cloned().collect();
        errors.sort_by(|a, b| b.count.cmp(&a.count));
        errors
    }

    pub fn total_count(&self) -> u64 {
        self.lock().total
    }

    pub fn unique_count(&self) -> usize {
        self.lock().unique.len()
    }
}

impl fmt::Debug for ErrorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("ErrorStats")
            .field("normalizer", &self.normalizer)
            .field("total", &inner.total)
            .field("unique", &inner.unique.len())
            .finish()
    }
}
