use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Longest stderr excerpt carried in an error's context.
pub const STDERR_CONTEXT_LIMIT: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Network,
    Download,
    Transcode,
    Extraction,
    Platform,
    Validation,
    Filesystem,
    Permission,
    RateLimit,
    Authentication,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Fixed defaults attached to every kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindPolicy {
    pub severity: Severity,
    pub recoverable: bool,
    pub retryable: bool,
}

impl ErrorKind {
    pub fn policy(self) -> KindPolicy {
        let (severity, recoverable, retryable) = match self {
            ErrorKind::Network => (Severity::Medium, true, true),
            ErrorKind::Download => (Severity::Medium, true, true),
            ErrorKind::Transcode => (Severity::High, true, false),
            ErrorKind::Extraction => (Severity::Medium, true, true),
            ErrorKind::Platform => (Severity::Medium, true, false),
            ErrorKind::Validation => (Severity::Low, true, false),
            ErrorKind::Filesystem => (Severity::High, true, false),
            ErrorKind::Permission => (Severity::High, false, false),
            ErrorKind::RateLimit => (Severity::Medium, true, true),
            ErrorKind::Authentication => (Severity::High, true, false),
            ErrorKind::Unknown => (Severity::Medium, true, false),
        };
        KindPolicy {
            severity,
            recoverable,
            retryable,
        }
    }

    fn default_user_message(self) -> &'static str {
        match self {
            ErrorKind::Network => "Network problem while contacting the site. Try again later.",
            ErrorKind::Download => "The download was interrupted. Try again.",
            ErrorKind::Transcode => "The media could not be converted to the requested format.",
            ErrorKind::Extraction => "Could not read media information from this link.",
            ErrorKind::Platform => "This content is not available from the site.",
            ErrorKind::Validation => "The request is not valid.",
            ErrorKind::Filesystem => "Could not write to the destination folder.",
            ErrorKind::Permission => "Permission denied.",
            ErrorKind::RateLimit => "The site is limiting requests. Wait a while and try again.",
            ErrorKind::Authentication => "This content requires signing in.",
            ErrorKind::Unknown => "Something went wrong.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Network => "network",
            ErrorKind::Download => "download",
            ErrorKind::Transcode => "transcode",
            ErrorKind::Extraction => "extraction",
            ErrorKind::Platform => "platform",
            ErrorKind::Validation => "validation",
            ErrorKind::Filesystem => "filesystem",
            ErrorKind::Permission => "permission",
            ErrorKind::RateLimit => "rateLimit",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// The only failure shape that crosses the core boundary.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{kind} error: {internal_message}")]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub recoverable: bool,
    pub retryable: bool,
    pub user_message: String,
    pub internal_message: String,
    pub context: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl AppError {
    pub fn new(kind: ErrorKind, internal_message: impl Into<String>) -> Self {
        let policy = kind.policy();
        Self {
            kind,
            severity: policy.severity,
            recoverable: policy.recoverable,
            retryable: policy.retryable,
            user_message: kind.default_user_message().to_string(),
            internal_message: internal_message.into(),
            context: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn validation(internal_message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, internal_message)
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = message.into();
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// A watchdog fired before `operation` finished.
    pub fn timeout(operation: &str, after: Duration) -> Self {
        Self::new(
            ErrorKind::Network,
            format!("{} timed out after {}s", operation, after.as_secs()),
        )
        .with_user_message("The operation took too long and was stopped. Try again.")
        .with_context("operation", operation)
        .with_context("timeout_secs", after.as_secs())
        .retryable(true)
    }

    pub fn from_io(err: &std::io::Error, operation: &str) -> Self {
        use std::io::ErrorKind as Io;

        let kind = match err.kind() {
            Io::PermissionDenied => ErrorKind::Permission,
            Io::ConnectionRefused
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::NotConnected
            | Io::AddrNotAvailable
            | Io::BrokenPipe
            | Io::TimedOut => ErrorKind::Network,
            Io::NotFound | Io::AlreadyExists | Io::InvalidInput => ErrorKind::Filesystem,
            _ => classify_message(&err.to_string()).unwrap_or(ErrorKind::Unknown),
        };

        Self::new(kind, format!("{}: {}", operation, err))
            .with_context("operation", operation)
            .with_context("io_kind", format!("{:?}", err.kind()))
    }

    /// Normalizes a finished external process. `fallback` is used when the
    /// stderr text does not point at a more specific kind.
    pub fn from_exit(fallback: ErrorKind, program: &str, code: Option<i32>, stderr: &str) -> Self {
        let kind = classify_message(stderr).unwrap_or(fallback);
        let code_label = code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let detail = last_meaningful_line(stderr).unwrap_or("no diagnostic output");

        Self::new(
            kind,
            format!("{} exited with {}: {}", program, code_label, detail),
        )
        .with_context("program", program)
        .with_context("exit_code", code_label)
        .with_context("stderr", truncate_stderr(stderr))
    }
}

/// Maps engine diagnostics onto a kind. Returns `None` when nothing matches.
pub fn classify_message(text: &str) -> Option<ErrorKind> {
    let lower = text.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["http error 429", "too many requests", "rate limit", "rate-limit"]) {
        return Some(ErrorKind::RateLimit);
    }
    if has(&[
        "sign in to confirm",
        "login required",
        "log in to",
        "http error 401",
        "use --cookies",
        "authentication",
        "members-only",
    ]) {
        return Some(ErrorKind::Authentication);
    }
    if has(&["permission denied", "access is denied", "operation not permitted"]) {
        return Some(ErrorKind::Permission);
    }
    if has(&["no space left", "disk full", "read-only file system"]) {
        return Some(ErrorKind::Filesystem);
    }
    if has(&[
        "video unavailable",
        "private video",
        "unsupported url",
        "is not available",
        "has been removed",
        "not available in your country",
        "geo restricted",
    ]) {
        return Some(ErrorKind::Platform);
    }
    if has(&["postprocessing", "conversion failed", "error opening output", "invalid data found"]) {
        return Some(ErrorKind::Transcode);
    }
    if has(&[
        "timed out",
        "timeout",
        "connection refused",
        "connection reset",
        "name resolution",
        "getaddrinfo",
        "network is unreachable",
        "unable to connect",
        "ssl:",
    ]) {
        return Some(ErrorKind::Network);
    }
    if has(&["http error 403", "http error 404", "fragment", "unable to download video data"]) {
        return Some(ErrorKind::Download);
    }
    None
}

fn last_meaningful_line(text: &str) -> Option<&str> {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
}

pub fn truncate_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_CONTEXT_LIMIT {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - STDERR_CONTEXT_LIMIT;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("…{}", &trimmed[start..])
}

pub type AppResult<T> = Result<T, AppError>;
