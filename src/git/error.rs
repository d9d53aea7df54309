//! Git-hosting provider error types.
//!
//! This module distinguishes transient from permanent provider failures.
//! The distinction drives the retry policy:
//!
//! - **Transient** errors (5xx, rate limits, network failures) get one
//!   retry.
//! - **Permanent** errors (most 4xx, auth failures, branch already exists
//!   upstream) are surfaced immediately.

use std::fmt;
use thiserror::Error;

/// The kind of provider error, categorized for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitHostErrorKind {
    /// Safe to retry once.
    ///
    /// Examples: HTTP 5xx, HTTP 429, HTTP 403 with rate limit wording,
    /// network timeouts.
    Transient,

    /// Requires a change on the caller's side or human intervention.
    ///
    /// Examples: HTTP 4xx other than rate limits (reference already exists,
    /// validation failures), authentication failures.
    Permanent,
}

impl GitHostErrorKind {
    pub fn is_retriable(&self) -> bool {
        matches!(self, GitHostErrorKind::Transient)
    }
}

/// A Git-hosting provider error with categorization for retry decisions.
#[derive(Debug, Error)]
pub struct GitHostError {
    pub kind: GitHostErrorKind,

    /// The HTTP status code, if available.
    pub status_code: Option<u16>,

    /// A human-readable description of the failure.
    pub message: String,

    /// The underlying octocrab error, if this came from the real provider.
    #[source]
    pub source: Option<octocrab::Error>,
}

impl fmt::Display for GitHostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "provider error (HTTP {}): {}", code, self.message),
            None => write!(f, "provider error: {}", self.message),
        }
    }
}

impl GitHostError {
    /// Creates a transient error without a provider source.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: GitHostErrorKind::Transient,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a permanent error without a provider source.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: GitHostErrorKind::Permanent,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.kind.is_retriable()
    }

    /// Categorizes an octocrab error.
    ///
    /// Based on HTTP status codes where one can be extracted, with message
    /// sniffing for rate limits and network failures.
    pub fn from_octocrab(err: octocrab::Error) -> Self {
        let status_code = extract_status_code(&err);
        let message = err.to_string();

        let kind = match status_code {
            Some(429) => GitHostErrorKind::Transient,
            Some(403) if is_rate_limit_error(&message) => GitHostErrorKind::Transient,
            Some(code) if (500..600).contains(&code) => GitHostErrorKind::Transient,
            Some(_) => GitHostErrorKind::Permanent,
            None => {
                if is_network_error(&message) {
                    GitHostErrorKind::Transient
                } else {
                    GitHostErrorKind::Permanent
                }
            }
        };

        Self {
            kind,
            status_code,
            message,
            source: Some(err),
        }
    }
}

/// Extracts the HTTP status code from an octocrab error, if present.
///
/// octocrab's `Error` type doesn't expose a stable status accessor across
/// all variants, so this falls back to well-established message patterns.
/// Returning `None` is safe; it results in conservative categorization.
fn extract_status_code(err: &octocrab::Error) -> Option<u16> {
    let err_str = err.to_string();

    if let Some(idx) = err_str.find("status: ") {
        let rest = &err_str[idx + 8..];
        if let Some(end) = rest.find(|c: char| !c.is_ascii_digit()) {
            if let Ok(code) = rest[..end].parse() {
                return Some(code);
            }
        } else if let Ok(code) = rest.trim().parse() {
            return Some(code);
        }
    }

    for code in [404u16, 409, 422, 403, 401, 429, 500, 502, 503] {
        if err_str.contains(&code.to_string()) {
            return Some(code);
        }
    }

    None
}

/// Checks if an error message indicates a rate limit.
fn is_rate_limit_error(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("rate limit")
        || message_lower.contains("api rate")
        || message_lower.contains("secondary rate")
        || message_lower.contains("abuse detection")
}

/// Checks if an error message indicates a network-level failure.
fn is_network_error(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("timeout")
        || message_lower.contains("connection")
        || message_lower.contains("network")
        || message_lower.contains("dns")
        || message_lower.contains("timed out")
}
