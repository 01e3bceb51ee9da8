//! Error classification for chart data fetches.
//!
//! Maps an opaque fetch failure onto rate-limit / network / server / not-found /
//! other, which drives retry eligibility and the message shown to the user.
//! Pure functions: no I/O, no state, never panics.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::source::SourceError;

const NETWORK_MARKERS: [&str; 4] = ["network", "timeout", "fetch", "aborted"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    Network,
    Server,
    NotFound,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorClassification {
    pub is_rate_limit: bool,
    pub is_network_error: bool,
    pub is_server_error: bool,
    pub status_code: Option<u16>,
    pub user_message: String,
    pub technical_message: String,
}

impl ErrorClassification {
    /// Kind in message priority order: rate limit, network, server, not found.
    pub fn kind(&self) -> ErrorKind {
        if self.is_rate_limit {
            ErrorKind::RateLimited
        } else if self.is_network_error {
            ErrorKind::Network
        } else if self.is_server_error {
            ErrorKind::Server
        } else if self.status_code == Some(404) {
            ErrorKind::NotFound
        } else {
            ErrorKind::Other
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.is_rate_limit || self.is_network_error || self.is_server_error
    }
}

fn status_code_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b[45]\d{2}\b").ok()).as_ref()
}

fn status_code_in_text(text: &str) -> Option<u16> {
    let found = status_code_pattern()?.find(text)?;
    found.as_str().parse().ok()
}

fn status_code_in_chain(error: &anyhow::Error) -> Option<u16> {
    error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<reqwest::Error>())
        .find_map(|e| e.status())
        .map(|status| status.as_u16())
        .filter(|code| (400..600).contains(code))
}

/// Abort or transport failure found by error type, whatever the message says
fn is_transport_failure(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause.is::<tokio::time::error::Elapsed>()
            || matches!(cause.downcast_ref::<SourceError>(), Some(SourceError::Aborted(_)))
            || cause
                .downcast_ref::<reqwest::Error>()
                .map(|e| e.is_timeout() || e.is_connect())
                .unwrap_or(false)
    })
}

pub fn classify(error: &anyhow::Error) -> ErrorClassification {
    let technical_message = error.to_string();
    // Search causes too; "fetch candles: 429 Too Many Requests" keeps the code below the top
    let searchable = format!("{:#}", error);
    let lowered = searchable.to_lowercase();

    let status_code = status_code_in_text(&searchable).or_else(|| status_code_in_chain(error));

    let is_rate_limit = status_code == Some(429) || lowered.contains("rate limit");
    let is_network_error =
        NETWORK_MARKERS.iter().any(|marker| lowered.contains(marker)) || is_transport_failure(error);
    let is_server_error = status_code.map(|code| code >= 500).unwrap_or(false);

    let user_message = if is_rate_limit {
        "Rate limit reached. Retrying..."
    } else if is_network_error {
        "Network error. Check your connection."
    } else if is_server_error {
        "Server temporarily unavailable."
    } else if status_code == Some(404) {
        "Data not found for this asset."
    } else {
        "Failed to load chart data."
    };

    ErrorClassification {
        is_rate_limit,
        is_network_error,
        is_server_error,
        status_code,
        user_message: user_message.to_string(),
        technical_message,
    }
}

/// Rate-limit, network and server errors are worth retrying; 404 and anything
/// unclassified are not.
pub fn is_retryable(error: &anyhow::Error) -> bool {
    classify(error).is_retryable()
}

/// Message to show once retries are exhausted.
pub fn final_message(error: &anyhow::Error, has_stale_cache: bool) -> String {
    let classification = classify(error);

    let message = if has_stale_cache {
        if classification.is_rate_limit {
            "Using cached data (API rate limit)"
        } else if classification.is_network_error {
            "Using cached data (offline)"
        } else {
            "Using cached data"
        }
    } else if classification.is_rate_limit {
        "Rate limit reached. Try again shortly."
    } else if classification.is_network_error {
        "Network error. Check your connection."
    } else if classification.is_server_error {
        "Server temporarily unavailable."
    } else {
        return classification.user_message;
    };

    message.to_string()
}
