use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

pub type AssistResult<T> = Result<T, AssistError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssistError {
    #[error("{}", network_message(.status, .message))]
    Network { status: Option<u16>, message: String },

    #[error("rate limit reached, retry in {wait_secs}s")]
    ClientRateLimited { wait_secs: u64 },

    #[error("Too Many Requests, retry in {seconds_remaining}s")]
    ServerRateLimited { seconds_remaining: u64 },

    #[error("selection is empty")]
    EmptySelection,

    #[error("no conversation to follow up on")]
    NoConversation,

    #[error("audio request timed out")]
    AudioTimeout,

    #[error("malformed stream fragment: {0}")]
    TransientParse(String),

    #[error("request cancelled")]
    Cancelled,
}

fn network_message(status: &Option<u16>, message: &str) -> String {
    match *status {
        Some(code) if message.is_empty() => format!("HTTP {code}"),
        Some(code) => format!("HTTP {code}: {message}"),
        None => message.to_string(),
    }
}

fn too_many_requests_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b429\b|too many requests").expect("static rate limit pattern")
    })
}

impl AssistError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            status: None,
            message: message.into(),
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Network {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Server-side throttling shows up either as a 429 status or only in the
    /// message text, depending on which layer produced the failure.
    pub fn is_server_rate_limited(&self) -> bool {
        match self {
            Self::ServerRateLimited { .. } => true,
            Self::Network {
                status: Some(429), ..
            } => true,
            other => too_many_requests_pattern().is_match(&other.to_string()),
        }
    }
}

impl From<reqwest::Error> for AssistError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}
