//! Error types for the client.

use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while talking to the backend.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Not enough credentials to log in, or an invalid client configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The email login request got an unexpected answer.
    #[error("Login failed ({status}): {body}")]
    Login { status: u16, body: String },

    /// The account is not registered, or the user never confirmed the login email.
    #[error("Polling error: {0}")]
    Polling(String),

    /// A non-success, non-challenge response, or a business call that did not report success.
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The transport kept getting transient failures and gave up.
    #[error("Request failed after {attempts} attempts with HTTP {status}")]
    RetriesExhausted { status: u16, attempts: usize },

    /// The anti-bot challenge was still blocking after the configured number of recovery cycles.
    #[error("Still blocked by anti-bot challenge after {attempts} recovery cycles")]
    ChallengeUnresolved { attempts: u32 },

    /// The app version could not be read from the app store listing.
    #[error("Failed to get latest APK version: {0}")]
    VersionLookup(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn api(status: u16, body: impl Into<String>) -> Self {
        Self::Api {
            status,
            body: body.into(),
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Login { status, .. }
            | Self::Api { status, .. }
            | Self::RetriesExhausted { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Masks a secret for logging, keeping only a few characters at each end.
pub fn redact(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        return "*********".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}*********{}", head, tail)
}
