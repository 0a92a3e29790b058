//! Credential snapshot handed to callers for persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::redact;

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    #[serde(rename = "datadome_cookie")]
    pub challenge_cookie: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Both halves of the token pair are present and non-empty.
    pub fn has_tokens(&self) -> bool {
        present(&self.access_token) && present(&self.refresh_token)
    }

    /// Enough is known to log in: an email, or a full token pair.
    pub fn can_login(&self) -> bool {
        present(&self.email) || self.has_tokens()
    }

    /// Replaces the token pair and its timestamp in one step.
    pub(crate) fn set_tokens(
        &mut self,
        access_token: String,
        refresh_token: String,
        refreshed_at: DateTime<Utc>,
    ) {
        self.access_token = Some(access_token);
        self.refresh_token = Some(refresh_token);
        self.last_refreshed_at = Some(refreshed_at);
    }
}

/// Empty strings count as missing.
fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("access_token", &self.access_token.as_deref().map(redact))
            .field("refresh_token", &self.refresh_token.as_deref().map(redact))
            .field("challenge_cookie", &self.challenge_cookie.as_deref().map(redact))
            .field("last_refreshed_at", &self.last_refreshed_at)
            .finish()
    }
}
