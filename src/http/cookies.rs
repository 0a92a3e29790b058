//! Cookie store with a dedicated slot for the anti-bot challenge cookie.
//!
//! Regular cookies are kept in a [`reqwest::cookie::Jar`]. The challenge
//! cookie is held separately so it can be swapped atomically, without the
//! duplicate-domain entries a plain jar would accumulate when the server and
//! the client both set it.

use log::debug;
use reqwest::Url;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use std::sync::RwLock;

/// Name of the challenge cookie.
pub const CHALLENGE_COOKIE: &str = "datadome";

#[derive(Debug, Default)]
pub struct ChallengeJar {
    jar: Jar,
    challenge: RwLock<Option<String>>,
}

impl ChallengeJar {
    pub fn new(challenge: Option<String>) -> Self {
        Self {
            jar: Jar::default(),
            challenge: RwLock::new(challenge.filter(|c| !c.is_empty())),
        }
    }

    /// Current challenge cookie value, if any.
    pub fn challenge(&self) -> Option<String> {
        self.challenge
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the challenge cookie, dropping whatever value was stored before.
    pub fn replace_challenge(&self, value: Option<String>) {
        let mut slot = self.challenge.write().unwrap_or_else(|e| e.into_inner());
        *slot = value.filter(|c| !c.is_empty());
    }
}

/// Extracts the value from a `Set-Cookie: datadome=...` header.
fn parse_challenge(header: &HeaderValue) -> Option<String> {
    let raw = header.to_str().ok()?;
    let pair = raw.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    if name.trim() == CHALLENGE_COOKIE {
        Some(value.trim().to_string())
    } else {
        None
    }
}

impl CookieStore for ChallengeJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let mut others = Vec::new();
        for header in cookie_headers {
            match parse_challenge(header) {
                Some(value) => {
                    debug!("Server rotated the challenge cookie");
                    self.replace_challenge(Some(value));
                }
                None => others.push(header),
            }
        }
        self.jar.set_cookies(&mut others.into_iter(), url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let regular = self
            .jar
            .cookies(url)
            .and_then(|v| v.to_str().ok().map(str::to_string));
        let challenge = self
            .challenge()
            .map(|value| format!("{}={}", CHALLENGE_COOKIE, value));

        let combined = match (regular, challenge) {
            (Some(r), Some(c)) => format!("{}; {}", r, c),
            (Some(r), None) => r,
            (None, Some(c)) => c,
            (None, None) => return None,
        };
        HeaderValue::from_str(&combined).ok()
    }
}
