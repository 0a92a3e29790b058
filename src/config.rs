//! Client configuration.
//!
//! Everything the client needs is gathered in [`ClientConfig`], built from
//! [`ClientConfig::default`] with the `with_*` methods. The configuration is
//! immutable once handed to [`crate::TgtgClient`].

use chrono::{DateTime, Utc};
use reqwest::{ClientBuilder, Proxy, Url};
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result, redact};
use crate::http::RetryPolicy;

/// Production API root.
pub const BASE_URL: &str = "https://apptoogoodtogo.com/api/";

/// Challenge vendor SDK endpoint that hands out bypass cookies.
pub const DATADOME_SDK_URL: &str = "https://api-sdk.datadome.co/sdk/";

/// Store listing scraped for the latest app version.
pub const APP_STORE_URL: &str =
    "https://play.google.com/store/apps/details?id=com.app.tgtg&hl=en&gl=US";

pub const DEFAULT_ACCESS_TOKEN_LIFETIME: Duration = Duration::from_secs(3600 * 4);
pub const DEFAULT_MAX_POLLING_TRIES: u32 = 24;
pub const DEFAULT_POLLING_WAIT_TIME: Duration = Duration::from_secs(5);
pub const DEFAULT_LANGUAGE: &str = "en-GB";
pub const DEFAULT_DEVICE_TYPE: &str = "ANDROID";
pub const DEFAULT_MAX_CHALLENGE_CYCLES: u32 = 30;

/// Proxy URLs per scheme.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Proxies {
    pub http: Option<String>,
    pub https: Option<String>,
}

impl Proxies {
    /// Route both schemes through the same proxy.
    pub fn all(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            http: Some(url.clone()),
            https: Some(url),
        }
    }

    pub(crate) fn apply(&self, mut builder: ClientBuilder) -> Result<ClientBuilder> {
        if let Some(url) = &self.http {
            builder = builder.proxy(Proxy::http(url)?);
        }
        if let Some(url) = &self.https {
            builder = builder.proxy(Proxy::https(url)?);
        }
        Ok(builder)
    }
}

/// Construction parameters for [`crate::TgtgClient`].
#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub challenge_url: String,
    pub app_store_url: String,

    pub email: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub challenge_cookie: Option<String>,
    /// When the supplied tokens were last refreshed, if known.
    pub last_refreshed_at: Option<DateTime<Utc>>,

    /// Pinned app version; scraped from the store listing when unset.
    pub apk_version: Option<String>,
    /// Pinned user agent; derived from a device signature when unset.
    pub user_agent: Option<String>,
    pub language: String,
    pub device_type: String,
    pub proxies: Option<Proxies>,
    pub timeout: Option<Duration>,

    pub access_token_lifetime: Duration,
    pub max_polling_tries: u32,
    pub polling_wait_time: Duration,

    /// Value of the `x-correlation-id` header; a process-wide id when unset.
    pub correlation_id: Option<String>,
    pub retry: RetryPolicy,
    /// Upper bound on challenge recovery cycles for a single request.
    pub max_challenge_cycles: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            challenge_url: DATADOME_SDK_URL.to_string(),
            app_store_url: APP_STORE_URL.to_string(),
            email: None,
            access_token: None,
            refresh_token: None,
            challenge_cookie: None,
            last_refreshed_at: None,
            apk_version: None,
            user_agent: None,
            language: DEFAULT_LANGUAGE.to_string(),
            device_type: DEFAULT_DEVICE_TYPE.to_string(),
            proxies: None,
            timeout: None,
            access_token_lifetime: DEFAULT_ACCESS_TOKEN_LIFETIME,
            max_polling_tries: DEFAULT_MAX_POLLING_TRIES,
            polling_wait_time: DEFAULT_POLLING_WAIT_TIME,
            correlation_id: None,
            retry: RetryPolicy::default(),
            max_challenge_cycles: DEFAULT_MAX_CHALLENGE_CYCLES,
        }
    }
}

fn redact_opt(value: &Option<String>) -> Option<String> {
    value.as_deref().map(redact)
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("challenge_url", &self.challenge_url)
            .field("email", &self.email)
            .field("access_token", &redact_opt(&self.access_token))
            .field("refresh_token", &redact_opt(&self.refresh_token))
            .field("challenge_cookie", &redact_opt(&self.challenge_cookie))
            .field("last_refreshed_at", &self.last_refreshed_at)
            .field("apk_version", &self.apk_version)
            .field("user_agent", &self.user_agent)
            .field("language", &self.language)
            .field("device_type", &self.device_type)
            .field("proxies", &self.proxies)
            .field("timeout", &self.timeout)
            .field("access_token_lifetime", &self.access_token_lifetime)
            .field("max_polling_tries", &self.max_polling_tries)
            .field("polling_wait_time", &self.polling_wait_time)
            .field("max_challenge_cycles", &self.max_challenge_cycles)
            .finish_non_exhaustive()
    }
}

impl ClientConfig {
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_challenge_url(mut self, url: impl Into<String>) -> Self {
        self.challenge_url = url.into();
        self
    }

    #[must_use]
    pub fn with_app_store_url(mut self, url: impl Into<String>) -> Self {
        self.app_store_url = url.into();
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Supply an existing token pair, skipping the email login.
    #[must_use]
    pub fn with_tokens(
        mut self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        self.access_token = Some(access_token.into());
        self.refresh_token = Some(refresh_token.into());
        self
    }

    #[must_use]
    pub fn with_last_refreshed_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_refreshed_at = Some(at);
        self
    }

    #[must_use]
    pub fn with_challenge_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.challenge_cookie = Some(cookie.into());
        self
    }

    #[must_use]
    pub fn with_apk_version(mut self, version: impl Into<String>) -> Self {
        self.apk_version = Some(version.into());
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    #[must_use]
    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = device_type.into();
        self
    }

    #[must_use]
    pub fn with_proxies(mut self, proxies: Proxies) -> Self {
        self.proxies = Some(proxies);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_access_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.access_token_lifetime = lifetime;
        self
    }

    #[must_use]
    pub fn with_polling(mut self, max_tries: u32, wait_time: Duration) -> Self {
        self.max_polling_tries = max_tries;
        self.polling_wait_time = wait_time;
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_max_challenge_cycles(mut self, cycles: u32) -> Self {
        self.max_challenge_cycles = cycles;
        self
    }

    /// API root as a URL that relative endpoint paths can be joined onto.
    pub(crate) fn base(&self) -> Result<Url> {
        let mut base = self.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        Url::parse(&base).map_err(|e| Error::config(format!("invalid base_url {}: {}", base, e)))
    }

    pub fn validate(&self) -> Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(Error::config("base_url must start with http:// or https://"));
        }
        self.base()?;
        Url::parse(&self.challenge_url)
            .map_err(|e| Error::config(format!("invalid challenge_url: {}", e)))?;

        if self.max_polling_tries == 0 {
            return Err(Error::config("max_polling_tries must be at least 1"));
        }
        if self.max_challenge_cycles == 0 {
            return Err(Error::config("max_challenge_cycles must be at least 1"));
        }
        if let Some(proxies) = &self.proxies {
            for url in [&proxies.http, &proxies.https].into_iter().flatten() {
                Proxy::all(url).map_err(|e| Error::config(format!("invalid proxy {}: {}", url, e)))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, BASE_URL);
        assert_eq!(config.access_token_lifetime, Duration::from_secs(14400));
        assert_eq!(config.max_polling_tries, 24);
        assert_eq!(config.polling_wait_time, Duration::from_secs(5));
        assert_eq!(config.device_type, "ANDROID");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ClientConfig::default()
            .with_email("user@example.com")
            .with_tokens("access", "refresh")
            .with_polling(3, Duration::from_millis(10))
            .with_timeout(Duration::from_secs(60));

        assert_eq!(config.email.as_deref(), Some("user@example.com"));
        assert_eq!(config.access_token.as_deref(), Some("access"));
        assert_eq!(config.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(config.max_polling_tries, 3);
        assert_eq!(config.timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_base_adds_trailing_slash() {
        let config = ClientConfig::default().with_base_url("http://localhost:1234/api");
        let url = config.base().unwrap().join("item/v9/").unwrap();
        assert_eq!(url.as_str(), "http://localhost:1234/api/item/v9/");
    }

    #[test]
    fn test_validation() {
        assert!(ClientConfig::default().with_base_url("").validate().is_err());
        assert!(ClientConfig::default().with_base_url("ftp://x").validate().is_err());
        assert!(
            ClientConfig::default()
                .with_polling(0, Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            ClientConfig::default()
                .with_max_challenge_cycles(0)
                .validate()
                .is_err()
        );
        assert!(
            ClientConfig::default()
                .with_proxies(Proxies::all("http://127.0.0.1:8080"))
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = ClientConfig::default()
            .with_tokens("access-token-0123456789", "refresh-token-0123456789")
            .with_challenge_cookie("cookie-value-0123456789");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("access-token-0123456789"));
        assert!(!debug.contains("refresh-token-0123456789"));
        assert!(!debug.contains("cookie-value-0123456789"));
    }
}
