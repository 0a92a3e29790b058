//! Transport session: one pooled HTTP client with fixed headers and a cookie store.

use log::{debug, warn};
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName,
    HeaderValue, USER_AGENT,
};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use super::cookies::ChallengeJar;
use super::retry::{RetryPolicy, is_retryable_error, is_retryable_status};
use crate::config::Proxies;
use crate::error::{Error, Result};
use crate::runtime::Runtime;

/// Correlation id header read by the backend to tie retries together.
pub const X_CORRELATION_ID: HeaderName = HeaderName::from_static("x-correlation-id");

static PROCESS_CORRELATION_ID: LazyLock<String> =
    LazyLock::new(|| uuid::Uuid::new_v4().to_string());

/// Correlation id shared by every session in this process.
pub fn process_correlation_id() -> &'static str {
    &PROCESS_CORRELATION_ID
}

/// Everything needed to build a [`TgtgSession`].
#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    pub user_agent: Option<String>,
    pub language: String,
    pub timeout: Option<Duration>,
    pub proxies: Option<Proxies>,
    pub challenge_cookie: Option<String>,
    pub correlation_id: Option<String>,
    pub retry: RetryPolicy,
}

/// Status and fully read body of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    /// 200 and 202 both count as success for this backend.
    pub fn is_success(&self) -> bool {
        matches!(self.status, StatusCode::OK | StatusCode::ACCEPTED)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// HTTP session with fixed headers, a challenge-aware cookie store and
/// transparent retry of transient failures.
///
/// Sessions are never reconfigured; rotating identity means building a new one.
#[derive(Debug)]
pub struct TgtgSession {
    client: Client,
    cookies: Arc<ChallengeJar>,
    retry: RetryPolicy,
    user_agent: Option<String>,
}

impl TgtgSession {
    pub fn new(settings: SessionSettings) -> Result<Self> {
        let correlation_id = settings
            .correlation_id
            .unwrap_or_else(|| process_correlation_id().to_string());

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        headers.insert(ACCEPT_LANGUAGE, header_value("language", &settings.language)?);
        headers.insert(X_CORRELATION_ID, header_value("correlation id", &correlation_id)?);
        if let Some(user_agent) = &settings.user_agent {
            headers.insert(USER_AGENT, header_value("user agent", user_agent)?);
        }

        let cookies = Arc::new(ChallengeJar::new(settings.challenge_cookie));

        let mut builder = Client::builder()
            .default_headers(headers)
            .cookie_provider(cookies.clone());
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(proxies) = &settings.proxies {
            builder = proxies.apply(builder)?;
        }

        debug!(
            "Created session (user agent: {:?}, correlation id: {})",
            settings.user_agent, correlation_id
        );

        Ok(Self {
            client: builder.build()?,
            cookies,
            retry: settings.retry,
            user_agent: settings.user_agent,
        })
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn challenge_cookie(&self) -> Option<String> {
        self.cookies.challenge()
    }

    /// Swap the challenge cookie sent with every following request.
    pub fn replace_challenge_cookie(&self, cookie: Option<String>) {
        self.cookies.replace_challenge(cookie);
    }

    /// POSTs `body` as JSON, adding a bearer token for this call only.
    ///
    /// 429 and 5xx gateway responses, as well as connection failures, are
    /// retried with exponential backoff. Every other response is returned
    /// as-is, whatever its status.
    #[tracing::instrument(skip(self, runtime, access_token, body))]
    pub async fn post<R: Runtime + ?Sized>(
        &self,
        runtime: &R,
        url: &Url,
        access_token: Option<&str>,
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse> {
        let mut retry = 0;

        loop {
            let mut request = self.client.post(url.clone());
            if let Some(token) = access_token {
                let mut value = header_value("access token", &format!("Bearer {}", token))?;
                value.set_sensitive(true);
                request = request.header(AUTHORIZATION, value);
            }
            if let Some(body) = body {
                request = request.body(serde_json::to_vec(body)?);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if is_retryable_status(status) {
                        if retry >= self.retry.max_retries {
                            return Err(Error::RetriesExhausted {
                                status: status.as_u16(),
                                attempts: retry + 1,
                            });
                        }
                        retry += 1;
                        let delay = self.retry.delay_for(retry, status, response.headers());
                        warn!(
                            "POST {}: HTTP {} (retry {}/{}), retrying in {:?}...",
                            url.path(),
                            status.as_u16(),
                            retry,
                            self.retry.max_retries,
                            delay
                        );
                        runtime.sleep(delay).await;
                        continue;
                    }

                    let body = response.text().await?;
                    debug!("POST {} -> {}", url.path(), status.as_u16());
                    return Ok(ApiResponse { status, body });
                }
                Err(e) if is_retryable_error(&e) && retry < self.retry.max_retries => {
                    retry += 1;
                    let delay = self.retry.backoff(retry);
                    warn!(
                        "POST {}: {} (retry {}/{}), retrying in {:?}...",
                        url.path(),
                        e,
                        retry,
                        self.retry.max_retries,
                        delay
                    );
                    runtime.sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn header_value(what: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::config(format!("{} contains characters not allowed in a header", what)))
}
