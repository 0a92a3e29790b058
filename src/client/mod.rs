//! Authenticated client for the marketplace backend.
//!
//! [`TgtgClient`] owns the credentials, decides between email login and token
//! refresh, and routes every request through a guarded send that recovers
//! from anti-bot blocks:
//!
//! 1. a 403 triggers a challenge cookie refresh and one retry;
//! 2. if that does not clear the block, the escalation ladder rotates the
//!    user agent, rebuilds the session, drops the cookie, and finally cools
//!    down before trying again.

mod api;
mod auth;

use log::{debug, error, info, warn};
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::sync::Arc;

use crate::challenge::escalation::{COOLDOWN, RETRY_DELAY};
use crate::challenge::{ChallengeContext, Remediation, fetch_challenge_cookie, remediation};
use crate::config::{BASE_URL, ClientConfig};
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::http::{ApiResponse, SessionSettings, TgtgSession};
use crate::runtime::{RealRuntime, Runtime};
use crate::user_agent::{self, latest_apk_version_or_default, random_user_agent};

pub use api::{ItemQuery, Origin};

/// Outcome of one challenge cookie refresh.
enum Recovery {
    /// The retried request went through.
    Resolved(ApiResponse),
    /// Still blocked with the fresh cookie.
    Blocked,
    /// The retried request failed for a reason other than the challenge.
    Rejected(ApiResponse),
}

/// Client for the marketplace backend.
///
/// Methods take `&mut self`: credentials, the challenge counter and the
/// current session all change as requests are made. Use one client per task.
pub struct TgtgClient<R: Runtime = RealRuntime> {
    config: ClientConfig,
    base: Url,
    credentials: Credentials,
    user_agent: Option<String>,
    session: Option<Arc<TgtgSession>>,
    challenge_count: u32,
    /// Plain client for the challenge vendor and the app store. Never retries.
    http: Client,
    runtime: R,
}

impl TgtgClient<RealRuntime> {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_runtime(config, RealRuntime)
    }

    /// Latest app version from the public store listing.
    pub async fn get_latest_apk_version() -> Result<String> {
        user_agent::get_latest_apk_version().await
    }
}

impl<R: Runtime> TgtgClient<R> {
    pub fn with_runtime(config: ClientConfig, runtime: R) -> Result<Self> {
        config.validate()?;
        if config.base_url != BASE_URL {
            warn!("Using custom base url: {}", config.base_url);
        }

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(proxies) = &config.proxies {
            builder = proxies.apply(builder)?;
        }

        let credentials = Credentials {
            email: config.email.clone(),
            access_token: config.access_token.clone(),
            refresh_token: config.refresh_token.clone(),
            challenge_cookie: config.challenge_cookie.clone(),
            last_refreshed_at: config.last_refreshed_at,
        };

        Ok(Self {
            base: config.base()?,
            user_agent: config.user_agent.clone(),
            credentials,
            session: None,
            challenge_count: 0,
            http: builder.build()?,
            runtime,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Current credentials, without logging in first.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Consecutive blocks not cleared by a fresh challenge cookie.
    pub fn challenge_count(&self) -> u32 {
        self.challenge_count
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// The live transport session, if one has been created.
    pub fn session(&self) -> Option<&Arc<TgtgSession>> {
        self.session.as_ref()
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| Error::config(format!("invalid endpoint path {}: {}", path, e)))
    }

    /// Pinned user agent, or a random device signature for the known app version.
    async fn derive_user_agent(&self) -> String {
        if let Some(user_agent) = &self.config.user_agent {
            return user_agent.clone();
        }
        let version = match &self.config.apk_version {
            Some(version) => version.clone(),
            None => latest_apk_version_or_default(&self.http, &self.config.app_store_url).await,
        };
        debug!("Using APK version {}.", version);
        random_user_agent(&self.runtime, &version)
    }

    /// Builds a fresh session and makes it the live one.
    async fn replace_session(&mut self) -> Result<Arc<TgtgSession>> {
        if self.user_agent.is_none() {
            self.user_agent = Some(self.derive_user_agent().await);
        }
        let session = Arc::new(TgtgSession::new(SessionSettings {
            user_agent: self.user_agent.clone(),
            language: self.config.language.clone(),
            timeout: self.config.timeout,
            proxies: self.config.proxies.clone(),
            challenge_cookie: self.credentials.challenge_cookie.clone(),
            correlation_id: self.config.correlation_id.clone(),
            retry: self.config.retry,
        })?);
        self.session = Some(session.clone());
        Ok(session)
    }

    async fn current_session(&mut self) -> Result<Arc<TgtgSession>> {
        match &self.session {
            Some(session) => Ok(session.clone()),
            None => self.replace_session().await,
        }
    }

    /// Records success: clears the challenge counter and keeps the cookie the server may have rotated.
    fn on_success(&mut self, session: &TgtgSession) {
        self.challenge_count = 0;
        if let Some(cookie) = session.challenge_cookie() {
            self.credentials.challenge_cookie = Some(cookie);
        }
    }

    /// POSTs to `path` with the current access token, recovering from anti-bot blocks.
    ///
    /// Returns only 200 and 202 responses. Any other status except 403 fails
    /// with [`Error::Api`] straight away; 403 goes through cookie refresh and
    /// the escalation ladder, at most `max_challenge_cycles` times.
    #[tracing::instrument(skip(self, body))]
    pub(crate) async fn post(&mut self, path: &str, body: Option<&Value>) -> Result<ApiResponse> {
        let url = self.endpoint(path)?;
        let mut cycles = 0;

        loop {
            let session = self.current_session().await?;
            let response = session
                .post(
                    &self.runtime,
                    &url,
                    self.credentials.access_token.as_deref(),
                    body,
                )
                .await?;

            if response.is_success() {
                self.on_success(&session);
                return Ok(response);
            }
            if response.status != StatusCode::FORBIDDEN {
                return Err(Error::api(response.status.as_u16(), response.body));
            }

            warn!("Received 403 for {}. Attempting to fetch a new challenge cookie.", path);
            match self.recover_challenge(&session, &url, body).await {
                Ok(Recovery::Resolved(response)) => {
                    self.on_success(&session);
                    return Ok(response);
                }
                Ok(Recovery::Rejected(response)) => {
                    return Err(Error::api(response.status.as_u16(), response.body));
                }
                Ok(Recovery::Blocked) => {
                    debug!("Challenge cookie refresh did not clear the 403.");
                }
                Err(e) => {
                    error!("Failed to refresh challenge cookie: {}. Falling back to escalation.", e);
                }
            }

            cycles += 1;
            let last_cycle = cycles >= self.config.max_challenge_cycles;
            self.escalate(last_cycle).await?;
            if last_cycle {
                return Err(Error::ChallengeUnresolved { attempts: cycles });
            }
            self.runtime.sleep(RETRY_DELAY).await;
        }
    }

    /// Fetches a new challenge cookie, installs it, and retries the request once.
    async fn recover_challenge(
        &mut self,
        session: &TgtgSession,
        url: &Url,
        body: Option<&Value>,
    ) -> Result<Recovery> {
        let user_agent = self.user_agent.clone().unwrap_or_default();
        let cookie = fetch_challenge_cookie(
            &self.http,
            &self.runtime,
            ChallengeContext {
                sdk_url: &self.config.challenge_url,
                request_url: url.as_str(),
                user_agent: &user_agent,
                apk_version: self.config.apk_version.as_deref(),
            },
        )
        .await?;

        self.credentials.challenge_cookie = Some(cookie.clone());
        session.replace_challenge_cookie(Some(cookie));

        info!("Retrying request with new challenge cookie.");
        let response = session
            .post(
                &self.runtime,
                url,
                self.credentials.access_token.as_deref(),
                body,
            )
            .await?;

        Ok(if response.is_success() {
            Recovery::Resolved(response)
        } else if response.status == StatusCode::FORBIDDEN {
            Recovery::Blocked
        } else {
            Recovery::Rejected(response)
        })
    }

    /// Bumps the challenge counter and applies the matching remediation.
    /// On the last cycle of a call a cooldown is left for the next call, since
    /// nothing would be retried after it.
    async fn escalate(&mut self, last_cycle: bool) -> Result<()> {
        self.challenge_count += 1;
        let step = remediation(self.challenge_count);
        if last_cycle && step == Remediation::Cooldown {
            debug!(
                "Unresolved challenge #{} on the last cycle, deferring cooldown",
                self.challenge_count
            );
            return Ok(());
        }
        debug!(
            "Unresolved challenge #{}, applying {:?}",
            self.challenge_count, step
        );

        match step {
            Remediation::Retry => {}
            Remediation::RotateUserAgent => {
                self.user_agent = Some(self.derive_user_agent().await);
            }
            Remediation::RecreateSession => {
                self.replace_session().await?;
            }
            Remediation::ResetChallengeCookie => {
                self.credentials.challenge_cookie = None;
                self.replace_session().await?;
            }
            Remediation::Cooldown => {
                warn!(
                    "Too many challenge errors! Sleeping for {} minutes...",
                    COOLDOWN.as_secs() / 60
                );
                self.runtime.sleep(COOLDOWN).await;
                info!("Retrying ...");
                self.challenge_count = 0;
                self.replace_session().await?;
            }
        }
        Ok(())
    }
}
