use log::{debug, info, warn};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use super::TgtgClient;
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::http::ApiResponse;
use crate::runtime::Runtime;

pub(crate) const AUTH_BY_EMAIL_ENDPOINT: &str = "auth/v5/authByEmail";
pub(crate) const AUTH_POLLING_ENDPOINT: &str = "auth/v5/authByRequestPollingId";
pub(crate) const SIGNUP_BY_EMAIL_ENDPOINT: &str = "auth/v5/signUpByEmail";
pub(crate) const REFRESH_ENDPOINT: &str = "token/v1/refresh";

#[derive(Debug, Deserialize)]
struct AuthByEmailResponse {
    state: Option<String>,
    polling_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignUpResponse {
    #[serde(default)]
    login_response: TokenResponse,
}

/// An email login waiting for the user to confirm in their mailbox.
#[derive(Debug)]
struct PollingSession {
    polling_id: String,
    attempts_remaining: u32,
}

impl PollingSession {
    fn new(polling_id: String, max_tries: u32) -> Self {
        Self {
            polling_id,
            attempts_remaining: max_tries,
        }
    }

    /// Consumes one attempt; false once none are left.
    fn take_attempt(&mut self) -> bool {
        if self.attempts_remaining == 0 {
            return false;
        }
        self.attempts_remaining -= 1;
        true
    }
}

impl TokenResponse {
    fn into_pair(self, response: &ApiResponse) -> Result<(String, String)> {
        match (self.access_token, self.refresh_token) {
            (Some(access), Some(refresh)) => Ok((access, refresh)),
            _ => Err(Error::api(
                response.status.as_u16(),
                response.body.clone(),
            )),
        }
    }
}

impl<R: Runtime> TgtgClient<R> {
    /// Ensures a usable access token, by refresh or by email login.
    ///
    /// With a full token pair this only refreshes when the token is older than
    /// the configured lifetime. Without one it starts an email login and polls
    /// until the user confirms it.
    #[tracing::instrument(skip(self))]
    pub async fn login(&mut self) -> Result<()> {
        if !self.credentials.can_login() {
            return Err(Error::config(
                "You must provide at least email or access_token and refresh_token",
            ));
        }
        if self.credentials.has_tokens() {
            return self.refresh_token().await;
        }

        let email = self.credentials.email.clone().unwrap_or_default();
        let body = json!({
            "device_type": self.config.device_type,
            "email": email,
        });
        let response = self.post(AUTH_BY_EMAIL_ENDPOINT, Some(&body)).await?;
        let auth: AuthByEmailResponse = response.json()?;

        match (auth.state.as_deref(), auth.polling_id) {
            (Some("TERMS"), _) => Err(Error::Polling(format!(
                "This email {} is not linked to an account. Sign up with this email first.",
                email
            ))),
            (Some("WAIT"), Some(polling_id)) => {
                self.start_polling(PollingSession::new(
                    polling_id,
                    self.config.max_polling_tries,
                ))
                .await
            }
            _ => Err(Error::Login {
                status: response.status.as_u16(),
                body: response.body,
            }),
        }
    }

    /// Polls until the emailed link is confirmed. Waits `polling_wait_time`
    /// between attempts but not after the last one, so N tries cost N-1 waits.
    async fn start_polling(&mut self, mut polling: PollingSession) -> Result<()> {
        let body = json!({
            "device_type": self.config.device_type,
            "email": self.credentials.email,
            "request_polling_id": polling.polling_id,
        });

        while polling.take_attempt() {
            let response = self.post(AUTH_POLLING_ENDPOINT, Some(&body)).await?;
            if response.status == StatusCode::ACCEPTED {
                warn!("Check your mailbox on PC to continue... (Mailbox on mobile won't work, if you have installed the app.)");
                if polling.attempts_remaining > 0 {
                    self.runtime.sleep(self.config.polling_wait_time).await;
                }
                continue;
            }

            info!("Logged in!");
            let (access, refresh) = response.json::<TokenResponse>()?.into_pair(&response)?;
            let now = self.runtime.now();
            self.credentials.set_tokens(access, refresh, now);
            return Ok(());
        }

        Err(Error::Polling(
            "Max polling retries reached. Try again.".to_string(),
        ))
    }

    /// Refreshes the token pair unless the access token is still fresh.
    #[tracing::instrument(skip(self))]
    pub async fn refresh_token(&mut self) -> Result<()> {
        if let Some(refreshed_at) = self.credentials.last_refreshed_at {
            let elapsed = (self.runtime.now() - refreshed_at)
                .to_std()
                .unwrap_or_default();
            if elapsed <= self.config.access_token_lifetime {
                debug!("Access token is still fresh, skipping refresh");
                return Ok(());
            }
        }

        let body = json!({ "refresh_token": self.credentials.refresh_token });
        let response = self.post(REFRESH_ENDPOINT, Some(&body)).await?;
        let (access, refresh) = response.json::<TokenResponse>()?.into_pair(&response)?;
        let now = self.runtime.now();
        self.credentials.set_tokens(access, refresh, now);
        debug!("Access token refreshed");
        Ok(())
    }

    /// Creates an account for `email` and stores the tokens it comes with.
    #[tracing::instrument(skip(self, name))]
    pub async fn signup_by_email(
        &mut self,
        email: &str,
        name: &str,
        country_id: &str,
        newsletter_opt_in: bool,
    ) -> Result<Credentials> {
        let body = json!({
            "country_id": country_id,
            "device_type": self.config.device_type,
            "email": email,
            "name": name,
            "newsletter_opt_in": newsletter_opt_in,
            "push_notification_opt_in": true,
        });
        let response = self.post(SIGNUP_BY_EMAIL_ENDPOINT, Some(&body)).await?;
        let (access, refresh) = response
            .json::<SignUpResponse>()?
            .login_response
            .into_pair(&response)?;

        self.credentials.email = Some(email.to_string());
        let now = self.runtime.now();
        self.credentials.set_tokens(access, refresh, now);
        Ok(self.credentials.clone())
    }

    /// Logs in if needed and returns everything required to resume later.
    pub async fn get_credentials(&mut self) -> Result<Credentials> {
        self.login().await?;
        let mut credentials = self.credentials.clone();
        if let Some(cookie) = self.session.as_ref().and_then(|s| s.challenge_cookie()) {
            credentials.challenge_cookie = Some(cookie);
        }
        Ok(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polling_session_counts_down() {
        let mut polling = PollingSession::new("id".to_string(), 2);
        assert!(polling.take_attempt());
        assert_eq!(polling.attempts_remaining, 1);
        assert!(polling.take_attempt());
        assert!(!polling.take_attempt());
        assert_eq!(polling.attempts_remaining, 0);
    }

    #[test]
    fn test_token_response_requires_both_tokens() {
        let response = ApiResponse {
            status: StatusCode::OK,
            body: r#"{"access_token":"a"}"#.to_string(),
        };
        let tokens: TokenResponse = response.json().unwrap();
        let err = tokens.into_pair(&response).unwrap_err();
        assert_eq!(err.status(), Some(200));
    }
}
