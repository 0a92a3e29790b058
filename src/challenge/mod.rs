//! Anti-bot challenge handling.
//!
//! A 403 from the backend usually means the challenge cookie is stale. A new
//! one is requested from the vendor SDK endpoint with a synthetic device
//! telemetry report. When that does not help, [`escalation`] decides how much
//! of the client identity to throw away.

pub mod escalation;

use log::{debug, info};
use reqwest::Client;
use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::http::CHALLENGE_COOKIE;
use crate::runtime::Runtime;
use crate::user_agent::DEFAULT_APK_VERSION;

pub use escalation::{Remediation, remediation};

/// User agent of the vendor SDK's own HTTP stack.
const SDK_USER_AGENT: &str = "okhttp/5.1.0";

/// Form body the vendor SDK submits when asking for a cookie.
#[derive(Debug, Serialize)]
struct ChallengeRequest<'a> {
    cid: String,
    ddk: &'static str,
    request: &'a str,
    ua: &'a str,
    events: String,
    inte: &'static str,
    ddv: &'static str,
    ddvc: &'a str,
    os: &'static str,
    osr: &'static str,
    osn: &'static str,
    osv: &'static str,
    screen_x: u32,
    screen_y: u32,
    screen_d: f32,
    camera: &'static str,
    mdl: &'static str,
    prd: &'static str,
    mnf: &'static str,
    dev: &'static str,
    hrd: &'static str,
    fgp: &'static str,
    tgs: &'static str,
    d_ifv: String,
}

#[derive(Debug, Serialize)]
struct SdkEvent {
    id: u32,
    message: &'static str,
    source: &'static str,
    date: i64,
}

#[derive(Debug, Deserialize)]
struct ChallengeResponse {
    cookie: String,
}

/// Inputs for one cookie request.
#[derive(Debug, Clone, Copy)]
pub struct ChallengeContext<'a> {
    /// Vendor SDK endpoint.
    pub sdk_url: &'a str,
    /// The request that was blocked.
    pub request_url: &'a str,
    pub user_agent: &'a str,
    pub apk_version: Option<&'a str>,
}

/// Accepts either a bare cookie value or a full `datadome=...; Path=/` cookie string.
pub fn cookie_value(raw: &str) -> Option<String> {
    let first = raw.split(';').next().unwrap_or_default().trim();
    let value = match first.split_once('=') {
        Some((name, value)) if name.trim() == CHALLENGE_COOKIE => value.trim(),
        _ => first,
    };
    (!value.is_empty()).then(|| value.to_string())
}

/// Requests a fresh challenge cookie from the vendor SDK endpoint.
///
/// `client` carries the caller's timeout and proxy settings and must not retry.
#[tracing::instrument(skip(client, runtime, ctx), fields(request_url = ctx.request_url))]
pub async fn fetch_challenge_cookie<R: Runtime + ?Sized>(
    client: &Client,
    runtime: &R,
    ctx: ChallengeContext<'_>,
) -> Result<String> {
    info!("Fetching new challenge cookie...");

    let events = serde_json::to_string(&[SdkEvent {
        id: 1,
        message: "response validation",
        source: "sdk",
        date: runtime.now().timestamp_millis(),
    }])?;

    let form = ChallengeRequest {
        cid: runtime.random_hex(32),
        ddk: "1D42C2CA6131C526E09F294FE96F94",
        request: ctx.request_url,
        ua: ctx.user_agent,
        events,
        inte: "android-java-okhttp",
        ddv: "3.0.4",
        ddvc: ctx.apk_version.unwrap_or(DEFAULT_APK_VERSION),
        os: "Android",
        osr: "14",
        osn: "UPSIDE_DOWN_CAKE",
        osv: "34",
        screen_x: 1440,
        screen_y: 3120,
        screen_d: 3.5,
        camera: r#"{"auth":"true", "info":"{\"front\":\"2000x1500\",\"back\":\"5472x3648\"}"}"#,
        mdl: "Pixel 7 Pro",
        prd: "Pixel 7 Pro",
        mnf: "Google",
        dev: "cheetah",
        hrd: "GS201",
        fgp: "google/cheetah/cheetah:14/UQ1A.240105.004/10814564:user/release-keys",
        tgs: "release-keys",
        d_ifv: runtime.random_hex(16),
    };

    let response: ChallengeResponse = client
        .post(ctx.sdk_url)
        .header(USER_AGENT, SDK_USER_AGENT)
        .form(&form)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let cookie = cookie_value(&response.cookie)
        .ok_or_else(|| Error::api(200, "challenge endpoint returned an empty cookie"))?;
    debug!("Received new challenge cookie");
    Ok(cookie)
}
