//! Device signatures and app version discovery.
//!
//! The backend expects requests from its Android app, so the user agent is one
//! of a few plausible device signatures stamped with the current app version.
//! The version is read from the public store listing, where it sits inside a
//! script-injected JSON blob.

use log::{debug, warn};
use regex::Regex;
use reqwest::Client;
use std::sync::LazyLock;
use std::time::Duration;

use crate::config::APP_STORE_URL;
use crate::error::{Error, Result};
use crate::runtime::Runtime;

/// Version used when the store listing cannot be read.
pub const DEFAULT_APK_VERSION: &str = "24.11.0";

/// Device signatures; `{}` is replaced by the app version.
pub const USER_AGENTS: [&str; 3] = [
    "TGTG/{} Dalvik/2.1.0 (Linux; U; Android 9; Nexus 5 Build/M4B30Z)",
    "TGTG/{} Dalvik/2.1.0 (Linux; U; Android 10; SM-G935F Build/NRD90M)",
    "TGTG/{} Dalvik/2.1.0 (Linux; Android 12; SM-G920V Build/MMB29K)",
];

const APP_STORE_TIMEOUT: Duration = Duration::from_secs(30);

static APK_DATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"AF_initDataCallback\(\{key:\s*'ds:5'.*?data:([\s\S]*?), sideChannel:.+</script")
        .expect("app store regex is valid")
});

/// Signature number `index` (wrapped into range) for `version`.
pub fn user_agent_for(version: &str, index: usize) -> String {
    USER_AGENTS[index % USER_AGENTS.len()].replace("{}", version)
}

/// Random signature for `version`.
pub fn random_user_agent<R: Runtime + ?Sized>(runtime: &R, version: &str) -> String {
    user_agent_for(version, runtime.choose_index(USER_AGENTS.len()))
}

/// Pulls the app version out of the store listing HTML.
pub fn parse_apk_version(html: &str) -> Result<String> {
    let captures = APK_DATA_RE
        .captures(html)
        .ok_or_else(|| Error::VersionLookup("app data blob not found in listing".to_string()))?;
    let data: serde_json::Value = serde_json::from_str(&captures[1])?;

    data[1][2][140][0][0][0]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::VersionLookup("version field missing from app data".to_string()))
}

/// Fetches the latest app version from the store listing at `url`.
#[tracing::instrument(skip(client))]
pub async fn fetch_latest_apk_version(client: &Client, url: &str) -> Result<String> {
    debug!("Fetching latest APK version from {}...", url);

    let html = client
        .get(url)
        .timeout(APP_STORE_TIMEOUT)
        .send()
        .await?
        .text()
        .await?;

    let version = parse_apk_version(&html)?;
    debug!("Latest APK version is {}", version);
    Ok(version)
}

/// Fetches the latest app version from the public store listing.
pub async fn get_latest_apk_version() -> Result<String> {
    fetch_latest_apk_version(&Client::new(), APP_STORE_URL).await
}

/// Like [`fetch_latest_apk_version`], but falls back to [`DEFAULT_APK_VERSION`].
pub async fn latest_apk_version_or_default(client: &Client, url: &str) -> String {
    match fetch_latest_apk_version(client, url).await {
        Ok(version) => version,
        Err(e) => {
            warn!("Failed to get latest APK version ({}), using {}", e, DEFAULT_APK_VERSION);
            DEFAULT_APK_VERSION.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use serde_json::{Value, json};

    /// Builds a listing page with `version` at the nested position the store uses.
    pub(crate) fn listing_html(version: &str) -> String {
        let mut level2 = vec![Value::Null; 141];
        level2[140] = json!([[[version]]]);
        let data = json!([null, [null, null, level2]]);
        format!(
            "<html><script nonce=\"x\">AF_initDataCallback({{key: 'ds:5', hash: '1', data:{}, sideChannel: {{}}}});</script></html>",
            data
        )
    }

    #[test]
    fn test_user_agent_for_formats_version() {
        assert_eq!(
            user_agent_for("25.1.0", 0),
            "TGTG/25.1.0 Dalvik/2.1.0 (Linux; U; Android 9; Nexus 5 Build/M4B30Z)"
        );
        assert!(user_agent_for("25.1.0", 2).contains("SM-G920V"));
        assert_eq!(user_agent_for("1", 3), user_agent_for("1", 0));
    }

    #[test]
    fn test_random_user_agent_uses_runtime_choice() {
        let mut runtime = MockRuntime::new();
        runtime.expect_choose_index().with(mockall::predicate::eq(3)).returning(|_| 1);
        assert!(random_user_agent(&runtime, "24.11.0").contains("SM-G935F"));
    }

    #[test]
    fn test_parse_apk_version() {
        assert_eq!(parse_apk_version(&listing_html("25.3.1")).unwrap(), "25.3.1");
    }

    #[test]
    fn test_parse_apk_version_missing_blob() {
        let result = parse_apk_version("<html>nothing here</html>");
        assert!(matches!(result, Err(Error::VersionLookup(_))));
    }

    #[test]
    fn test_parse_apk_version_wrong_shape() {
        let html = "<script>AF_initDataCallback({key: 'ds:5', data:[1, 2], sideChannel: {}});</script>";
        assert!(matches!(parse_apk_version(html), Err(Error::VersionLookup(_))));
    }

    #[tokio::test]
    async fn test_fetch_latest_apk_version() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/store/apps/details")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(listing_html("25.2.0"))
            .create_async()
            .await;

        let url = format!("{}/store/apps/details?id=com.app.tgtg", server.url());
        let version = fetch_latest_apk_version(&Client::new(), &url).await.unwrap();

        mock.assert_async().await;
        assert_eq!(version, "25.2.0");
    }

    #[tokio::test]
    async fn test_latest_apk_version_falls_back_to_default() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/")
            .with_status(500)
            .with_body("oops")
            .create_async()
            .await;

        let version = latest_apk_version_or_default(&Client::new(), &server.url()).await;
        assert_eq!(version, DEFAULT_APK_VERSION);
    }
}
