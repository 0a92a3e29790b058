use assert_cmd::Command;
use assert_cmd::cargo;
use mockito::{Matcher, Server};
use serde_json::json;

const TGTG_ENV: &[&str] = &[
    "TGTG_EMAIL",
    "TGTG_ACCESS_TOKEN",
    "TGTG_REFRESH_TOKEN",
    "TGTG_COOKIE",
    "TGTG_BASE_URL",
    "TGTG_CHALLENGE_URL",
    "TGTG_APK_VERSION",
    "TGTG_USER_AGENT",
    "TGTG_LANGUAGE",
    "TGTG_PROXY",
];

/// The binary with no inherited `TGTG_*` settings.
fn tgtg() -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("tgtg"));
    for var in TGTG_ENV {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_missing_credentials_fails() {
    tgtg()
        .args(["--base-url", "http://127.0.0.1:9/api/", "favorites"])
        .assert()
        .failure()
        .stderr(predicates::str::contains(
            "You must provide at least email or access_token and refresh_token",
        ));
}

#[test]
fn test_invalid_base_url_fails() {
    tgtg()
        .args(["--base-url", "ftp://example.com", "--email", "me@example.com", "favorites"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("base_url"));
}

#[test]
fn test_items_with_token_pair() {
    let mut server = Server::new();

    let refresh = server
        .mock("POST", "/api/token/v1/refresh")
        .match_body(Matcher::Json(json!({"refresh_token": "refresh-token"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "access-2", "refresh_token": "refresh-2"}"#)
        .expect(1)
        .create();
    let items = server
        .mock("POST", "/api/item/v9/")
        .match_header("authorization", "Bearer access-2")
        .match_header("user-agent", Matcher::Regex("^TGTG/25.1.0 ".to_string()))
        .match_body(Matcher::PartialJson(json!({
            "origin": {"latitude": 51.5, "longitude": -0.12},
            "favorites_only": false,
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"items": [{"item": {"item_id": "42"}, "display_name": "Bakery"}]}"#)
        .expect(1)
        .create();

    tgtg()
        .env("TGTG_ACCESS_TOKEN", "access-token")
        .env("TGTG_REFRESH_TOKEN", "refresh-token")
        .args([
            "--base-url",
            &format!("{}/api/", server.url()),
            "--apk-version",
            "25.1.0",
            "items",
            "--latitude",
            "51.5",
            "--longitude",
            "-0.12",
            "--all",
        ])
        .assert()
        .success()
        .stdout(predicates::str::contains("Bakery"))
        .stdout(predicates::str::contains("\"42\""));

    refresh.assert();
    items.assert();
}

#[test]
fn test_credentials_export_refreshed_tokens() {
    let mut server = Server::new();

    let _refresh = server
        .mock("POST", "/api/token/v1/refresh")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "access-2", "refresh_token": "refresh-2"}"#)
        .create();

    tgtg()
        .args([
            "--base-url",
            &format!("{}/api/", server.url()),
            "--apk-version",
            "25.1.0",
            "--access-token",
            "access-token",
            "--refresh-token",
            "refresh-token",
            "--cookie",
            "stored-cookie",
            "credentials",
        ])
        .assert()
        .success()
        .stdout(predicates::str::contains("\"access_token\": \"access-2\""))
        .stdout(predicates::str::contains("\"refresh_token\": \"refresh-2\""))
        .stdout(predicates::str::contains("\"datadome_cookie\": \"stored-cookie\""));
}

#[test]
fn test_blocked_request_recovers_with_challenge_cookie() {
    let mut server = Server::new();

    let _refresh = server
        .mock("POST", "/api/token/v1/refresh")
        .with_status(200)
        .with_body(r#"{"access_token": "access-2", "refresh_token": "refresh-2"}"#)
        .create();
    let blocked = server
        .mock("POST", "/api/item/v9/7")
        .with_status(403)
        .expect(1)
        .create();
    let allowed = server
        .mock("POST", "/api/item/v9/7")
        .match_header("cookie", "datadome=fresh-cookie")
        .with_status(200)
        .with_body(r#"{"item": {"item_id": "7"}}"#)
        .expect(1)
        .create();
    let sdk = server
        .mock("POST", "/sdk/")
        .with_status(200)
        .with_body(r#"{"status": 200, "cookie": "datadome=fresh-cookie; Path=/"}"#)
        .expect(1)
        .create();

    tgtg()
        .args([
            "--base-url",
            &format!("{}/api/", server.url()),
            "--challenge-url",
            &format!("{}/sdk/", server.url()),
            "--apk-version",
            "25.1.0",
            "--access-token",
            "access-token",
            "--refresh-token",
            "refresh-token",
            "item",
            "7",
        ])
        .assert()
        .success()
        .stdout(predicates::str::contains("\"item_id\": \"7\""));

    blocked.assert();
    allowed.assert();
    sdk.assert();
}
