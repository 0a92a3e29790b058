use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::time::Duration;
use tgtg_client::{ClientConfig, ItemQuery, Proxies, TgtgClient, get_latest_apk_version};

/// tgtg - command line client for the surplus food marketplace
///
/// Logs in with an email (confirm the link sent to your mailbox) or with a
/// previously exported token pair, then prints the requested data as JSON.
///
/// Examples:
///   tgtg --email me@example.com credentials   # Log in and print credentials to reuse
///   tgtg items --latitude 51.5 --longitude -0.12 --all
#[derive(Parser, Debug)]
#[command(author, version = env!("TGTG_CLIENT_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Account email, used when no token pair is given
    #[arg(long, env = "TGTG_EMAIL", global = true)]
    email: Option<String>,

    /// Access token from a previous login
    #[arg(long, env = "TGTG_ACCESS_TOKEN", hide_env_values = true, global = true)]
    access_token: Option<String>,

    /// Refresh token from a previous login
    #[arg(long, env = "TGTG_REFRESH_TOKEN", hide_env_values = true, global = true)]
    refresh_token: Option<String>,

    /// Anti-bot challenge cookie from a previous login
    #[arg(long, env = "TGTG_COOKIE", hide_env_values = true, global = true)]
    cookie: Option<String>,

    /// API URL (defaults to https://apptoogoodtogo.com/api/)
    #[arg(long, env = "TGTG_BASE_URL", value_name = "URL", global = true)]
    base_url: Option<String>,

    /// Anti-bot vendor endpoint that issues challenge cookies
    #[arg(long, env = "TGTG_CHALLENGE_URL", value_name = "URL", global = true)]
    challenge_url: Option<String>,

    /// App version to claim instead of looking up the latest one
    #[arg(long, env = "TGTG_APK_VERSION", global = true)]
    apk_version: Option<String>,

    /// Fixed user agent instead of a random device signature
    #[arg(long, env = "TGTG_USER_AGENT", global = true)]
    user_agent: Option<String>,

    /// Accept-Language header
    #[arg(long, env = "TGTG_LANGUAGE", global = true)]
    language: Option<String>,

    /// Proxy for all requests
    #[arg(long, env = "TGTG_PROXY", value_name = "URL", global = true)]
    proxy: Option<String>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECONDS", global = true)]
    timeout: Option<u64>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Log in and print the credentials to reuse next time
    Credentials,

    /// List items
    Items(ItemsArgs),

    /// List all favorite items
    Favorites,

    /// Show a single item
    Item(ItemArgs),

    /// Print the latest app version from the app store
    ApkVersion,
}

#[derive(clap::Args, Debug)]
struct ItemsArgs {
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    latitude: f64,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    longitude: f64,

    /// Search radius in km
    #[arg(long, default_value_t = 21)]
    radius: u32,

    #[arg(long, default_value_t = 1)]
    page: u32,

    #[arg(long, default_value_t = 20)]
    page_size: u32,

    /// Include items that are not favorites
    #[arg(long)]
    all: bool,
}

#[derive(clap::Args, Debug)]
struct ItemArgs {
    #[arg(value_name = "ITEM_ID")]
    item_id: String,
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::default();
        if let Some(url) = &self.base_url {
            config = config.with_base_url(url);
        }
        if let Some(url) = &self.challenge_url {
            config = config.with_challenge_url(url);
        }
        if let Some(email) = &self.email {
            config = config.with_email(email);
        }
        if let (Some(access), Some(refresh)) = (&self.access_token, &self.refresh_token) {
            config = config.with_tokens(access, refresh);
        }
        if let Some(cookie) = &self.cookie {
            config = config.with_challenge_cookie(cookie);
        }
        if let Some(version) = &self.apk_version {
            config = config.with_apk_version(version);
        }
        if let Some(user_agent) = &self.user_agent {
            config = config.with_user_agent(user_agent);
        }
        if let Some(language) = &self.language {
            config = config.with_language(language);
        }
        if let Some(proxy) = &self.proxy {
            config = config.with_proxies(Proxies::all(proxy));
        }
        if let Some(seconds) = self.timeout {
            config = config.with_timeout(Duration::from_secs(seconds));
        }
        config
    }
}

impl ItemsArgs {
    fn query(&self) -> ItemQuery {
        ItemQuery {
            page: self.page,
            page_size: self.page_size,
            favorites_only: !self.all,
            ..ItemQuery::near(self.latitude, self.longitude, self.radius)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Commands::ApkVersion = cli.command {
        println!("{}", get_latest_apk_version().await?);
        return Ok(());
    }

    let mut client = TgtgClient::new(cli.client_config())?;
    match &cli.command {
        Commands::Credentials => print_json(&client.get_credentials().await?)?,
        Commands::Items(args) => print_json(&client.get_items(&args.query()).await?)?,
        Commands::Favorites => print_json(&client.get_favorites().await?)?,
        Commands::Item(args) => print_json(&client.get_item(&args.item_id).await?)?,
        Commands::ApkVersion => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_items_parsing() {
        let cli = Cli::try_parse_from([
            "tgtg",
            "items",
            "--latitude",
            "51.5",
            "--longitude",
            "-0.12",
            "--all",
        ])
        .unwrap();
        match cli.command {
            Commands::Items(args) => {
                let query = args.query();
                assert_eq!(query.origin.latitude, 51.5);
                assert_eq!(query.origin.longitude, -0.12);
                assert_eq!(query.radius, 21);
                assert!(!query.favorites_only);
            }
            other => panic!("expected items command, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_items_defaults_to_favorites() {
        let cli = Cli::try_parse_from(["tgtg", "items"]).unwrap();
        match cli.command {
            Commands::Items(args) => assert!(args.query().favorites_only),
            other => panic!("expected items command, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_item_requires_id() {
        assert!(Cli::try_parse_from(["tgtg", "item"]).is_err());
        let cli = Cli::try_parse_from(["tgtg", "item", "12345"]).unwrap();
        match cli.command {
            Commands::Item(args) => assert_eq!(args.item_id, "12345"),
            other => panic!("expected item command, got {:?}", other),
        }
    }

    #[test]
    fn test_client_config_from_flags() {
        let cli = Cli::try_parse_from([
            "tgtg",
            "--access-token",
            "a",
            "--refresh-token",
            "r",
            "--base-url",
            "http://localhost:1234/api/",
            "--timeout",
            "10",
            "favorites",
        ])
        .unwrap();
        let config = cli.client_config();
        assert_eq!(config.access_token.as_deref(), Some("a"));
        assert_eq!(config.refresh_token.as_deref(), Some("r"));
        assert_eq!(config.base_url, "http://localhost:1234/api/");
        assert_eq!(config.timeout, Some(Duration::from_secs(10)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_half_token_pair_is_ignored() {
        let cli = Cli::try_parse_from(["tgtg", "--access-token", "a", "favorites"]).unwrap();
        let config = cli.client_config();
        assert_eq!(config.access_token, None);
    }
}
