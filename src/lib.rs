pub mod challenge;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod runtime;
pub mod user_agent;

pub use client::{ItemQuery, Origin, TgtgClient};
pub use config::{ClientConfig, Proxies};
pub use credentials::Credentials;
pub use error::{Error, Result};
pub use runtime::{RealRuntime, Runtime};
pub use user_agent::get_latest_apk_version;
