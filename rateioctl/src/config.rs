use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Debug, Parser)]
#[command(name = "rateioctl", version, about = "Credit ledger and payout control service for the Rateio marketplace")]
pub struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "RATEIOCTL_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Service configuration, layered as defaults, then the YAML file, then
/// `RATEIOCTL_`-prefixed environment variables (nested fields join with
/// `__`, e.g. `RATEIOCTL_CACHE__TTL=30s`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Email of the bootstrap admin account created at startup
    pub admin_email: String,
    pub auth: AuthConfig,
    pub cache: CacheConfig,
    pub withdrawals: WithdrawalsConfig,
    pub enable_metrics: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8085,
            database_url: "postgres://postgres@localhost/rateio".to_string(),
            admin_email: "admin@rateio.local".to_string(),
            auth: AuthConfig::default(),
            cache: CacheConfig::default(),
            withdrawals: WithdrawalsConfig::default(),
            enable_metrics: true,
        }
    }
}

impl Config {
    pub fn load(args: &Args) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = &args.config {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment.merge(Env::prefixed("RATEIOCTL_").split("__")).extract()?;
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    pub proxy_header: ProxyHeaderAuthConfig,
    pub security: SecurityConfig,
}

/// Authentication trusts a reverse proxy to assert the caller's email in a
/// request header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyHeaderAuthConfig {
    pub header_name: String,
}

impl Default for ProxyHeaderAuthConfig {
    fn default() -> Self {
        Self {
            header_name: "X-Rateio-User".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<CorsOrigin>,
    pub allow_credentials: bool,
    /// Preflight max age in seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            allow_credentials: false,
            max_age: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CorsOrigin {
    Wildcard,
    Url(Url),
}

impl TryFrom<String> for CorsOrigin {
    type Error = url::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == "*" {
            Ok(CorsOrigin::Wildcard)
        } else {
            Ok(CorsOrigin::Url(value.parse()?))
        }
    }
}

impl From<CorsOrigin> for String {
    fn from(origin: CorsOrigin) -> Self {
        match origin {
            CorsOrigin::Wildcard => "*".to_string(),
            CorsOrigin::Url(url) => url.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default entry lifetime
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// How often the sweeper reclaims expired entries
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalsConfig {
    /// Smallest amount a user may request to withdraw
    pub minimum_amount: Decimal,
}

impl Default for WithdrawalsConfig {
    fn default() -> Self {
        Self {
            minimum_amount: Decimal::from(50),
        }
    }
}
