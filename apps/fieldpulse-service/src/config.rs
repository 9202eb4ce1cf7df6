use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use fieldpulse_ai::AiConfig;
use fieldpulse_api_client::FieldPulseClientConfig;
use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8790";
const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_STORE_PATH: &str = ".fieldpulse/documents.json";
const DEFAULT_SESSION_PATH: &str = ".fieldpulse/session.json";
const DEFAULT_WEBHOOK_TOLERANCE_SECONDS: u64 = 300;
const DEFAULT_SYNC_PAGE_SIZE: usize = 50;

/// How API keys are checked at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthVerifyMode {
    Remote,
    None,
}

impl AuthVerifyMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::None => "none",
        }
    }
}

impl FromStr for AuthVerifyMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "remote" => Ok(Self::Remote),
            "none" | "off" => Ok(Self::None),
            _ => Err(ConfigError::InvalidAuthVerify {
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub log_filter: String,
    /// `None` keeps documents in memory only.
    pub store_path: Option<PathBuf>,
    pub session_path: PathBuf,
    pub webhook_secret: Option<String>,
    pub webhook_tolerance_seconds: u64,
    pub sync_page_size: usize,
    pub auth_verify: AuthVerifyMode,
    pub api: FieldPulseClientConfig,
    pub ai: AiConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid FIELDPULSE_BIND_ADDR value '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("invalid FIELDPULSE_AUTH_VERIFY value '{value}': expected remote or none")]
    InvalidAuthVerify { value: String },
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr_raw =
            non_empty("FIELDPULSE_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr_raw
            .parse()
            .map_err(|source| ConfigError::InvalidBindAddr {
                value: bind_addr_raw,
                source,
            })?;

        let log_filter =
            non_empty("FIELDPULSE_LOG_FILTER").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let store_path = Some(
            non_empty("FIELDPULSE_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH)),
        );

        let session_path = non_empty("FIELDPULSE_SESSION_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_PATH));

        let webhook_secret = env::var("FIELDPULSE_WEBHOOK_SECRET")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let webhook_tolerance_seconds = non_empty("FIELDPULSE_WEBHOOK_TOLERANCE_SECONDS")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_WEBHOOK_TOLERANCE_SECONDS)
            .max(1);

        let sync_page_size = non_empty("FIELDPULSE_SYNC_PAGE_SIZE")
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_SYNC_PAGE_SIZE)
            .max(1);

        let auth_verify = non_empty("FIELDPULSE_AUTH_VERIFY")
            .map(|value| value.parse::<AuthVerifyMode>())
            .transpose()?
            .unwrap_or(AuthVerifyMode::Remote);

        Ok(Self {
            bind_addr,
            log_filter,
            store_path,
            session_path,
            webhook_secret,
            webhook_tolerance_seconds,
            sync_page_size,
            auth_verify,
            api: FieldPulseClientConfig::from_env(),
            ai: AiConfig::from_env(),
        })
    }

    /// Base URL local clients use to reach this service. A wildcard bind
    /// address is reached over loopback.
    pub fn service_url(&self) -> String {
        let mut addr = self.bind_addr;
        if addr.ip().is_unspecified() {
            addr.set_ip(Ipv4Addr::LOCALHOST.into());
        }
        format!("http://{addr}")
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            log_filter: "debug".to_string(),
            store_path: None,
            session_path: std::env::temp_dir().join("fieldpulse-test-session.json"),
            webhook_secret: None,
            webhook_tolerance_seconds: DEFAULT_WEBHOOK_TOLERANCE_SECONDS,
            sync_page_size: DEFAULT_SYNC_PAGE_SIZE,
            auth_verify: AuthVerifyMode::None,
            api: FieldPulseClientConfig::new("http://127.0.0.1:9"),
            ai: AiConfig::default(),
        }
    }
}
