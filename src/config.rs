use clap::Parser;
use coral::{ClientOptions, ProviderCredentials, WsClientOptions};
use thiserror::Error;

#[derive(Debug, Parser, Clone)]
#[command(name = "coral-relay")]
#[command(about = "Relays browser sessions to a Coral multi-agent server")]
pub struct Config {
    /// Port for the HTTP server (default: $PORT or 3000)
    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// `--port`, then `$PORT`, then 3000.
    pub fn listen_port(&self) -> Result<u16, ConfigError> {
        if let Some(port) = self.port {
            return Ok(port);
        }
        match std::env::var("PORT") {
            Ok(raw) => parse_port("PORT", &raw),
            Err(_) => Ok(3000),
        }
    }

    pub fn listen_addr(&self) -> Result<String, ConfigError> {
        Ok(format!("{}:{}", self.host, self.listen_port()?))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid port in {key}: {value:?}")]
    InvalidPort { key: &'static str, value: String },
}

/// Where the remote Coral server lives and how to talk to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoralConfig {
    pub host: String,
    pub port: u16,
    pub application_id: String,
    pub privacy_key: String,
    pub credentials: ProviderCredentials,
    /// Unset values fall back to the socket client's defaults.
    pub max_reconnect_attempts: Option<u32>,
    pub reconnect_delay_ms: Option<u64>,
}

impl CoralConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        application_id: impl Into<String>,
        privacy_key: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            application_id: application_id.into(),
            privacy_key: privacy_key.into(),
            credentials: ProviderCredentials::default(),
            max_reconnect_attempts: None,
            reconnect_delay_ms: None,
        }
    }

    /// Read `CORAL_SERVER_HOST`, `CORAL_SERVER_PORT`, `CORAL_APP_ID`,
    /// `CORAL_PRIVACY_KEY` and the optional provider credentials.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing(key))
        };
        let optional = |key: &str| lookup(key).unwrap_or_default();

        let host = required("CORAL_SERVER_HOST")?;
        let port = parse_port("CORAL_SERVER_PORT", &required("CORAL_SERVER_PORT")?)?;
        let mut config = Self::new(
            host,
            port,
            required("CORAL_APP_ID")?,
            required("CORAL_PRIVACY_KEY")?,
        );
        config.credentials = ProviderCredentials {
            deepseek_api_key: optional("DEEPSEEK_API_KEY"),
            qdrant_api_key: optional("QDRANT_API_KEY"),
            qdrant_url: optional("QDRANT_URL"),
            codestral_api_key: optional("CODESTRAL_API_KEY"),
        };
        Ok(config)
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions::new(
            &self.host,
            self.port,
            &self.application_id,
            &self.privacy_key,
        )
        .with_credentials(self.credentials.clone())
    }

    pub fn ws_options(&self, session_id: &str) -> WsClientOptions {
        let mut options = WsClientOptions::new(
            self.client_options().base_url,
            &self.application_id,
            &self.privacy_key,
            session_id,
        );
        options.max_reconnect_attempts = self.max_reconnect_attempts;
        options.reconnect_delay_ms = self.reconnect_delay_ms;
        options
    }
}

/// How each new session finds its Coral server.
#[derive(Debug, Clone)]
pub enum CoralSource {
    /// Re-read the environment every time a session is created.
    Environment,
    Fixed(CoralConfig),
}

impl CoralSource {
    pub fn resolve(&self) -> Result<CoralConfig, ConfigError> {
        match self {
            Self::Environment => CoralConfig::from_env(),
            Self::Fixed(config) => Ok(config.clone()),
        }
    }
}

fn parse_port(key: &'static str, raw: &str) -> Result<u16, ConfigError> {
    raw.trim()
        .parse::<u16>()
        .map_err(|_| ConfigError::InvalidPort {
            key,
            value: raw.to_string(),
        })
}
