use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    Live,
    Sandbox,
}

impl FromStr for GatewayMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" | "production" => Ok(GatewayMode::Live),
            "sandbox" | "test" => Ok(GatewayMode::Sandbox),
            other => anyhow::bail!("GATEWAY_MODE must be 'live' or 'sandbox', got '{}'", other),
        }
    }
}

impl fmt::Display for GatewayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayMode::Live => f.write_str("live"),
            GatewayMode::Sandbox => f.write_str("sandbox"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be 'pretty' or 'json', got '{}'", other),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub gateway_mode: GatewayMode,
    pub gateway_signature_secret: Option<String>,
    pub gateway_base_url: String,
    pub gateway_api_key: String,
    pub gateway_timeout_secs: u64,
    pub ledger_timeout_secs: u64,
    pub return_base_url: String,
    pub cors_allowed_origins: Option<String>,
    pub log_format: LogFormat,
    pub log_request_body: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let log_format = match env::var("LOG_FORMAT") {
            Ok(value) => value.parse()?,
            Err(_) => LogFormat::Pretty,
        };

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            gateway_mode: env::var("GATEWAY_MODE")
                .unwrap_or_else(|_| "sandbox".to_string())
                .parse()?,
            gateway_signature_secret: env::var("GATEWAY_SIGNATURE_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            gateway_base_url: env::var("GATEWAY_BASE_URL")?,
            gateway_api_key: env::var("GATEWAY_API_KEY")?,
            gateway_timeout_secs: env::var("GATEWAY_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()?,
            ledger_timeout_secs: env::var("LEDGER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            return_base_url: env::var("RETURN_BASE_URL")?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS").ok(),
            log_format,
            log_request_body: env::var("LOG_REQUEST_BODY")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
        })
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger_timeout_secs)
    }
}
