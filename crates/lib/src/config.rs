//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.linehook/config.json`) and environment.
//! Channel credentials usually come from `LINE_CHANNEL_SECRET` and
//! `LINE_CHANNEL_ACCESS_TOKEN`; both are required before the gateway starts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Messaging channel credentials and API endpoint.
    #[serde(default)]
    pub line: LineConfig,
}

/// Gateway bind, port, and shutdown settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for the webhook listener (default 5000). Overridden by PORT env.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// How long to wait for in-flight deliveries on shutdown (default 10s).
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

fn default_gateway_port() -> u16 {
    5000
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_drain_timeout_secs() -> u64 {
    10
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

/// Channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineConfig {
    /// Channel secret used to verify webhook signatures. Overridden by LINE_CHANNEL_SECRET env.
    pub channel_secret: Option<String>,
    /// Channel access token for the reply API. Overridden by LINE_CHANNEL_ACCESS_TOKEN env.
    pub channel_access_token: Option<String>,
    /// Messaging API base URL (default https://api.line.me). Overridden by LINE_API_BASE env.
    pub api_base: Option<String>,
}

/// Channel secret: non-empty, shared read-only for the life of the process.
#[derive(Clone)]
pub struct SharedSecret(Arc<[u8]>);

impl SharedSecret {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, CredentialsError> {
        let bytes = secret.as_ref();
        if bytes.is_empty() {
            return Err(CredentialsError::MissingChannelSecret);
        }
        Ok(Self(Arc::from(bytes)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

/// Credentials the gateway needs before it may accept requests.
#[derive(Clone)]
pub struct Credentials {
    pub channel_secret: SharedSecret,
    pub access_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("channel_secret", &self.channel_secret)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("channel secret is not configured (set LINE_CHANNEL_SECRET or line.channelSecret)")]
    MissingChannelSecret,
    #[error("channel access token is not configured (set LINE_CHANNEL_ACCESS_TOKEN or line.channelAccessToken)")]
    MissingAccessToken,
}

/// Env value wins over config value; blank values count as unset.
fn env_or_config(env_value: Option<String>, config_value: Option<&String>) -> Option<String> {
    env_value
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config_value
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve the channel secret: env LINE_CHANNEL_SECRET overrides config.
pub fn resolve_channel_secret(config: &Config) -> Option<String> {
    env_or_config(
        std::env::var("LINE_CHANNEL_SECRET").ok(),
        config.line.channel_secret.as_ref(),
    )
}

/// Resolve the access token: env LINE_CHANNEL_ACCESS_TOKEN overrides config.
pub fn resolve_access_token(config: &Config) -> Option<String> {
    env_or_config(
        std::env::var("LINE_CHANNEL_ACCESS_TOKEN").ok(),
        config.line.channel_access_token.as_ref(),
    )
}

/// Resolve the Messaging API base URL: env LINE_API_BASE overrides config. None means the default.
pub fn resolve_api_base(config: &Config) -> Option<String> {
    env_or_config(std::env::var("LINE_API_BASE").ok(), config.line.api_base.as_ref())
}

/// Resolve both credentials; either one missing is a startup failure.
pub fn resolve_credentials(config: &Config) -> Result<Credentials, CredentialsError> {
    credentials_from(resolve_channel_secret(config), resolve_access_token(config))
}

fn credentials_from(
    secret: Option<String>,
    access_token: Option<String>,
) -> Result<Credentials, CredentialsError> {
    let channel_secret = SharedSecret::new(secret.unwrap_or_default())?;
    let access_token = access_token
        .filter(|t| !t.is_empty())
        .ok_or(CredentialsError::MissingAccessToken)?;
    Ok(Credentials {
        channel_secret,
        access_token,
    })
}

/// Apply the PORT env override (as used by container platforms).
pub fn apply_env_overrides(config: &mut Config) {
    if let Ok(p) = std::env::var("PORT") {
        match p.trim().parse::<u16>() {
            Ok(port) => config.gateway.port = port,
            Err(_) => log::warn!("ignoring invalid PORT value: {}", p),
        }
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("LINEHOOK_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".linehook").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path (or the default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
