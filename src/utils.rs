use std::env;

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 5020;
pub const DEFAULT_BODY_LIMIT_MB: usize = 15;
pub const DEFAULT_GATEWAY_URL: &str = "https://ai.gateway.lovable.dev/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-pro";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_GATEWAY_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub port: u16,
    pub body_limit_bytes: usize,
    pub gateway: GatewayConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            body_limit_bytes: DEFAULT_BODY_LIMIT_MB * 1024 * 1024,
            gateway: GatewayConfig::default(),
        }
    }
}

/// Reads the service configuration from the process environment.
pub fn get_env() -> Result<ServiceConfig, ConfigError> {
    from_lookup(|name| env::var(name).ok())
}

fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<ServiceConfig, ConfigError> {
    let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    let body_limit_bytes = match non_empty("BODY_LIMIT_MB") {
        Some(value) => {
            let mb = value
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::Invalid {
                    name: "BODY_LIMIT_MB",
                    expected: "a valid integer",
                    value: value.clone(),
                })?;
            mb * 1024 * 1024
        }
        None => DEFAULT_BODY_LIMIT_MB * 1024 * 1024,
    };

    let port = match non_empty("PORT") {
        Some(value) => value
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::Invalid {
                name: "PORT",
                expected: "a valid number between 0 and 65535",
                value: value.clone(),
            })?,
        None => DEFAULT_PORT,
    };

    let gateway = GatewayConfig {
        url: non_empty("AI_GATEWAY_URL").unwrap_or_else(|| DEFAULT_GATEWAY_URL.into()),
        api_key: non_empty("AI_GATEWAY_API_KEY"),
        model: non_empty("AI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
    };

    Ok(ServiceConfig {
        port,
        body_limit_bytes,
        gateway,
    })
}
