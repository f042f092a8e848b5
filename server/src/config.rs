//! Server configuration module.
//!
//! This module provides configuration loading for the token service from
//! environment variables.
//!
//! # Environment Variables
//!
//! - `TOKEND_TOKENS_SOURCE`: Path or URL of the JSON token payload. Watched for changes.
//! - `TOKEND_CLIENT_SECRETS`: Comma-separated client secrets, used when no source is set.
//! - `TOKEND_SERVER_SECRETS`: Comma-separated server secrets, used when no source is set.
//! - `TOKEND_RELOAD_SECONDS`: Seconds between source reloads (default: `5`)
//! - `TOKEND_HTTP_TIMEOUT_SECONDS`: Timeout for HTTP sources (default: `10`)
//! - `TOKEND_LISTEN_PORT`: Port to listen on (default: `3000`)
//!
//! # Invariants
//!
//! - A watched source always has a non-zero reload interval
//! - A static source always holds at least one secret

use std::time::Duration;

/// Where the token set comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSourceConfig {
    /// A JSON payload that is reloaded periodically.
    Watched {
        /// File path or HTTP(S) URL.
        descriptor: String,
        /// Time between reloads.
        reload_interval: Duration,
    },
    /// Fixed secret lists without origin restrictions.
    Static {
        /// Client secrets.
        client_secrets: Vec<String>,
        /// Server secrets.
        server_secrets: Vec<String>,
    },
}

/// Server configuration.
///
/// # Post-conditions
///
/// - `listen_port` is always a valid port number
/// - `http_timeout` is non-zero
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Source of the token registry.
    pub token_source: TokenSourceConfig,
    /// Port to listen on for HTTP requests.
    pub listen_port: u16,
    /// Timeout applied to HTTP token sources.
    pub http_timeout: Duration,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable is missing.
    MissingEnvVar(String),
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingEnvVar(name) => {
                write!(f, "missing required environment variable: {name}")
            }
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl ServerConfig {
    /// Default port for the server.
    pub const DEFAULT_PORT: u16 = 3000;
    /// Default seconds between token reloads.
    pub const DEFAULT_RELOAD_SECONDS: u64 = 5;
    /// Default timeout for HTTP token sources, in seconds.
    pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Neither `TOKEND_TOKENS_SOURCE` nor any flat secret list is set
    /// - A numeric variable is set but not a positive integer
    /// - `TOKEND_LISTEN_PORT` is set but not a valid port number
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`ServerConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token_source = Self::load_token_source(&lookup)?;
        let listen_port = Self::load_listen_port(&lookup)?;
        let http_timeout = Duration::from_secs(Self::load_seconds(
            &lookup,
            "TOKEND_HTTP_TIMEOUT_SECONDS",
            Self::DEFAULT_HTTP_TIMEOUT_SECONDS,
        )?);

        Ok(Self {
            token_source,
            listen_port,
            http_timeout,
        })
    }

    /// Load the token source.
    ///
    /// A configured source takes precedence over flat secret lists.
    fn load_token_source(
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> Result<TokenSourceConfig, ConfigError> {
        if let Some(descriptor) = lookup("TOKEND_TOKENS_SOURCE")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
        {
            let reload_interval = Duration::from_secs(Self::load_seconds(
                lookup,
                "TOKEND_RELOAD_SECONDS",
                Self::DEFAULT_RELOAD_SECONDS,
            )?);
            return Ok(TokenSourceConfig::Watched {
                descriptor,
                reload_interval,
            });
        }

        let client_secrets = split_list(lookup("TOKEND_CLIENT_SECRETS").as_deref());
        let server_secrets = split_list(lookup("TOKEND_SERVER_SECRETS").as_deref());
        if client_secrets.is_empty() && server_secrets.is_empty() {
            return Err(ConfigError::MissingEnvVar(
                "TOKEND_TOKENS_SOURCE".to_string(),
            ));
        }

        Ok(TokenSourceConfig::Static {
            client_secrets,
            server_secrets,
        })
    }

    /// Load a positive number of seconds.
    ///
    /// Returns `default` if not set.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is set but not a positive integer.
    fn load_seconds(
        lookup: &impl Fn(&str) -> Option<String>,
        name: &str,
        default: u64,
    ) -> Result<u64, ConfigError> {
        let Some(value) = lookup(name) else {
            return Ok(default);
        };
        match value.trim().parse::<u64>() {
            Ok(seconds) if seconds > 0 => Ok(seconds),
            _ => Err(ConfigError::InvalidValue {
                name: name.to_string(),
                message: format!("'{value}' is not a positive number of seconds"),
            }),
        }
    }

    /// Load the listen port.
    ///
    /// Returns the default if not set.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is set but not a valid port number.
    fn load_listen_port(lookup: &impl Fn(&str) -> Option<String>) -> Result<u16, ConfigError> {
        match lookup("TOKEND_LISTEN_PORT") {
            Some(value) => value.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                name: "TOKEND_LISTEN_PORT".to_string(),
                message: format!("'{value}' is not a valid port number (must be 1-65535)"),
            }),
            None => Ok(Self::DEFAULT_PORT),
        }
    }
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_values() {
        assert_eq!(ServerConfig::DEFAULT_PORT, 3000);
        assert_eq!(ServerConfig::DEFAULT_RELOAD_SECONDS, 5);
        assert_eq!(ServerConfig::DEFAULT_HTTP_TIMEOUT_SECONDS, 10);
    }

    #[test]
    fn test_watched_source_with_defaults() {
        let config = load(&[("TOKEND_TOKENS_SOURCE", "/etc/tokend/tokens.json")])
            .expect("valid config");
        assert_eq!(
            config.token_source,
            TokenSourceConfig::Watched {
                descriptor: "/etc/tokend/tokens.json".to_string(),
                reload_interval: Duration::from_secs(5),
            }
        );
        assert_eq!(config.listen_port, 3000);
        assert_eq!(config.http_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_source_takes_precedence_over_lists() {
        let config = load(&[
            ("TOKEND_TOKENS_SOURCE", "https://config.internal/tokens"),
            ("TOKEND_RELOAD_SECONDS", "30"),
            ("TOKEND_CLIENT_SECRETS", "c1"),
        ])
        .expect("valid config");
        assert!(matches!(
            config.token_source,
            TokenSourceConfig::Watched { reload_interval, .. } if reload_interval == Duration::from_secs(30)
        ));
    }

    #[test]
    fn test_static_lists() {
        let config = load(&[
            ("TOKEND_CLIENT_SECRETS", "c1, c2,,"),
            ("TOKEND_SERVER_SECRETS", "s1"),
            ("TOKEND_LISTEN_PORT", "8080"),
        ])
        .expect("valid config");
        assert_eq!(
            config.token_source,
            TokenSourceConfig::Static {
                client_secrets: vec!["c1".to_string(), "c2".to_string()],
                server_secrets: vec!["s1".to_string()],
            }
        );
        assert_eq!(config.listen_port, 8080);
    }

    #[test]
    fn test_missing_source() {
        assert_eq!(
            load(&[("TOKEND_CLIENT_SECRETS", " , ")]).err(),
            Some(ConfigError::MissingEnvVar("TOKEND_TOKENS_SOURCE".to_string()))
        );
    }

    #[test]
    fn test_invalid_numbers() {
        let zero = load(&[("TOKEND_TOKENS_SOURCE", "t.json"), ("TOKEND_RELOAD_SECONDS", "0")]);
        assert!(matches!(zero, Err(ConfigError::InvalidValue { name, .. }) if name == "TOKEND_RELOAD_SECONDS"));

        let port = load(&[("TOKEND_TOKENS_SOURCE", "t.json"), ("TOKEND_LISTEN_PORT", "70000")]);
        assert!(matches!(port, Err(ConfigError::InvalidValue { name, .. }) if name == "TOKEND_LISTEN_PORT"));

        let timeout = load(&[
            ("TOKEND_TOKENS_SOURCE", "t.json"),
            ("TOKEND_HTTP_TIMEOUT_SECONDS", "soon"),
        ]);
        assert!(timeout.is_err());
    }

    #[test]
    fn test_config_error_display_missing() {
        let error = ConfigError::MissingEnvVar("TEST_VAR".to_string());
        assert_eq!(
            error.to_string(),
            "missing required environment variable: TEST_VAR"
        );
    }

    #[test]
    fn test_config_error_display_invalid() {
        let error = ConfigError::InvalidValue {
            name: "TEST_VAR".to_string(),
            message: "bad value".to_string(),
        };
        assert_eq!(error.to_string(), "invalid value for TEST_VAR: bad value");
    }
}
