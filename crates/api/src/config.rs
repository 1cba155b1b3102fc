// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server configuration module
//!
//! This module provides configuration structures and loading logic for the explorer
//! API gateway. Configuration is read once at startup and is immutable afterwards;
//! the router builder receives it explicitly rather than reading global state.

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    time::Duration,
};

use anyhow::{Result, anyhow, ensure};
use config::{Config, ConfigError, Environment as ConfigEnv, File};
use serde::{Deserialize, Deserializer, Serialize, de};

use crate::error::{ServerError, ServerResult};

/// Default request body limit, matching the usual JSON body parser default of 100 KiB
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 100 * 1024;
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_WINDOW_MS: u64 = 60_000;
const DEFAULT_MAX_REQUESTS: u32 = 100;
const MAX_WINDOW_MS: u64 = 24 * 60 * 60 * 1000;

/// A validated server port that ensures the value is appropriate for the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerPort {
    port: u16,
    environment: Environment,
}

impl ServerPort {
    /// Create a new `ServerPort`, ensuring it's valid for the given environment
    ///
    /// # Errors
    ///
    /// Returns an error if the port is 0 in non-testing environments
    pub fn new(port: u16, environment: Environment) -> Result<Self> {
        if port == 0 && environment != Environment::Testing {
            return Err(anyhow!("port cannot be 0 in non-testing environments"));
        }
        Ok(Self { port, environment })
    }

    /// Create a safe default port for development
    pub const fn default_development() -> Self {
        Self {
            port: DEFAULT_PORT,
            environment: Environment::Development,
        }
    }

    /// Create a testing port (port 0, the OS picks one)
    pub const fn testing() -> Self {
        Self {
            port: 0,
            environment: Environment::Testing,
        }
    }

    /// Get the port value
    pub fn value(&self) -> u16 {
        self.port
    }
}

impl<'de> Deserialize<'de> for ServerPort {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let port = u16::deserialize(deserializer)?;
        // re-validated in `ServerConfig::load` once the environment is known
        Ok(Self {
            port,
            environment: Environment::Development,
        })
    }
}

/// A validated rate limiter window length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowMillis(Duration);

impl WindowMillis {
    /// Create a new `WindowMillis`, ensuring the value is within valid bounds
    ///
    /// # Errors
    ///
    /// Returns an error if the window is 0 or longer than one day
    pub fn new(millis: u64) -> Result<Self> {
        ensure!(millis != 0, "rate limiter window must be greater than 0");
        ensure!(
            millis <= MAX_WINDOW_MS,
            "rate limiter window cannot exceed {MAX_WINDOW_MS} ms"
        );
        Ok(Self(Duration::from_millis(millis)))
    }

    /// Default window of one minute
    pub const fn default_value() -> Self {
        Self(Duration::from_millis(DEFAULT_WINDOW_MS))
    }

    /// Window length
    pub fn value(&self) -> Duration {
        self.0
    }
}

impl Default for WindowMillis {
    fn default() -> Self {
        Self::default_value()
    }
}

impl<'de> Deserialize<'de> for WindowMillis {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Self::new(millis).map_err(|e| de::Error::custom(e.to_string()))
    }
}

/// Environment types for configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Production environment
    Production,
    /// Development environment
    Development,
    /// Testing environment
    Testing,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Development => write!(f, "development"),
            Environment::Testing => write!(f, "testing"),
        }
    }
}

/// REST listener settings
#[derive(Debug, Clone, Deserialize)]
pub struct RestConfig {
    /// Whether the REST server starts at all
    pub enabled: bool,
    /// Address to bind
    pub host: IpAddr,
    /// Port to bind (validated for environment compatibility)
    pub port: ServerPort,
    /// Largest JSON request body accepted, in bytes
    pub body_limit_bytes: usize,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: ServerPort::default_development(),
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
        }
    }
}

/// Fixed-window rate limiter settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RateLimiterConfig {
    /// Whether the limiter is mounted
    pub enabled: bool,
    /// Window length in milliseconds
    pub window_ms: WindowMillis,
    /// Requests allowed per client within one window
    pub max: NonZeroU32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window_ms: WindowMillis::default(),
            max: NonZeroU32::new(DEFAULT_MAX_REQUESTS).unwrap_or(NonZeroU32::MIN),
        }
    }
}

/// JSON-RPC router settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct JsonRpcConfig {
    /// Whether `/rpc` is mounted
    pub enabled: bool,
}

impl Default for JsonRpcConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Credentials accepted by the authentication gate
#[derive(Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Keys accepted on `/v0`
    #[serde(default)]
    pub api_keys: Vec<String>,
    /// Keys accepted on `/admin`
    #[serde(default)]
    pub admin_api_keys: Vec<String>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_keys", &format_args!("[{} redacted]", self.api_keys.len()))
            .field(
                "admin_api_keys",
                &format_args!("[{} redacted]", self.admin_api_keys.len()),
            )
            .finish()
    }
}

/// Subsystem switches read once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// REST server is started
    pub rest_enabled: bool,
    /// Rate limiter is mounted
    pub rate_limiter_enabled: bool,
    /// `/rpc` subtree is mounted
    pub json_rpc_enabled: bool,
}

/// Gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Environment type
    pub environment: Environment,
    /// REST listener
    pub rest: RestConfig,
    /// Rate limiter policy
    pub rate_limiter: RateLimiterConfig,
    /// JSON-RPC subsystem
    pub json_rpc: JsonRpcConfig,
    /// Authentication gate credentials
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            rest: RestConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            json_rpc: JsonRpcConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create configuration from environment variables and optional configuration files
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if configuration is invalid or cannot be loaded.
    pub fn from_env() -> ServerResult<Self> {
        Self::load().map_err(|e| ServerError::Config {
            message: format!("failed to load configuration: {e}"),
        })
    }

    /// Load configuration using the config crate with hierarchical sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. Configuration file (config.json)
    /// 3. Environment-specific files (config.{env}.json)
    /// 4. Environment variables with the `SERVER_` prefix and `__` as nesting separator,
    ///    e.g. `SERVER_RATE_LIMITER__MAX=50` or `SERVER_AUTH__API_KEYS=a,b`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let env_var = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut config_builder = Self::defaults()?
            .add_source(File::with_name("config.json").required(false))
            .add_source(
                File::with_name(&format!("config.{}.json", env_var.to_lowercase())).required(false),
            )
            .add_source(
                ConfigEnv::with_prefix("SERVER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("auth.api_keys")
                    .with_list_parse_key("auth.admin_api_keys"),
            );

        if std::env::var("ENVIRONMENT").is_ok() {
            config_builder = config_builder.set_override("environment", env_var.to_lowercase())?;
        }

        Self::from_config(config_builder.build()?)
    }

    /// Builder preloaded with every default value
    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("environment", "development")?
            .set_default("rest.enabled", true)?
            .set_default("rest.host", "127.0.0.1")?
            .set_default("rest.port", i64::from(DEFAULT_PORT))?
            .set_default("rest.body_limit_bytes", 102_400_i64)?
            .set_default("rate_limiter.enabled", false)?
            .set_default("rate_limiter.window_ms", 60_000_i64)?
            .set_default("rate_limiter.max", i64::from(DEFAULT_MAX_REQUESTS))?
            .set_default("json_rpc.enabled", true)?
            .set_default("auth.api_keys", Vec::<String>::new())?
            .set_default("auth.admin_api_keys", Vec::<String>::new())
    }

    fn from_config(config: Config) -> Result<Self, ConfigError> {
        let mut server_config: Self = config.try_deserialize()?;

        server_config.rest.port =
            ServerPort::new(server_config.rest.port.value(), server_config.environment)
                .map_err(|e| ConfigError::Message(format!("invalid port configuration: {e}")))?;

        Ok(server_config)
    }

    /// Create configuration optimized for testing
    ///
    /// Binds an OS-assigned port, keeps the rate limiter off and accepts
    /// `test-api-key` and `test-admin-key`.
    pub fn for_testing() -> Self {
        Self {
            environment: Environment::Testing,
            rest: RestConfig {
                port: ServerPort::testing(),
                ..RestConfig::default()
            },
            rate_limiter: RateLimiterConfig::default(),
            json_rpc: JsonRpcConfig::default(),
            auth: AuthConfig {
                api_keys: vec!["test-api-key".to_string()],
                admin_api_keys: vec!["test-admin-key".to_string()],
            },
        }
    }

    /// Get socket address for binding
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.rest.host, self.rest.port.value())
    }

    /// Subsystem switches derived from this configuration
    pub fn feature_flags(&self) -> FeatureFlags {
        FeatureFlags {
            rest_enabled: self.rest.enabled,
            rate_limiter_enabled: self.rate_limiter.enabled,
            json_rpc_enabled: self.json_rpc.enabled,
        }
    }
}
