//! Environment configuration.

pub mod error;

#[cfg(test)]
mod tests;

pub use error::ConfigError;

use std::env;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// How `<details>`-wrapped reasoning is rewritten before reaching clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThinkTagsMode {
    /// Rewrite `<details>`/`</details>` into `<think>`/`</think>`.
    #[default]
    Think,
    /// Drop the wrapping tags entirely.
    Strip,
    /// Only the cheap cleanups; tags pass through untouched.
    Raw,
}

impl FromStr for ThinkTagsMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "think" => Ok(Self::Think),
            "strip" => Ok(Self::Strip),
            "raw" => Ok(Self::Raw),
            _ => Err(ConfigError::InvalidThinkTagsMode {
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,

    pub bind_addr: IpAddr,

    /// Upstream chat-completions endpoint.
    pub upstream_url: String,

    /// Bearer key the gateway's own clients must present.
    pub api_key: String,

    /// Fixed upstream token; required when anonymous tokens are disabled.
    pub upstream_token: Option<String>,

    pub anon_token_enabled: bool,

    pub debug_mode: bool,

    pub think_tags_mode: ThinkTagsMode,

    pub max_concurrent_requests: usize,

    /// Optional fingerprint database; a built-in set is used when unset.
    pub fingerprints_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_addr: IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
            upstream_url: crate::constants::DEFAULT_UPSTREAM_URL.to_string(),
            api_key: String::new(),
            upstream_token: None,
            anon_token_enabled: true,
            debug_mode: false,
            think_tags_mode: ThinkTagsMode::Think,
            max_concurrent_requests: 100,
            fingerprints_path: None,
        }
    }
}

impl Config {
    const ENV_PORT: &'static str = "PORT";
    const ENV_BIND_ADDR: &'static str = "BIND_ADDR";
    const ENV_UPSTREAM_URL: &'static str = "UPSTREAM_URL";
    const ENV_API_KEY: &'static str = "API_KEY";
    const ENV_UPSTREAM_TOKEN: &'static str = "UPSTREAM_TOKEN";
    const ENV_ANON_TOKEN_ENABLED: &'static str = "ANON_TOKEN_ENABLED";
    const ENV_DEBUG_MODE: &'static str = "DEBUG_MODE";
    const ENV_THINK_TAGS_MODE: &'static str = "THINK_TAGS_MODE";
    const ENV_MAX_CONCURRENT: &'static str = "MAX_CONCURRENT_REQUESTS";
    const ENV_FINGERPRINTS_PATH: &'static str = "FINGERPRINTS_PATH";

    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = Self::parse_port_from_env(defaults.port)?;
        let bind_addr = Self::parse_bind_addr_from_env(defaults.bind_addr)?;
        let upstream_url =
            Self::parse_string_from_env(Self::ENV_UPSTREAM_URL, defaults.upstream_url);
        let api_key = Self::parse_string_from_env(Self::ENV_API_KEY, defaults.api_key);
        let upstream_token = Self::parse_optional_string_from_env(Self::ENV_UPSTREAM_TOKEN);
        let anon_token_enabled =
            Self::parse_bool_from_env(Self::ENV_ANON_TOKEN_ENABLED, defaults.anon_token_enabled);
        let debug_mode = Self::parse_bool_from_env(Self::ENV_DEBUG_MODE, defaults.debug_mode);
        let think_tags_mode = match env::var(Self::ENV_THINK_TAGS_MODE) {
            Ok(value) => value.parse()?,
            Err(_) => defaults.think_tags_mode,
        };
        let max_concurrent_requests = Self::parse_concurrency_from_env()?;
        let fingerprints_path =
            Self::parse_optional_string_from_env(Self::ENV_FINGERPRINTS_PATH).map(PathBuf::from);

        Ok(Self {
            port,
            bind_addr,
            upstream_url,
            api_key,
            upstream_token,
            anon_token_enabled,
            debug_mode,
            think_tags_mode,
            max_concurrent_requests,
            fingerprints_path,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }

        if !self.anon_token_enabled
            && self
                .upstream_token
                .as_deref()
                .is_none_or(|t| t.trim().is_empty())
        {
            return Err(ConfigError::MissingUpstreamToken);
        }

        if self.max_concurrent_requests == 0 || self.max_concurrent_requests > 1000 {
            return Err(ConfigError::InvalidConcurrencyLimit {
                value: self.max_concurrent_requests.to_string(),
            });
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    fn parse_port_from_env(default: u16) -> Result<u16, ConfigError> {
        match env::var(Self::ENV_PORT) {
            Ok(value) => {
                let port: u16 = value.parse().map_err(|e| ConfigError::PortParseError {
                    value: value.clone(),
                    source: e,
                })?;

                if port == 0 {
                    return Err(ConfigError::InvalidPort { value });
                }

                Ok(port)
            }
            Err(_) => Ok(default),
        }
    }

    fn parse_bind_addr_from_env(default: IpAddr) -> Result<IpAddr, ConfigError> {
        match env::var(Self::ENV_BIND_ADDR) {
            Ok(value) => value
                .parse()
                .map_err(|e| ConfigError::InvalidBindAddr { value, source: e }),
            Err(_) => Ok(default),
        }
    }

    fn parse_concurrency_from_env() -> Result<usize, ConfigError> {
        match env::var(Self::ENV_MAX_CONCURRENT) {
            Ok(value) => {
                let n: usize = value
                    .parse()
                    .map_err(|_| ConfigError::InvalidConcurrencyLimit {
                        value: value.clone(),
                    })?;
                if n == 0 || n > 1000 {
                    return Err(ConfigError::InvalidConcurrencyLimit { value });
                }
                Ok(n)
            }
            Err(_) => Ok(Self::default().max_concurrent_requests),
        }
    }

    fn parse_string_from_env(var_name: &str, default: String) -> String {
        env::var(var_name).unwrap_or(default)
    }

    fn parse_optional_string_from_env(var_name: &str) -> Option<String> {
        env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_bool_from_env(var_name: &str, default: bool) -> bool {
        env::var(var_name)
            .ok()
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(default)
    }
}
