//! Configuration loading
//!
//! Settings are resolved per field in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! The Plex token has no default; a missing token is a fatal startup error.

use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

/// Compiled defaults
pub mod defaults {
    pub const PLEX_URL: &str = "http://localhost:32400";
    pub const BROKER_URL: &str = "sqlite://plexkw.db?mode=rwc";
    pub const HOST: &str = "0.0.0.0";
    pub const PORT: u16 = 5000;
    pub const IMDB_BASE_URL: &str = "https://www.imdb.com";
    pub const WORKERS: usize = 2;
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const RETRY_DELAY_SECS: u64 = 300;
    pub const LOG_LEVEL: &str = "info";
}

/// Environment variable names
pub mod env_vars {
    pub const PLEX_URL: &str = "PLEX_URL";
    pub const PLEX_TOKEN: &str = "PLEX_TOKEN";
    pub const BROKER_URL: &str = "BROKER_URL";
    pub const HOST: &str = "PLEXKW_HOST";
    pub const PORT: &str = "PORT";
    pub const IMDB_BASE_URL: &str = "IMDB_BASE_URL";
    pub const WORKERS: &str = "PLEXKW_WORKERS";
    pub const MAX_ATTEMPTS: &str = "PLEXKW_MAX_ATTEMPTS";
    pub const RETRY_DELAY_SECS: &str = "PLEXKW_RETRY_DELAY_SECS";
    pub const LOG_LEVEL: &str = "PLEXKW_LOG_LEVEL";
    pub const LOG_FORMAT: &str = "PLEXKW_LOG_FORMAT";

    pub const ALL: &[&str] = &[
        PLEX_URL,
        PLEX_TOKEN,
        BROKER_URL,
        HOST,
        PORT,
        IMDB_BASE_URL,
        WORKERS,
        MAX_ATTEMPTS,
        RETRY_DELAY_SECS,
        LOG_LEVEL,
        LOG_FORMAT,
    ];
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single-line output
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::Config(format!(
                "Unknown log format '{}' (expected 'pretty' or 'json')",
                other
            ))),
        }
    }
}

/// One configuration layer; every field is optional
///
/// Used for the CLI layer, the environment layer and the TOML file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialSettings {
    pub plex_url: Option<String>,
    pub plex_token: Option<String>,
    pub broker_url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub imdb_base_url: Option<String>,
    pub workers: Option<usize>,
    pub max_attempts: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

impl PartialSettings {
    /// Read the environment layer
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            plex_url: env_string(env_vars::PLEX_URL),
            plex_token: env_string(env_vars::PLEX_TOKEN),
            broker_url: env_string(env_vars::BROKER_URL),
            host: env_string(env_vars::HOST),
            port: env_parsed(env_vars::PORT)?,
            imdb_base_url: env_string(env_vars::IMDB_BASE_URL),
            workers: env_parsed(env_vars::WORKERS)?,
            max_attempts: env_parsed(env_vars::MAX_ATTEMPTS)?,
            retry_delay_secs: env_parsed(env_vars::RETRY_DELAY_SECS)?,
            log_level: env_string(env_vars::LOG_LEVEL),
            log_format: env_string(env_vars::LOG_FORMAT),
        })
    }

    /// Read a TOML config file layer
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Field-wise merge: values in `self` win over `lower`
    pub fn or(self, lower: PartialSettings) -> PartialSettings {
        PartialSettings {
            plex_url: self.plex_url.or(lower.plex_url),
            plex_token: self.plex_token.or(lower.plex_token),
            broker_url: self.broker_url.or(lower.broker_url),
            host: self.host.or(lower.host),
            port: self.port.or(lower.port),
            imdb_base_url: self.imdb_base_url.or(lower.imdb_base_url),
            workers: self.workers.or(lower.workers),
            max_attempts: self.max_attempts.or(lower.max_attempts),
            retry_delay_secs: self.retry_delay_secs.or(lower.retry_delay_secs),
            log_level: self.log_level.or(lower.log_level),
            log_format: self.log_format.or(lower.log_format),
        }
    }
}

/// Fully resolved service settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Plex base URL without trailing slash
    pub plex_url: String,
    /// Plex access token sent as `X-Plex-Token`
    pub plex_token: String,
    /// Task queue database connection string
    pub broker_url: String,
    pub host: String,
    pub port: u16,
    /// IMDb base URL without trailing slash
    pub imdb_base_url: String,
    /// Number of enrichment workers
    pub workers: usize,
    /// Total attempts per enrichment job (including the first)
    pub max_attempts: u32,
    /// Delay between attempts
    pub retry_delay: Duration,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Settings {
    /// Resolve settings from the CLI layer, the environment and an optional TOML file.
    pub fn load(cli: PartialSettings, toml_path: Option<&Path>) -> Result<Self> {
        let env = PartialSettings::from_env()?;
        let toml = match toml_path {
            Some(path) => PartialSettings::from_toml_file(path)?,
            None => PartialSettings::default(),
        };
        Self::resolve(cli.or(env).or(toml))
    }

    /// Apply compiled defaults to merged layers and validate the result.
    pub fn resolve(layers: PartialSettings) -> Result<Self> {
        let plex_token = layers
            .plex_token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                Error::Config(format!(
                    "Plex token not configured. Set {} or pass --plex-token",
                    env_vars::PLEX_TOKEN
                ))
            })?;

        let max_attempts = layers.max_attempts.unwrap_or(defaults::MAX_ATTEMPTS);
        if max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".to_string()));
        }

        let workers = layers.workers.unwrap_or(defaults::WORKERS);
        if workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }

        let log_format = match layers.log_format {
            Some(format) => format.parse()?,
            None => LogFormat::default(),
        };

        Ok(Settings {
            plex_url: trim_base_url(layers.plex_url.as_deref().unwrap_or(defaults::PLEX_URL)),
            plex_token,
            broker_url: layers
                .broker_url
                .unwrap_or_else(|| defaults::BROKER_URL.to_string()),
            host: layers.host.unwrap_or_else(|| defaults::HOST.to_string()),
            port: layers.port.unwrap_or(defaults::PORT),
            imdb_base_url: trim_base_url(
                layers
                    .imdb_base_url
                    .as_deref()
                    .unwrap_or(defaults::IMDB_BASE_URL),
            ),
            workers,
            max_attempts,
            retry_delay: Duration::from_secs(
                layers.retry_delay_secs.unwrap_or(defaults::RETRY_DELAY_SECS),
            ),
            log_level: layers
                .log_level
                .unwrap_or_else(|| defaults::LOG_LEVEL.to_string()),
            log_format,
        })
    }
}

fn trim_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}={} is invalid: {}", name, raw, e))),
        None => Ok(None),
    }
}
