//! Configuration loading for the PromQL language server.
//!
//! `defaults/promql.default.toml` is embedded into the binary and always forms the bottom
//! layer. A YAML file and `LANGSERVER_*` environment variables are layered on top via
//! [`Loader`], and the merged result is validated into a [`ServerConfig`].

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat, Map, ValueKind};
use promql_parser::duration::{parse_duration, DurationError};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const DEFAULT_TOML: &str = include_str!("../defaults/promql.default.toml");

/// Used when an interval is missing, zero or negative.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

pub const DEFAULT_MAX_COMPLETION_ITEMS: usize = 100;

pub const ENV_PREFIX: &str = "LANGSERVER";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),
    #[error("invalid prometheus url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported scheme {0:?} for prometheus url, expected http or https")]
    UnsupportedScheme(String),
    #[error("invalid value for log_format {0:?}, valid values are \"text\" or \"json\"")]
    InvalidLogFormat(String),
    #[error("invalid value for rpc_trace {0:?}, valid values are \"off\", \"messages\" or \"verbose\"")]
    InvalidRpcTrace(String),
    #[error("invalid duration {value:?} for {key}: {source}")]
    InvalidDuration {
        key: &'static str,
        value: String,
        #[source]
        source: DurationError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcTrace {
    Off,
    Messages,
    Verbose,
}

/// Validated server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// `None` when no Prometheus server is configured.
    pub prometheus_url: Option<Url>,
    pub rest_api_port: u16,
    pub log_format: LogFormat,
    pub rpc_trace: RpcTrace,
    pub metadata_lookback_interval: Duration,
    pub metadata_refresh_interval: Duration,
    pub max_completion_items: usize,
}

/// The merged layers as written, before validation.
#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    prometheus_url: String,
    rest_api_port: u16,
    log_format: String,
    rpc_trace: String,
    #[serde(default)]
    metadata_lookback_interval: Option<String>,
    /// Camel case spelling of the lookback key. The loader lower-cases keys, so both forms are
    /// accepted.
    #[serde(default, rename = "metadataLookbackInterval", alias = "metadatalookbackinterval")]
    metadata_lookback_interval_camel: Option<String>,
    metadata_refresh_interval: String,
    max_completion_items: usize,
}

impl RawConfig {
    fn validate(self) -> Result<ServerConfig, ConfigError> {
        let log_format = match self.log_format.trim().to_ascii_lowercase().as_str() {
            "" | "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            _ => return Err(ConfigError::InvalidLogFormat(self.log_format)),
        };
        let rpc_trace = match self.rpc_trace.trim().to_ascii_lowercase().as_str() {
            "" | "off" => RpcTrace::Off,
            "messages" => RpcTrace::Messages,
            "verbose" => RpcTrace::Verbose,
            _ => return Err(ConfigError::InvalidRpcTrace(self.rpc_trace)),
        };
        let max_completion_items = match self.max_completion_items {
            0 => DEFAULT_MAX_COMPLETION_ITEMS,
            n => n,
        };

        let lookback = self
            .metadata_lookback_interval
            .or(self.metadata_lookback_interval_camel)
            .unwrap_or_default();

        Ok(ServerConfig {
            prometheus_url: parse_prometheus_url(&self.prometheus_url)?,
            rest_api_port: self.rest_api_port,
            log_format,
            rpc_trace,
            metadata_lookback_interval: parse_interval("metadata_lookback_interval", &lookback)?,
            metadata_refresh_interval: parse_interval(
                "metadata_refresh_interval",
                &self.metadata_refresh_interval,
            )?,
            max_completion_items,
        })
    }
}

/// Validate a Prometheus endpoint. An empty string means "no endpoint".
pub fn parse_prometheus_url(text: &str) -> Result<Option<Url>, ConfigError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    let url = Url::parse(text).map_err(|source| ConfigError::InvalidUrl {
        url: text.to_string(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => Ok(Some(url)),
        scheme => Err(ConfigError::UnsupportedScheme(scheme.to_string())),
    }
}

/// Parse an interval setting. Missing, zero and negative values fall back to
/// [`DEFAULT_INTERVAL`].
pub fn parse_interval(key: &'static str, text: &str) -> Result<Duration, ConfigError> {
    let text = text.trim();
    if text.is_empty() || text.starts_with('-') {
        return Ok(DEFAULT_INTERVAL);
    }
    match parse_duration(text) {
        Ok(duration) if duration.is_zero() => Ok(DEFAULT_INTERVAL),
        Ok(duration) => Ok(duration),
        Err(source) => Err(ConfigError::InvalidDuration {
            key,
            value: text.to_string(),
            source,
        }),
    }
}

/// Helper for layering user overrides over the built-in defaults.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    /// Start a loader seeded with the embedded defaults.
    pub fn new() -> Self {
        let builder = Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        Self { builder }
    }

    /// Layer a YAML configuration file. Missing files trigger an error.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Yaml)
            .required(true);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer `LANGSERVER_*` variables from the process environment.
    pub fn with_env(mut self) -> Self {
        self.builder = self.builder.add_source(environment());
        self
    }

    /// Layer `LANGSERVER_*` variables from an explicit map instead of the process environment.
    pub fn with_env_vars(mut self, vars: Map<String, String>) -> Self {
        self.builder = self.builder.add_source(environment().source(Some(vars)));
        self
    }

    /// Apply a single key/value override (used for command line flags).
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    /// Merge every layer and validate the result.
    pub fn build(self) -> Result<ServerConfig, ConfigError> {
        let raw: RawConfig = self.builder.build()?.try_deserialize()?;
        raw.validate()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX).try_parsing(true)
}

/// Convenience helper for callers that only need the defaults.
pub fn load_defaults() -> Result<ServerConfig, ConfigError> {
    Loader::new().build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_default_config() {
        let config = load_defaults().expect("defaults to deserialize");
        assert_eq!(config.prometheus_url, None);
        assert_eq!(config.rest_api_port, 0);
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.rpc_trace, RpcTrace::Off);
        assert_eq!(config.metadata_lookback_interval, DEFAULT_INTERVAL);
        assert_eq!(config.metadata_refresh_interval, DEFAULT_INTERVAL);
        assert_eq!(config.max_completion_items, 100);
    }

    #[test]
    fn supports_overrides() {
        let config = Loader::new()
            .set_override("log_format", "json")
            .expect("override to apply")
            .set_override("rest_api_port", 8080)
            .expect("override to apply")
            .build()
            .expect("config to build");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.rest_api_port, 8080);
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let err = Loader::new()
            .set_override("log_format", "xml")
            .expect("override to apply")
            .build()
            .expect_err("xml is not a log format");
        assert!(matches!(err, ConfigError::InvalidLogFormat(ref format) if format == "xml"));
    }

    #[test]
    fn prometheus_url_must_be_http() {
        assert!(matches!(
            parse_prometheus_url("ftp://example.com"),
            Err(ConfigError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            parse_prometheus_url("not a url"),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert_eq!(parse_prometheus_url("  ").expect("empty is allowed"), None);
        assert_eq!(
            parse_prometheus_url("http://localhost:9090")
                .expect("valid url")
                .map(|url| url.port()),
            Some(Some(9090))
        );
    }

    #[test]
    fn non_positive_intervals_fall_back_to_default() {
        for value in ["", "0s", "0", "-5m"] {
            assert_eq!(parse_interval("interval", value).expect(value), DEFAULT_INTERVAL);
        }
        assert_eq!(
            parse_interval("interval", "3w").expect("valid"),
            Duration::from_secs(3 * 7 * 24 * 60 * 60)
        );
        assert!(matches!(
            parse_interval("interval", "soon"),
            Err(ConfigError::InvalidDuration { key: "interval", .. })
        ));
    }
}
