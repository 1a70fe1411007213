// src/config.rs

//! Manages relay configuration: loading, environment overrides, and validation.

use crate::core::upstream::websocket::ROOM_PLACEHOLDER;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// The file looked up when no `--config` flag is given.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Admission control settings. Thresholds are inclusive maxima.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// When false every start is admitted, but slots are still accounted.
    #[serde(default)]
    pub enabled: bool,
    /// Maximum sessions per origin in Connecting, Active or Disconnecting.
    #[serde(default = "default_max_concurrent_sessions")]
    pub max_concurrent_sessions: usize,
    /// Maximum admitted attempts per origin inside `window`.
    #[serde(default = "default_max_attempts_per_window")]
    pub max_attempts_per_window: usize,
    /// Length of the trailing attempt window.
    #[serde(with = "humantime_serde", default = "default_window")]
    pub window: Duration,
    /// Maximum sessions across all origins. `0` disables the global cap.
    #[serde(default)]
    pub max_global_sessions: usize,
    /// Use `X-Forwarded-For` when the peer is a loopback address.
    #[serde(default = "default_true")]
    pub trust_loopback_proxy: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_concurrent_sessions: default_max_concurrent_sessions(),
            max_attempts_per_window: default_max_attempts_per_window(),
            window: default_window(),
            max_global_sessions: 0,
            trust_loopback_proxy: true,
        }
    }
}

fn default_max_concurrent_sessions() -> usize {
    10
}
fn default_max_attempts_per_window() -> usize {
    5
}
fn default_window() -> Duration {
    Duration::from_secs(60)
}
fn default_true() -> bool {
    true
}

/// Per-session supervisor settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Upper bound for the upstream connect handshake.
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Events buffered per subscriber before new ones are dropped.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Option keys stripped in addition to the transport overrides that are always removed.
    #[serde(default)]
    pub stripped_option_keys: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            outbound_buffer: default_outbound_buffer(),
            stripped_option_keys: Vec::new(),
        }
    }
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_outbound_buffer() -> usize {
    256
}

/// Settings for the upstream bridge connector.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UpstreamConfig {
    /// WebSocket URL template; `{room}` is replaced by the percent-encoded room id.
    #[serde(default = "default_upstream_url")]
    pub url: String,
    /// Events buffered between the bridge reader and the session relay loop.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_upstream_url() -> String {
    "ws://127.0.0.1:8090/rooms/{room}".to_string()
}
fn default_event_buffer() -> usize {
    512
}

/// Gift reaction table adjustments.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GiftsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Extra display names bound to the builtin reaction.
    #[serde(default)]
    pub extra: Vec<String>,
    /// Display names removed from the table.
    #[serde(default)]
    pub disabled: Vec<String>,
}

impl Default for GiftsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            extra: Vec::new(),
            disabled: Vec::new(),
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    8878
}

/// The final, validated relay configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Maximum concurrently connected subscribers.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// How often the global session count is broadcast to subscribers.
    #[serde(with = "humantime_serde", default = "default_statistics_interval")]
    pub statistics_interval: Duration,
    /// Upstream session id injected into every start request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub gifts: GiftsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8081
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_clients() -> usize {
    10000
}
fn default_statistics_interval() -> Duration {
    Duration::from_secs(5)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            max_clients: default_max_clients(),
            statistics_interval: default_statistics_interval(),
            session_id: None,
            rate_limit: RateLimitConfig::default(),
            session: SessionConfig::default(),
            upstream: UpstreamConfig::default(),
            gifts: GiftsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the explicit path if given, otherwise `config.toml` when present,
    /// otherwise the defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH),
            None => {
                info!("No configuration file found, using defaults.");
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Applies `PORT`, `SESSIONID` and `ENABLE_RATE_LIMIT` from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_env_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies environment overrides from an arbitrary lookup, then re-validates.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").filter(|v| !v.trim().is_empty()) {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value '{port}'"))?;
        }

        if let Some(id) = lookup("SESSIONID").filter(|v| !v.is_empty()) {
            info!("Using SessionId from environment.");
            self.session_id = Some(id);
        }

        if let Some(flag) = lookup("ENABLE_RATE_LIMIT").filter(|v| !v.trim().is_empty()) {
            let flag = flag.trim();
            self.rate_limit.enabled = !(flag == "0" || flag.eq_ignore_ascii_case("false"));
        }

        self.validate()
    }

    /// Validates the configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients cannot be 0"));
        }
        if self.statistics_interval.is_zero() {
            return Err(anyhow!("statistics_interval cannot be 0"));
        }

        if self.rate_limit.enabled {
            if self.rate_limit.window.is_zero() {
                return Err(anyhow!("rate_limit.window cannot be 0"));
            }
            if self.rate_limit.max_concurrent_sessions == 0 {
                warn!("rate_limit.max_concurrent_sessions is 0: every session start will be denied.");
            }
            if self.rate_limit.max_attempts_per_window == 0 {
                warn!("rate_limit.max_attempts_per_window is 0: every session start will be denied.");
            }
        }

        if self.session.connect_timeout.is_zero() {
            return Err(anyhow!("session.connect_timeout cannot be 0"));
        }
        if self.session.outbound_buffer == 0 {
            return Err(anyhow!("session.outbound_buffer cannot be 0"));
        }

        if !self.upstream.url.contains(ROOM_PLACEHOLDER) {
            return Err(anyhow!(
                "upstream.url must contain the '{}' placeholder",
                ROOM_PLACEHOLDER
            ));
        }
        if self.upstream.event_buffer == 0 {
            return Err(anyhow!("upstream.event_buffer cannot be 0"));
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.port {
                return Err(anyhow!(
                    "metrics.port cannot be the same as the main server port"
                ));
            }
        }
        Ok(())
    }
}
