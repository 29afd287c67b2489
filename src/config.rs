use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Size of the one-shot read buffer used by [`FramingMode::SingleRead`].
pub const LEGACY_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub framing: FramingConfig,
    #[serde(default)]
    pub poll: PollConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Bound on the write and on waiting for the first response byte
    #[serde(default = "default_timeout_ms")]
    pub io_timeout_ms: u64,
    /// Bound on the whole read phase, however the response trickles in
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    12345
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_response_timeout_ms() -> u64 {
    10_000
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_timeout_ms(),
            io_timeout_ms: default_timeout_ms(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

impl EndpointConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingMode {
    /// One read into a 4096-byte buffer; longer responses are truncated
    SingleRead,
    /// Read until the peer closes or goes idle
    #[default]
    UntilClose,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramingConfig {
    #[serde(default)]
    pub mode: FramingMode,
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
    /// Once data has arrived, a gap this long ends the response
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

fn default_max_response_bytes() -> usize {
    64 * 1024
}
fn default_idle_timeout_ms() -> u64 {
    250
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            mode: FramingMode::default(),
            max_response_bytes: default_max_response_bytes(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

impl FramingConfig {
    pub fn single_read() -> Self {
        Self {
            mode: FramingMode::SingleRead,
            ..Self::default()
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_clear_screen")]
    pub clear_screen: bool,
}

fn default_interval_secs() -> u64 {
    30
}
fn default_clear_screen() -> bool {
    true
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            clear_screen: default_clear_screen(),
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Config {
    /// Load YAML from disk, substitute $(VAR) placeholders, then apply
    /// TELEMETRY_HOST / TELEMETRY_PORT overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let expanded = expand_env_vars(&content);
        let mut config: Config = serde_yaml::from_str(&expanded)?;

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Like [`Config::load`], but falls back to the defaults when the file is absent.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            return Self::load(path);
        }

        let mut config = Config::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("TELEMETRY_HOST") {
            self.endpoint.host = host;
        }
        if let Ok(port) = std::env::var("TELEMETRY_PORT") {
            self.endpoint.port = port
                .parse()
                .map_err(|_| AppError::Config(format!("TELEMETRY_PORT is not a port: {port}")))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.endpoint.host.is_empty() {
            return Err(AppError::Config("Endpoint host cannot be empty".to_string()));
        }

        if self.endpoint.port == 0 {
            return Err(AppError::Config("Endpoint port cannot be 0".to_string()));
        }

        if self.endpoint.connect_timeout_ms == 0
            || self.endpoint.io_timeout_ms == 0
            || self.endpoint.response_timeout_ms == 0
        {
            return Err(AppError::Config(
                "Endpoint timeouts must be greater than 0".to_string(),
            ));
        }

        if self.framing.max_response_bytes < LEGACY_BUFFER_SIZE {
            return Err(AppError::Config(format!(
                "max_response_bytes must be at least {LEGACY_BUFFER_SIZE}"
            )));
        }

        if self.framing.idle_timeout_ms == 0 {
            return Err(AppError::Config(
                "idle_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.poll.interval_secs == 0 {
            return Err(AppError::Config(
                "Poll interval cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Expand environment variables in the format $(VAR_NAME)
fn expand_env_vars(content: &str) -> String {
    let re = match regex::Regex::new(r"\$\(([A-Z_][A-Z0-9_]*)\)") {
        Ok(re) => re,
        Err(_) => return content.to_string(),
    };

    re.replace_all(content, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
