use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// What a batch does when one of its sessions fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Let every session finish, then report all failed endpoints.
    #[default]
    WaitAll,
    /// Cancel the remaining sessions on the first failure.
    FailFast,
}

impl FromStr for FailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "wait_all" => Ok(FailurePolicy::WaitAll),
            "fail_fast" => Ok(FailurePolicy::FailFast),
            other => Err(ConfigError::Parse(format!(
                "unknown failure policy {other:?} (expected wait_all or fail_fast)"
            ))),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::WaitAll => write!(f, "wait_all"),
            FailurePolicy::FailFast => write!(f, "fail_fast"),
        }
    }
}

/// Client-side knobs. No timeout is applied unless one is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub connect_timeout: Option<Duration>,
    pub request_timeout: Option<Duration>,
    pub read_buffer_size: usize,
    pub nodelay: bool,
    pub failure_policy: FailurePolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            request_timeout: None,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            nodelay: true,
            failure_policy: FailurePolicy::WaitAll,
        }
    }
}

/// Settings of the demo server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub delay: Duration,
    pub max_workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_string(),
            delay: Duration::from_secs(3),
            max_workers: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub client: ClientConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
struct FileClientConfig {
    connect_timeout_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    read_buffer_size: Option<usize>,
    nodelay: Option<bool>,
    failure_policy: Option<FailurePolicy>,
}

#[derive(Debug, Deserialize, Clone, Default)]
struct FileServerConfig {
    bind_addr: Option<String>,
    delay_ms: Option<u64>,
    max_workers: Option<usize>,
}

#[derive(Debug, Deserialize, Clone, Default)]
struct FileConfig {
    #[serde(default)]
    client: FileClientConfig,
    #[serde(default)]
    server: FileServerConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("config parse error: {0}")]
    Parse(String),
}

fn env_parse<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::Parse(format!("{name}: {e}"))),
        Err(_) => Ok(None),
    }
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

/// A zero timeout in the file or environment means "no timeout".
fn timeout_ms(ms: Option<u64>) -> Option<Duration> {
    ms.filter(|ms| *ms > 0).map(Duration::from_millis)
}

impl Config {
    fn load_file<P: AsRef<Path>>(path: P) -> Result<FileConfig, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let cfg: FileConfig = toml::from_str(&raw)?;
        Ok(cfg)
    }

    /// Load configuration from an optional file path and environment variables.
    ///
    /// Precedence: built-in defaults, then the file (`path`, or `AIOREQ_CONFIG`
    /// when `path` is `None`), then `AIOREQ_*` environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let env_path = env::var("AIOREQ_CONFIG").ok();
        let effective_path = path.map(|s| s.to_string()).or(env_path);

        let file_cfg = if let Some(p) = effective_path {
            Self::load_file(p)?
        } else {
            FileConfig::default()
        };

        let defaults = Config::default();
        let file_client = file_cfg.client;
        let file_server = file_cfg.server;

        // File defaults.
        let mut connect_timeout = timeout_ms(file_client.connect_timeout_ms);
        let mut request_timeout = timeout_ms(file_client.request_timeout_ms);
        let mut read_buffer_size = file_client
            .read_buffer_size
            .unwrap_or(defaults.client.read_buffer_size);
        let mut nodelay = file_client.nodelay.unwrap_or(defaults.client.nodelay);
        let mut failure_policy = file_client
            .failure_policy
            .unwrap_or(defaults.client.failure_policy);

        let mut bind_addr = file_server
            .bind_addr
            .unwrap_or(defaults.server.bind_addr);
        let mut delay = file_server
            .delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.server.delay);
        let mut max_workers = file_server
            .max_workers
            .unwrap_or(defaults.server.max_workers);

        // Env overrides.
        if let Some(ms) = env_parse::<u64>("AIOREQ_CONNECT_TIMEOUT_MS")? {
            connect_timeout = timeout_ms(Some(ms));
        }

        if let Some(ms) = env_parse::<u64>("AIOREQ_REQUEST_TIMEOUT_MS")? {
            request_timeout = timeout_ms(Some(ms));
        }

        if let Some(size) = env_parse("AIOREQ_READ_BUFFER_SIZE")? {
            read_buffer_size = size;
        }

        if let Some(v) = env_flag("AIOREQ_NODELAY") {
            nodelay = v;
        }

        if let Some(policy) = env_parse("AIOREQ_FAILURE_POLICY")? {
            failure_policy = policy;
        }

        if let Ok(v) = env::var("AIOREQ_BIND_ADDR") {
            bind_addr = v;
        }

        if let Some(ms) = env_parse("AIOREQ_DELAY_MS")? {
            delay = Duration::from_millis(ms);
        }

        if let Some(n) = env_parse("AIOREQ_MAX_WORKERS")? {
            max_workers = n;
        }

        if read_buffer_size == 0 {
            return Err(ConfigError::Parse("read_buffer_size must be > 0".into()));
        }
        if max_workers == 0 {
            return Err(ConfigError::Parse("max_workers must be > 0".into()));
        }

        Ok(Config {
            client: ClientConfig {
                connect_timeout,
                request_timeout,
                read_buffer_size,
                nodelay,
                failure_policy,
            },
            server: ServerConfig {
                bind_addr,
                delay,
                max_workers,
            },
        })
    }
}

/// Loads `path` with environment overrides applied.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let path = path
        .to_str()
        .ok_or_else(|| ConfigError::Parse(format!("non UTF-8 path {}", path.display())))?;
    Config::load(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_policy_accepts_both_spellings() {
        assert_eq!("wait_all".parse::<FailurePolicy>().unwrap(), FailurePolicy::WaitAll);
        assert_eq!("Fail-Fast".parse::<FailurePolicy>().unwrap(), FailurePolicy::FailFast);
        assert!("sometimes".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn file_sections_are_optional() {
        let cfg: FileConfig = toml::from_str("[server]\ndelay_ms = 10\n").unwrap();
        assert_eq!(cfg.server.delay_ms, Some(10));
        assert!(cfg.client.failure_policy.is_none());
    }

    #[test]
    fn zero_timeout_means_none() {
        assert_eq!(timeout_ms(Some(0)), None);
        assert_eq!(timeout_ms(Some(250)), Some(Duration::from_millis(250)));
    }
}
