use std::{
    env, fmt, fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MONIT_PORT: u16 = 2812;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

const REDACTED: &str = "********";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_token: String,
    pub bind_addr: String,
    pub bind_port: u16,
    pub instances: Vec<InstanceConfig>,
    pub fetch_timeout: Duration,
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => f.write_str("http"),
            Self::Https => f.write_str("https"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsOptions {
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
    #[serde(default)]
    pub cert_file: Option<PathBuf>,
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    #[serde(default = "default_verify_peer")]
    pub verify_peer: bool,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            ca_file: None,
            cert_file: None,
            key_file: None,
            verify_peer: true,
        }
    }
}

fn default_verify_peer() -> bool {
    true
}

fn default_port() -> u16 {
    DEFAULT_MONIT_PORT
}

/// Connection settings for one monit daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub scheme: Scheme,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub tls: TlsOptions,
}

impl InstanceConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            name: None,
            host: host.into(),
            port,
            scheme: Scheme::Http,
            username: None,
            password: None,
            tls: TlsOptions::default(),
        }
    }

    /// The configured name, or `host:port` when unnamed.
    pub fn identity(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}:{}", self.host, self.port),
        }
    }

    pub fn status_url(&self) -> String {
        format!(
            "{}://{}:{}/_status?format=xml",
            self.scheme, self.host, self.port
        )
    }

    pub fn redacted(&self) -> Self {
        Self {
            password: self.password.as_ref().map(|_| REDACTED.to_string()),
            ..self.clone()
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("host must not be empty".to_string());
        }
        if self.port == 0 {
            return Err("port must be between 1 and 65535".to_string());
        }
        if self.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err("name must not be empty when set".to_string());
        }
        if self.tls.cert_file.is_some() != self.tls.key_file.is_some() {
            return Err("cert_file and key_file must be set together".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("MONIT_API_TOKEN is required and must not be empty")]
    MissingApiToken,
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("invalid bind address or port")]
    InvalidSocket,
    #[error("MONIT_INSTANCES_FILE is required")]
    MissingInstancesFile,
    #[error("failed to read instances file {path}: {source}")]
    ReadInstances {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("instances file is not valid JSON: {0}")]
    ParseInstances(#[from] serde_json::Error),
    #[error("instances file must list at least one instance")]
    NoInstances,
    #[error("instance #{index} is invalid: {reason}")]
    InvalidInstance { index: usize, reason: String },
    #[error("instance name {0} is configured more than once")]
    DuplicateInstance(String),
    #[error("MONIT_FETCH_TIMEOUT_SECS must be a positive integer")]
    InvalidFetchTimeout,
    #[error("MONIT_MAX_CONCURRENCY must be a positive integer")]
    InvalidMaxConcurrency,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_token = env::var("MONIT_API_TOKEN")
            .ok()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or(ConfigError::MissingApiToken)?;

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
        let bind_port = env::var("BIND_PORT")
            .ok()
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(8080);

        let instances_path = env::var("MONIT_INSTANCES_FILE")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingInstancesFile)?;
        let instances = load_instances(&instances_path)?;

        let fetch_timeout_secs = env::var("MONIT_FETCH_TIMEOUT_SECS")
            .ok()
            .map(|value| {
                value
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .ok_or(ConfigError::InvalidFetchTimeout)
            })
            .transpose()?
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);

        let max_concurrency = env::var("MONIT_MAX_CONCURRENCY")
            .ok()
            .map(|value| {
                value
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|limit| *limit > 0)
                    .ok_or(ConfigError::InvalidMaxConcurrency)
            })
            .transpose()?
            .unwrap_or(DEFAULT_MAX_CONCURRENCY);

        let config = Self {
            api_token,
            bind_addr,
            bind_port,
            instances,
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            max_concurrency,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}

pub fn load_instances(path: &Path) -> Result<Vec<InstanceConfig>, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::ReadInstances {
        path: path.to_path_buf(),
        source,
    })?;
    parse_instances(&text)
}

pub fn parse_instances(text: &str) -> Result<Vec<InstanceConfig>, ConfigError> {
    let instances: Vec<InstanceConfig> = serde_json::from_str(text)?;
    if instances.is_empty() {
        return Err(ConfigError::NoInstances);
    }

    let mut seen = std::collections::HashSet::new();
    for (index, instance) in instances.iter().enumerate() {
        instance
            .validate()
            .map_err(|reason| ConfigError::InvalidInstance { index, reason })?;
        let identity = instance.identity();
        if !seen.insert(identity.clone()) {
            return Err(ConfigError::DuplicateInstance(identity));
        }
    }

    Ok(instances)
}
