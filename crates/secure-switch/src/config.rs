use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_rules_file")]
    pub rules_file: PathBuf,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rules_file: default_rules_file(),
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen_addr: String,
    /// Virtual root the protected application is mounted at.
    #[serde(default = "default_application_root")]
    pub application_root: String,
    /// Read scheme, host, URI and client address from `X-Forwarded-*`
    /// headers. Off by default; enable only behind a proxy that overwrites
    /// or appends to them.
    #[serde(default)]
    pub trust_forwarded_headers: bool,
    /// Host globs that are never switched.
    #[serde(default)]
    pub exempt_hosts: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen(),
            application_root: default_application_root(),
            trust_forwarded_headers: false,
            exempt_hosts: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default-value functions used by serde
// ---------------------------------------------------------------------------

fn default_rules_file() -> PathBuf {
    PathBuf::from("rules.yaml")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_listen() -> String {
    "127.0.0.1:9180".to_string()
}

fn default_application_root() -> String {
    "/".to_string()
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load configuration from a YAML file.
///
/// If the file does not exist a default configuration is returned and a
/// warning is emitted.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "configuration file not found; using defaults"
        );
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

    let config: Config = serde_yml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))?;

    Ok(config)
}
