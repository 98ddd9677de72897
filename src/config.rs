use clap::Parser;
use serde::Deserialize;

use crate::sandbox::{DEFAULT_TIMEOUT_SECS, MAX_TIMEOUT_SECS};

#[derive(Parser)]
#[command(name = "coderunner", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file; built-in defaults are used if omitted
    #[arg(long = "config", short = 'c')]
    pub config_path: Option<String>,
}

impl CliArgs {
    /// Load the configuration from the specified file
    pub fn to_config(&self) -> std::io::Result<Config> {
        let Some(path) = &self.config_path else {
            return Ok(Config::default());
        };
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| e.into())
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub sandbox: SandboxConfig,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct SandboxConfig {
    /// Root directory for execution directories; per-user cache dir if unset
    pub root_dir: Option<String>,
    /// Timeout in seconds applied when a request specifies none
    pub default_timeout: u64,
    /// Upper bound in seconds on any requested timeout
    pub max_timeout: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            root_dir: None,
            default_timeout: DEFAULT_TIMEOUT_SECS,
            max_timeout: MAX_TIMEOUT_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let raw = r#"{
            "server": { "bind_address": "127.0.0.1", "bind_port": 8000 },
            "sandbox": { "root_dir": "/tmp/coderunner", "default_timeout": 10 }
        }"#;
        let config: Config = serde_json::from_str(raw).unwrap();

        assert_eq!(config.server.bind_address, Some("127.0.0.1".to_string()));
        assert_eq!(config.server.bind_port, Some(8000));
        assert_eq!(config.sandbox.root_dir, Some("/tmp/coderunner".to_string()));
        assert_eq!(config.sandbox.default_timeout, 10);
        // Omitted fields fall back to policy defaults
        assert_eq!(config.sandbox.max_timeout, MAX_TIMEOUT_SECS);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();

        assert_eq!(config.server.bind_address, None);
        assert_eq!(config.sandbox.default_timeout, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.sandbox.max_timeout, MAX_TIMEOUT_SECS);
    }
}
