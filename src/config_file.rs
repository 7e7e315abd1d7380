/// On-disk server configuration, loaded once at startup.
use crate::config::Configuration;
use crate::error::{PubsubError, PubsubResult};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct RawServerConfig {
    bind_address: String,
    #[serde(default = "default_history_budget_bytes")]
    history_budget_bytes: usize,
    #[serde(default)]
    default_configuration: RawConfiguration,
}

#[derive(Debug, Deserialize, Default)]
struct RawConfiguration {
    #[serde(default = "default_authorization_required")]
    authorization_required: bool,
    #[serde(default = "default_max_update_size")]
    max_update_size: usize,
    #[serde(default = "default_keep_alive_secs")]
    keep_alive_timeout_secs: u64,
    #[serde(default = "default_io_timeout_secs")]
    io_timeout_secs: u64,
    #[serde(default = "default_max_idle_secs")]
    max_idle_time_secs: u64,
}

fn default_history_budget_bytes() -> usize {
    64 * 1024
}
fn default_authorization_required() -> bool {
    true
}
fn default_max_update_size() -> usize {
    64 * 1024
}
fn default_keep_alive_secs() -> u64 {
    60
}
fn default_io_timeout_secs() -> u64 {
    10
}
fn default_max_idle_secs() -> u64 {
    300
}

/// Parsed server configuration: where to listen, the node store's
/// history budget, and the default node configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub history_budget_bytes: usize,
    pub default_configuration: Configuration,
}

/// Load a TOML configuration file of the form:
///
/// ```toml
/// bind_address = "127.0.0.1:8080"
/// history_budget_bytes = 65536
///
/// [default_configuration]
/// authorization_required = true
/// max_update_size = 65536
/// keep_alive_timeout_secs = 60
/// io_timeout_secs = 10
/// max_idle_time_secs = 300
/// ```
pub fn load(path: impl AsRef<Path>) -> PubsubResult<ServerConfig> {
    let text = std::fs::read_to_string(path)?;
    let raw: RawServerConfig = toml::from_str(&text)
        .map_err(|e| PubsubError::ConfigFileError(e.to_string()))?;

    Ok(ServerConfig {
        bind_address: raw.bind_address,
        history_budget_bytes: raw.history_budget_bytes,
        default_configuration: Configuration {
            authorization_required: raw.default_configuration.authorization_required,
            max_update_size: raw.default_configuration.max_update_size,
            keep_alive_timeout: Duration::from_secs(raw.default_configuration.keep_alive_timeout_secs),
            io_timeout: Duration::from_secs(raw.default_configuration.io_timeout_secs),
            max_idle_time: Duration::from_secs(raw.default_configuration.max_idle_time_secs),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_config() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("pubsubd-test-config-{:?}.toml", std::thread::current().id()));
        std::fs::write(
            &path,
            r#"
            bind_address = "127.0.0.1:9000"

            [default_configuration]
            max_update_size = 1024
            "#,
        )
        .unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.default_configuration.max_update_size, 1024);
        assert!(config.default_configuration.authorization_required);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(load("/nonexistent/pubsubd.toml").is_err());
    }
}
