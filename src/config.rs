#![forbid(unsafe_code)]

use anyhow::{Context, Result, anyhow};
use std::{
    collections::HashMap,
    env, fs,
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
};

pub const APP_DIR_NAME: &str = "playlists-copy";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const ENV_PREFIX: &str = "PLAYLISTS_COPY_";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    /// Holds `config.toml` and the cached CLI token.
    pub config_dir: PathBuf,
    /// Google client-secret JSON file.
    pub credential: PathBuf,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

impl RuntimeSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let host = self.host.parse::<IpAddr>().with_context(|| {
            format!("expected a valid IPv4 or IPv6 address for host, got {}", self.host)
        })?;
        Ok(SocketAddr::new(host, self.port))
    }
}

/// Values given on the command line; each one beats the environment and the
/// config file.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub config_dir: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub credential: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

pub fn resolve_settings(overrides: RuntimeOverrides) -> Result<RuntimeSettings> {
    let config_dir = resolve_config_dir(overrides.config_dir.clone(), env_var_string)?;
    let config_file = overrides
        .config_file
        .clone()
        .unwrap_or_else(|| config_dir.join(CONFIG_FILE_NAME));
    let file_vars = read_config_file(&config_file)?;
    build_settings_with_overrides(config_dir, &file_vars, env_var_string, overrides)
}

fn resolve_config_dir(
    explicit: Option<PathBuf>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<PathBuf> {
    explicit
        .or_else(|| env_lookup(&env_key("config_dir")).map(PathBuf::from))
        .or_else(|| dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME)))
        .ok_or_else(|| anyhow!("cannot determine the config directory; pass --config-dir"))
}

#[cfg(test)]
fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<RuntimeSettings> {
    build_settings_with_overrides(
        PathBuf::from("/config"),
        file_vars,
        env_lookup,
        RuntimeOverrides::default(),
    )
}

fn build_settings_with_overrides(
    config_dir: PathBuf,
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> Result<RuntimeSettings> {
    let credential = overrides
        .credential
        .or_else(|| lookup_value("credential", file_vars, &env_lookup).map(PathBuf::from))
        .ok_or_else(|| {
            anyhow!(
                "credential file not set: pass --credential, set {} or add `credential` to {}",
                env_key("credential"),
                config_dir.join(CONFIG_FILE_NAME).display()
            )
        })?;
    let port = overrides
        .port
        .or_else(|| {
            lookup_value("port", file_vars, &env_lookup)
                .and_then(|value| value.parse::<u16>().ok())
        })
        .unwrap_or(DEFAULT_PORT);
    let host = non_blank(overrides.host)
        .or_else(|| lookup_value("host", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let log_level = non_blank(overrides.log_level)
        .or_else(|| lookup_value("log_level", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
    Ok(RuntimeSettings {
        config_dir,
        credential,
        host,
        port,
        log_level,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_key(key: &str) -> String {
    format!("{ENV_PREFIX}{}", key.to_ascii_uppercase())
}

fn env_var_string(key: &str) -> Option<String> {
    non_blank(env::var(key).ok())
}

/// Environment first, then the config file. Blank values count as unset.
fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(&env_key(key)).or_else(|| non_blank(file_vars.get(key).cloned()))
}

/// Reads the top-level scalar keys of a TOML config file. A missing file is
/// an empty config; nested tables and arrays are ignored.
pub fn read_config_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let table: toml::Table =
        toml::from_str(&content).with_context(|| format!("Parsing {}", path.display()))?;
    for (key, value) in table {
        let value = match value {
            toml::Value::String(value) => value,
            toml::Value::Integer(value) => value.to_string(),
            toml::Value::Float(value) => value.to_string(),
            toml::Value::Boolean(value) => value.to_string(),
            _ => continue,
        };
        vars.insert(key, value);
    }
    Ok(vars)
}
