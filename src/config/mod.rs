//! Service configuration.
//!
//! Values are resolved in order, later sources winning: built-in defaults,
//! the TOML config file, environment variables, then command-line flags
//! (applied by `main`).

use crate::auth::password::DEFAULT_HASH_ROUNDS;
use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable holding the database connection string.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
/// Environment variable overriding the listen port.
pub const PORT_ENV: &str = "PORT";
/// Environment variable overriding the listen host.
pub const HOST_ENV: &str = "HOST";
/// Environment variable overriding the PBKDF2 round count.
pub const HASH_ROUNDS_ENV: &str = "FITTRACK_HASH_ROUNDS";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Requests running longer than this get a 408.
    pub request_timeout_secs: u64,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
    /// Origins allowed by CORS. Empty allows any origin.
    pub cors_allowed_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3001,
            request_timeout_secs: 30,
            max_body_bytes: 65_536,
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// `sqlite://<path>`, `sqlite::memory:`, or a bare file path. Required.
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// PBKDF2 rounds per password hash.
    pub hash_rounds: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            hash_rounds: DEFAULT_HASH_ROUNDS,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the platform config directory
    /// when no path is given, then apply environment overrides.
    ///
    /// An explicit path must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Apply overrides from an environment lookup. Empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(url) = get(DATABASE_URL_ENV) {
            self.storage.database_url = Some(url);
        }
        if let Some(host) = get(HOST_ENV) {
            self.gateway.host = host;
        }
        if let Some(port) = get(PORT_ENV) {
            self.gateway.port = port
                .parse()
                .with_context(|| format!("Invalid {PORT_ENV} value: {port}"))?;
        }
        if let Some(rounds) = get(HASH_ROUNDS_ENV) {
            self.auth.hash_rounds = rounds
                .parse()
                .with_context(|| format!("Invalid {HASH_ROUNDS_ENV} value: {rounds}"))?;
        }
        Ok(())
    }

    /// Reject configurations the service cannot start with.
    pub fn validate(&self) -> Result<()> {
        self.database_url()?;
        if self.gateway.port == 0 {
            bail!("gateway.port must be non-zero");
        }
        if self.gateway.request_timeout_secs == 0 {
            bail!("gateway.request_timeout_secs must be non-zero");
        }
        if self.gateway.max_body_bytes == 0 {
            bail!("gateway.max_body_bytes must be non-zero");
        }
        if self.auth.hash_rounds == 0 {
            bail!("auth.hash_rounds must be non-zero");
        }
        Ok(())
    }

    /// The configured database connection string.
    pub fn database_url(&self) -> Result<&str> {
        match self.storage.database_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Ok(url),
            _ => bail!(
                "{DATABASE_URL_ENV} is not set (set it in the environment, pass \
                 --database-url, or add [storage] database_url to the config file)"
            ),
        }
    }
}

/// `config.toml` inside the platform config directory, if one can be determined.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "fittrack", "fittrack-accounts")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_listen_on_port_3001() {
        let config = Config::default();
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.gateway.port, 3001);
        assert_eq!(config.auth.hash_rounds, DEFAULT_HASH_ROUNDS);
        assert!(config.storage.database_url.is_none());
    }

    #[test]
    fn missing_database_url_fails_validation() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains(DATABASE_URL_ENV));
    }

    #[test]
    fn blank_database_url_fails_validation() {
        let mut config = Config::default();
        config.storage.database_url = Some("   ".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [gateway]
            port = 8080

            [storage]
            database_url = "sqlite://fittrack.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.database_url().unwrap(), "sqlite://fittrack.db");
        assert_eq!(config.auth.hash_rounds, DEFAULT_HASH_ROUNDS);
        config.validate().unwrap();
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config: Config = toml::from_str(
            r#"
            [storage]
            database_url = "sqlite://from-file.db"
            "#,
        )
        .unwrap();

        config
            .apply_env_overrides(env(&[
                (DATABASE_URL_ENV, "sqlite://from-env.db"),
                (PORT_ENV, "4000"),
                (HOST_ENV, "0.0.0.0"),
                (HASH_ROUNDS_ENV, "5000"),
            ]))
            .unwrap();

        assert_eq!(config.database_url().unwrap(), "sqlite://from-env.db");
        assert_eq!(config.gateway.port, 4000);
        assert_eq!(config.gateway.host, "0.0.0.0");
        assert_eq!(config.auth.hash_rounds, 5000);
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = Config::default();
        config
            .apply_env_overrides(env(&[(PORT_ENV, ""), (DATABASE_URL_ENV, "  ")]))
            .unwrap();
        assert_eq!(config.gateway.port, 3001);
        assert!(config.storage.database_url.is_none());
    }

    #[test]
    fn invalid_port_env_is_an_error() {
        let mut config = Config::default();
        let err = config
            .apply_env_overrides(env(&[(PORT_ENV, "not-a-port")]))
            .unwrap_err();
        assert!(err.to_string().contains(PORT_ENV));
    }

    #[test]
    fn zero_port_fails_validation() {
        let mut config = Config::default();
        config.storage.database_url = Some("sqlite::memory:".into());
        config.gateway.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_reads_and_reports_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[auth]\nhash_rounds = 2000\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.auth.hash_rounds, 2000);

        let missing = tmp.path().join("missing.toml");
        let err = Config::from_file(&missing).unwrap_err();
        assert!(err.to_string().contains("missing.toml"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[gateway\nport = ").unwrap();
        assert!(Config::from_file(&path).is_err());
    }
}
