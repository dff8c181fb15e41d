use std::{env, path::PathBuf};

use thiserror::Error;

use crate::github::DEFAULT_API_BASE;

const ENV_HOME: &str = "PRWATCH_HOME";
const ENV_API_BASE: &str = "PRWATCH_API_BASE";
const ENV_RELAY_URL: &str = "PRWATCH_RELAY_URL";
const ENV_CLIENT_ID: &str = "PRWATCH_CLIENT_ID";
const ENV_REDIRECT_URI: &str = "PRWATCH_REDIRECT_URI";
const STORAGE_DIR_NAME: &str = ".prwatch";
const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8765/callback";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub storage_dir: PathBuf,
    pub api_base: String,
    pub relay_url: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let setting = |key: &'static str| -> Result<Option<String>, ConfigError> {
            match lookup(key) {
                Some(value) if value.trim().is_empty() => Err(ConfigError::Empty(key)),
                Some(value) => Ok(Some(value.trim().to_owned())),
                None => Ok(None),
            }
        };

        let storage_dir = match setting(ENV_HOME)? {
            Some(dir) => PathBuf::from(dir),
            None => lookup("HOME")
                .filter(|home| !home.is_empty())
                .map(|home| PathBuf::from(home).join(STORAGE_DIR_NAME))
                .ok_or(ConfigError::HomeDirMissing)?,
        };

        Ok(Self {
            storage_dir,
            api_base: setting(ENV_API_BASE)?.unwrap_or_else(|| DEFAULT_API_BASE.to_owned()),
            relay_url: setting(ENV_RELAY_URL)?,
            client_id: setting(ENV_CLIENT_ID)?,
            redirect_uri: setting(ENV_REDIRECT_URI)?
                .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_owned()),
        })
    }

    pub fn relay_url(&self) -> Result<&str, ConfigError> {
        self.relay_url.as_deref().ok_or(ConfigError::Missing(ENV_RELAY_URL))
    }

    pub fn client_id(&self) -> Result<&str, ConfigError> {
        self.client_id.as_deref().ok_or(ConfigError::Missing(ENV_CLIENT_ID))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("HOME is not set; set PRWATCH_HOME to choose where state is stored")]
    HomeDirMissing,
    #[error("{0} is set but empty. Provide a value or unset it.")]
    Empty(&'static str),
    #[error("{0} must be set for this command")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_store_under_home() {
        let config = config(&[("HOME", "/home/dev")]).expect("config");

        assert_eq!(config.storage_dir, PathBuf::from("/home/dev/.prwatch"));
        assert_eq!(config.api_base, "https://api.github.com");
        assert_eq!(config.redirect_uri, DEFAULT_REDIRECT_URI);
        assert_eq!(config.relay_url(), Err(ConfigError::Missing(ENV_RELAY_URL)));
    }

    #[test]
    fn overrides_are_trimmed() {
        let config = config(&[
            (ENV_HOME, "/var/lib/prwatch"),
            (ENV_API_BASE, " https://ghe.example/api/v3 "),
            (ENV_RELAY_URL, "https://relay.example/exchange"),
            (ENV_CLIENT_ID, "Iv1.abc"),
        ])
        .expect("config");

        assert_eq!(config.storage_dir, PathBuf::from("/var/lib/prwatch"));
        assert_eq!(config.api_base, "https://ghe.example/api/v3");
        assert_eq!(config.relay_url(), Ok("https://relay.example/exchange"));
        assert_eq!(config.client_id(), Ok("Iv1.abc"));
    }

    #[test]
    fn empty_values_are_rejected() {
        assert_eq!(
            config(&[("HOME", "/home/dev"), (ENV_API_BASE, "  ")]),
            Err(ConfigError::Empty(ENV_API_BASE))
        );
        assert_eq!(config(&[]), Err(ConfigError::HomeDirMissing));
    }
}
