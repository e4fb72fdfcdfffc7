use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

/// Gateway settings, read from the same YAML file as pingora's own conf.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayConfig {
    /// Address the gateway listens on.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// `host:port` of the CRUD backend that authenticated traffic goes to.
    pub upstream: String,
    /// SQLite accounts database. Relative paths resolve against the
    /// config file's directory.
    pub accounts_db: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl GatewayConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: GatewayConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_address("listen", &self.listen)?;
        check_address("upstream", &self.upstream)?;
        if self.accounts_db.trim().is_empty() {
            return Err(ConfigError::Invalid("accounts_db must not be empty".into()));
        }
        Ok(())
    }

    /// Location of the accounts database for a config living in `base`.
    pub fn accounts_db_path(&self, base: &Path) -> PathBuf {
        let path = Path::new(&self.accounts_db);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        }
    }
}

fn check_address(field: &str, addr: &str) -> Result<(), ConfigError> {
    let valid = addr
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
    if valid {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{field} must be host:port, got '{addr}'"
        )))
    }
}
