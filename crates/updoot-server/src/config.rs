use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

pub const PLACEHOLDER_SECRET: &str = "dev-secret-change-me";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("UPDOOT_PORT must be a port number, got {0:?}")]
    BadPort(String),

    #[error("{host}:{port} is not a valid listen address")]
    BadAddr { host: String, port: u16 },

    #[error("UPDOOT_JWT_SECRET must be set to a real secret in release builds")]
    PlaceholderSecret,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    /// Allowed browser origin; any origin when unset.
    pub cors_origin: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("UPDOOT_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port_raw = lookup("UPDOOT_PORT").unwrap_or_else(|| "4000".into());
        let port: u16 = port_raw.parse().map_err(|_| ConfigError::BadPort(port_raw.clone()))?;

        let addr = format!("{}:{}", host, port)
            .parse()
            .map_err(|_| ConfigError::BadAddr { host, port })?;

        let jwt_secret = lookup("UPDOOT_JWT_SECRET").unwrap_or_else(|| PLACEHOLDER_SECRET.into());
        if jwt_secret == PLACEHOLDER_SECRET {
            if cfg!(debug_assertions) {
                warn!("UPDOOT_JWT_SECRET is not set, using the development placeholder");
            } else {
                return Err(ConfigError::PlaceholderSecret);
            }
        }

        Ok(Self {
            addr,
            db_path: PathBuf::from(lookup("UPDOOT_DB_PATH").unwrap_or_else(|| "updoot.db".into())),
            jwt_secret,
            cors_origin: lookup("UPDOOT_CORS_ORIGIN").filter(|o| !o.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let cfg = config(&[("UPDOOT_JWT_SECRET", "abc")]).unwrap();
        assert_eq!(cfg.addr.to_string(), "0.0.0.0:4000");
        assert_eq!(cfg.db_path, PathBuf::from("updoot.db"));
        assert!(cfg.cors_origin.is_none());
    }

    #[test]
    fn overrides_are_read() {
        let cfg = config(&[
            ("UPDOOT_HOST", "127.0.0.1"),
            ("UPDOOT_PORT", "8080"),
            ("UPDOOT_DB_PATH", "/tmp/x.db"),
            ("UPDOOT_JWT_SECRET", "abc"),
            ("UPDOOT_CORS_ORIGIN", "http://localhost:3000"),
        ])
        .unwrap();
        assert_eq!(cfg.addr.to_string(), "127.0.0.1:8080");
        assert_eq!(cfg.cors_origin.as_deref(), Some("http://localhost:3000"));
    }

    #[test]
    fn bad_port_is_rejected() {
        assert!(matches!(
            config(&[("UPDOOT_PORT", "http")]),
            Err(ConfigError::BadPort(_))
        ));
    }

    #[test]
    fn placeholder_secret_only_passes_in_debug() {
        let result = config(&[]);
        if cfg!(debug_assertions) {
            assert_eq!(result.unwrap().jwt_secret, PLACEHOLDER_SECRET);
        } else {
            assert!(matches!(result, Err(ConfigError::PlaceholderSecret)));
        }
    }
}
