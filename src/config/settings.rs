//! Process settings from environment variables.

use crate::error::ConfigError;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    pub store_backend: StoreBackend,
    pub database_url: String,
    pub db_max_connections: u32,
    /// Replaces the built-in collections when set.
    pub config_path: Option<PathBuf>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into());
        let bind_addr = bind_addr
            .parse()
            .map_err(|_| ConfigError::Settings(format!("BIND_ADDR: invalid address '{}'", bind_addr)))?;

        let store_backend = match lookup("STORE_BACKEND").as_deref() {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Settings(format!(
                    "STORE_BACKEND: expected 'postgres' or 'memory', got '{}'",
                    other
                )))
            }
        };

        let db_max_connections = match lookup("DB_MAX_CONNECTIONS") {
            None => 5,
            Some(s) => s
                .parse()
                .map_err(|_| ConfigError::Settings(format!("DB_MAX_CONNECTIONS: not a number '{}'", s)))?,
        };

        Ok(Settings {
            bind_addr,
            store_backend,
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| "postgres://localhost/hotel".into()),
            db_max_connections,
            config_path: lookup("CONFIG_PATH").filter(|s| !s.is_empty()).map(PathBuf::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.bind_addr, "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(s.store_backend, StoreBackend::Postgres);
        assert_eq!(s.database_url, "postgres://localhost/hotel");
        assert_eq!(s.db_max_connections, 5);
        assert!(s.config_path.is_none());
    }

    #[test]
    fn overrides() {
        let s = settings(&[
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("STORE_BACKEND", "memory"),
            ("DB_MAX_CONNECTIONS", "12"),
            ("CONFIG_PATH", "/etc/hotel/collections.json"),
        ])
        .unwrap();
        assert_eq!(s.bind_addr.port(), 8080);
        assert_eq!(s.store_backend, StoreBackend::Memory);
        assert_eq!(s.db_max_connections, 12);
        assert_eq!(s.config_path, Some(PathBuf::from("/etc/hotel/collections.json")));
    }

    #[test]
    fn invalid_values_fail() {
        assert!(matches!(settings(&[("BIND_ADDR", "nowhere")]), Err(ConfigError::Settings(_))));
        assert!(matches!(settings(&[("STORE_BACKEND", "mongo")]), Err(ConfigError::Settings(_))));
        assert!(matches!(settings(&[("DB_MAX_CONNECTIONS", "many")]), Err(ConfigError::Settings(_))));
    }
}
