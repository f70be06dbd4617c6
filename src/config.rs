//! Configuración de la aplicación.
//! Carga `.env` una sola vez y expone `AppConfig` leído de variables de
//! entorno; los flags del CLI se aplican encima.

use std::env;
use std::path::PathBuf;

use pipeflow_core::FailurePolicy;
use thiserror::Error;

pub const DEFAULT_STATE_DIR: &str = ".pipeflow/state";
pub const DEFAULT_ARTIFACT_DIR: &str = ".pipeflow/artifacts";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Dónde vive el run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateBackend {
    #[default]
    File,
    /// Requiere compilar con la feature `postgres`.
    Postgres,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub state_dir: PathBuf,
    pub artifact_dir: PathBuf,
    pub state_backend: StateBackend,
    pub failure_policy: FailurePolicy,
    pub max_parallel: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { state_dir: PathBuf::from(DEFAULT_STATE_DIR),
               artifact_dir: PathBuf::from(DEFAULT_ARTIFACT_DIR),
               state_backend: StateBackend::File,
               failure_policy: FailurePolicy::FailFast,
               max_parallel: 1 }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        pipeflow_persistence::init_dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env` pero con una fuente de variables arbitraria.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
        where F: Fn(&str) -> Option<String>
    {
        let mut cfg = Self::default();
        if let Some(dir) = lookup("PIPEFLOW_STATE_DIR") {
            cfg.state_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("PIPEFLOW_ARTIFACT_DIR") {
            cfg.artifact_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("PIPEFLOW_STATE_BACKEND") {
            cfg.state_backend = match raw.trim().to_ascii_lowercase().as_str() {
                "file" => StateBackend::File,
                "postgres" | "pg" => StateBackend::Postgres,
                other => {
                    return Err(ConfigError::Invalid { var: "PIPEFLOW_STATE_BACKEND",
                                                      reason: format!("unknown backend '{other}'") })
                }
            };
        }
        if let Some(raw) = lookup("PIPEFLOW_FAILURE_POLICY") {
            cfg.failure_policy = raw.parse()
                                    .map_err(|reason| ConfigError::Invalid { var: "PIPEFLOW_FAILURE_POLICY",
                                                                             reason })?;
        }
        if let Some(raw) = lookup("PIPEFLOW_MAX_PARALLEL") {
            cfg.max_parallel = match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid { var: "PIPEFLOW_MAX_PARALLEL",
                                                      reason: format!("expected a positive integer, got '{raw}'") })
                }
            };
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        assert_eq!(AppConfig::from_lookup(lookup(&[])), Ok(AppConfig::default()));
    }

    #[test]
    fn reads_all_variables() {
        let cfg = AppConfig::from_lookup(lookup(&[("PIPEFLOW_STATE_DIR", "/tmp/s"),
                                                  ("PIPEFLOW_ARTIFACT_DIR", "/tmp/a"),
                                                  ("PIPEFLOW_FAILURE_POLICY", "best-effort"),
                                                  ("PIPEFLOW_MAX_PARALLEL", "4"),
                                                  ("PIPEFLOW_STATE_BACKEND", "pg")])).expect("config");
        assert_eq!(cfg.state_dir, PathBuf::from("/tmp/s"));
        assert_eq!(cfg.artifact_dir, PathBuf::from("/tmp/a"));
        assert_eq!(cfg.failure_policy, FailurePolicy::BestEffort);
        assert_eq!(cfg.max_parallel, 4);
        assert_eq!(cfg.state_backend, StateBackend::Postgres);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(AppConfig::from_lookup(lookup(&[("PIPEFLOW_MAX_PARALLEL", "0")])),
                         Err(ConfigError::Invalid { var: "PIPEFLOW_MAX_PARALLEL", .. })));
        assert!(AppConfig::from_lookup(lookup(&[("PIPEFLOW_FAILURE_POLICY", "yolo")])).is_err());
    }
}
