//! pipeflow
//!
//! Envoltorio de aplicación sobre `pipeflow-core` y `pipeflow-persistence`:
//! - `config`: `AppConfig` desde variables de entorno / `.env`.
//! - `logging`: inicialización de `env_logger`.
//! - `demo`: pipeline de dataset incluido en el binario.

pub mod config;
pub mod demo;
pub mod logging;

use pipeflow_core::RunStatus;

/// Código de salida del proceso según el resultado del run: 0 éxito total,
/// 1 algún step falló, 2 run parcial (p. ej. cancelado).
pub fn exit_code(status: RunStatus) -> u8 {
    match status {
        RunStatus::AllSucceeded => 0,
        RunStatus::Failed => 1,
        RunStatus::Partial => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_run_status() {
        assert_eq!(exit_code(RunStatus::AllSucceeded), 0);
        assert_eq!(exit_code(RunStatus::Failed), 1);
        assert_eq!(exit_code(RunStatus::Partial), 2);
    }
}
