//! Constantes del motor.
//!
//! `ENGINE_VERSION` forma parte del input de cada fingerprint de step: un
//! cambio de versión incompatible invalida todas las caches aunque ni la
//! definición ni los datos cambien. Mantener estable mientras no haya cambios
//! de semántica en la ejecución.

/// Versión lógica del motor incluida en los fingerprints.
pub const ENGINE_VERSION: &str = "P1.0";

/// Versión del formato serializado de `RunRecord`.
pub const RECORD_FORMAT_VERSION: u32 = 1;
