//! Errores de persistencia.
//! Mapea errores de IO / JSON / Diesel a variantes semánticas y de ahí a los
//! errores que entiende el core.

use pipeflow_core::{RunStateError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("corrupted document {path}: {reason}")]
    Corruption { path: String, reason: String },
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    RunState(#[from] RunStateError),
    #[error("not found")]
    NotFound,
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("serialization conflict (retryable)")]
    SerializationConflict,
    #[error("transient IO / connection pool error: {0}")]
    TransientIo(String),
    #[error("unknown database error: {0}")]
    Unknown(String),
}

impl PersistenceError {
    /// Conversión hacia el error del core; la corrupción queda asociada al
    /// pipeline afectado.
    pub fn into_run_state(self, pipeline_id: &str) -> RunStateError {
        match self {
            Self::RunState(e) => e,
            Self::Corruption { path, reason } => RunStateError::Corruption { pipeline_id: pipeline_id.to_string(),
                                                                             reason: format!("{path}: {reason}") },
            Self::Io(e) => RunStateError::Io(e.to_string()),
            other => RunStateError::Backend(other.to_string()),
        }
    }

    pub fn into_store(self, artifact: &str) -> StoreError {
        match self {
            Self::NotFound => StoreError::NotFound(artifact.to_string()),
            Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound => StoreError::NotFound(artifact.to_string()),
            Self::Io(e) => StoreError::Io(format!("{artifact}: {e}")),
            Self::Json(e) => StoreError::Serialization(format!("{artifact}: {e}")),
            Self::Corruption { path, reason } => StoreError::Serialization(format!("{path}: {reason}")),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<diesel::result::Error> for PersistenceError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error as DieselError};
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => Self::UniqueViolation(info.message().to_string()),
                DatabaseErrorKind::SerializationFailure => Self::SerializationConflict,
                other => Self::Unknown(format!("db error kind {:?}: {}", other, info.message())),
            },
            DieselError::BrokenTransactionManager => Self::TransientIo("broken transaction manager".into()),
            DieselError::DeserializationError(e) => Self::Unknown(format!("deser: {e}")),
            DieselError::SerializationError(e) => Self::Unknown(format!("ser: {e}")),
            other => Self::Unknown(format!("unhandled diesel error: {other:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corruption_maps_to_core_corruption() {
        let e = PersistenceError::Corruption { path: "p.json".into(),
                                               reason: "eof".into() };
        assert!(matches!(e.into_run_state("p"),
                         RunStateError::Corruption { ref pipeline_id, .. } if pipeline_id == "p"));
    }

    #[test]
    fn missing_file_maps_to_not_found() {
        let e = PersistenceError::from(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(e.into_store("x"), StoreError::NotFound("x".into()));
    }
}
