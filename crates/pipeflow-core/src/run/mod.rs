//! Run State Tracker: contrato de almacenamiento del `RunRecord`.
//!
//! Los stores deben aplicar cada `StepUpdate` de forma atómica: un lector
//! nunca observa un step a medio escribir. No hay arbitraje entre procesos:
//! dos procesos ejecutando el mismo `pipeline_id` a la vez no está soportado.

mod memory;
mod record;

pub use memory::{InMemoryRunStateStore, TransitionEvent};
pub use record::{FailureKind, RunHeader, RunRecord, StepFailure, StepRecord, StepUpdate};

use crate::errors::RunStateError;

pub trait RunStateStore {
    /// Record del pipeline; vacío si nunca se ejecutó.
    fn load(&self, pipeline_id: &str) -> Result<RunRecord, RunStateError>;

    /// Registra una nueva invocación y devuelve el record resultante.
    fn begin(&mut self, pipeline_id: &str, header: RunHeader) -> Result<RunRecord, RunStateError>;

    /// Persiste la transición de un step.
    fn update(&mut self, pipeline_id: &str, update: StepUpdate) -> Result<(), RunStateError>;

    /// Elimina el record (p. ej. tras `RunStateError::Corruption`).
    fn discard(&mut self, pipeline_id: &str) -> Result<(), RunStateError>;
}

impl<T: RunStateStore + ?Sized> RunStateStore for &mut T {
    fn load(&self, pipeline_id: &str) -> Result<RunRecord, RunStateError> {
        (**self).load(pipeline_id)
    }

    fn begin(&mut self, pipeline_id: &str, header: RunHeader) -> Result<RunRecord, RunStateError> {
        (**self).begin(pipeline_id, header)
    }

    fn update(&mut self, pipeline_id: &str, update: StepUpdate) -> Result<(), RunStateError> {
        (**self).update(pipeline_id, update)
    }

    fn discard(&mut self, pipeline_id: &str) -> Result<(), RunStateError> {
        (**self).discard(pipeline_id)
    }
}
