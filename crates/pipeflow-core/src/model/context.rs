//! Contexto entregado a `StepLogic::run` y token de cancelación.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use uuid::Uuid;

/// Señal de cancelación a nivel de run. Clonable; todas las copias comparten
/// el mismo flag.
///
/// Cancelar impide que se programen steps no iniciados; los steps en vuelo
/// terminan con normalidad (pueden consultar `RunContext::is_cancelled`).
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Contexto de ejecución de un step.
#[derive(Debug, Clone)]
pub struct RunContext {
    pipeline_id: String,
    run_id: Uuid,
    step: String,
    cancel: CancelToken,
}

impl RunContext {
    pub fn new(pipeline_id: impl Into<String>, run_id: Uuid, step: impl Into<String>, cancel: CancelToken) -> Self {
        Self { pipeline_id: pipeline_id.into(),
               run_id,
               step: step.into(),
               cancel }
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn step(&self) -> &str {
        &self.step
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn info(&self, msg: &str) {
        info!(target: "pipeflow::step", "[{}/{}] {}", self.pipeline_id, self.step, msg);
    }

    pub fn warn(&self, msg: &str) {
        warn!(target: "pipeflow::step", "[{}/{}] {}", self.pipeline_id, self.step, msg);
    }

    pub fn debug(&self, msg: &str) {
        debug!(target: "pipeflow::step", "[{}/{}] {}", self.pipeline_id, self.step, msg);
    }
}
