//! Taxonomía de errores del core.
//!
//! - `GraphError`: construcción del pipeline/grafo. Fatal, se detecta antes de
//!   ejecutar cualquier step y nunca se reintenta.
//! - `StepExecutionError`: fallo reportado por la lógica de un step. Queda
//!   registrado como `Failed` contra ese step; sólo llega al caller a través
//!   del `RunOutcome`.
//! - `StoreError`: fallo del `ArtifactStore`. Se trata igual que un
//!   `StepExecutionError` del step que lo disparó.
//! - `RunStateError`: fallo del run state. `Corruption` es fatal al cargar.
//! - `PipelineError`: lo que devuelve `Pipeline::run` cuando la ejecución no
//!   puede ni empezar ni continuar.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::step::StepStatus;

#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum GraphError {
    #[error("duplicate step name '{name}'")]
    DuplicateStep { name: String },
    #[error("artifact '{artifact}' is produced by both '{first}' and '{second}'")]
    DuplicateOutput { artifact: String, first: String, second: String },
    #[error("artifact '{artifact}' is declared external but step '{step}' produces it")]
    ExternalConflict { artifact: String, step: String },
    #[error("step '{step}' requires '{artifact}' which no step produces and is not external")]
    UnresolvedInput { step: String, artifact: String },
    #[error("dependency cycle between steps: {}", steps.join(" -> "))]
    Cycle { steps: Vec<String> },
    #[error("invalid step '{step}': {reason}")]
    InvalidStep { step: String, reason: String },
}

/// Fallo de la lógica de usuario con una causa legible.
#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[error("{cause}")]
pub struct StepExecutionError {
    pub cause: String,
}

impl StepExecutionError {
    pub fn new(cause: impl Into<String>) -> Self {
        Self { cause: cause.into() }
    }
}

impl From<String> for StepExecutionError {
    fn from(cause: String) -> Self {
        Self { cause }
    }
}

impl From<&str> for StepExecutionError {
    fn from(cause: &str) -> Self {
        Self::new(cause)
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum StoreError {
    #[error("artifact '{0}' not found")]
    NotFound(String),
    #[error("store io error: {0}")]
    Io(String),
    #[error("artifact serialization error: {0}")]
    Serialization(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum RunStateError {
    #[error("run record for '{pipeline_id}' is corrupted: {reason}")]
    Corruption { pipeline_id: String, reason: String },
    #[error("invalid transition for step '{step}': {from:?} -> {to:?}")]
    InvalidTransition { step: String, from: StepStatus, to: StepStatus },
    #[error("run state io error: {0}")]
    Io(String),
    #[error("run state backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum PipelineError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    RunState(#[from] RunStateError),
    #[error("scheduler: {0}")]
    Scheduler(String),
}
