//! Run record: estado durable por pipeline.
//!
//! Un `RunRecord` guarda, por step, el último estado conocido y los
//! `ArtifactRef` producidos. Sólo el scheduler lo muta, y siempre a través de
//! `StepUpdate`s aplicados de a uno: cada update es una transición completa
//! de un único step, que es la unidad de atomicidad que los stores deben
//! garantizar.
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::RECORD_FORMAT_VERSION;
use crate::errors::RunStateError;
use crate::model::ArtifactRef;
use crate::step::{SkipReason, StepStatus};

/// Origen de un fallo registrado contra un step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// La lógica del step devolvió `StepExecutionError`.
    Execution,
    /// El `ArtifactStore` falló al leer inputs o escribir outputs.
    Store,
    /// Los outputs no coinciden con los declarados.
    Contract,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl StepFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { kind,
               message: message.into() }
    }
}

/// Estado de un step en el record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub status: StepStatus,
    #[serde(default)]
    pub outputs: Vec<ArtifactRef>,
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub failure: Option<StepFailure>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for StepRecord {
    fn default() -> Self {
        Self { status: StepStatus::Pending,
               outputs: Vec::new(),
               fingerprint: None,
               failure: None,
               attempts: 0,
               started_at: None,
               finished_at: None }
    }
}

impl StepRecord {
    pub fn output(&self, name: &str) -> Option<&ArtifactRef> {
        self.outputs.iter().find(|r| r.name == name)
    }
}

/// Transición de un único step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepUpdate {
    pub step: String,
    pub status: StepStatus,
    #[serde(default)]
    pub outputs: Vec<ArtifactRef>,
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub failure: Option<StepFailure>,
    pub at: DateTime<Utc>,
}

impl StepUpdate {
    fn bare(step: &str, status: StepStatus) -> Self {
        Self { step: step.to_string(),
               status,
               outputs: Vec::new(),
               fingerprint: None,
               failure: None,
               at: Utc::now() }
    }

    pub fn running(step: &str) -> Self {
        Self::bare(step, StepStatus::Running)
    }

    pub fn succeeded(step: &str, outputs: Vec<ArtifactRef>, fingerprint: String) -> Self {
        Self { outputs,
               fingerprint: Some(fingerprint),
               ..Self::bare(step, StepStatus::Succeeded) }
    }

    pub fn failed(step: &str, failure: StepFailure) -> Self {
        Self { failure: Some(failure),
               ..Self::bare(step, StepStatus::Failed) }
    }

    pub fn skipped(step: &str, reason: SkipReason) -> Self {
        Self::bare(step, StepStatus::Skipped(reason))
    }

    pub fn pending(step: &str) -> Self {
        Self::bare(step, StepStatus::Pending)
    }
}

/// Cabecera de una nueva invocación.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHeader {
    pub run_id: Uuid,
    pub definition_hash: String,
    /// Steps actuales del pipeline en orden topológico.
    pub steps: Vec<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub format_version: u32,
    pub pipeline_id: String,
    #[serde(default)]
    pub run_id: Option<Uuid>,
    #[serde(default)]
    pub invocation: u64,
    #[serde(default)]
    pub definition_hash: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub steps: IndexMap<String, StepRecord>,
}

impl RunRecord {
    /// Record vacío (ningún run previo).
    pub fn empty(pipeline_id: &str) -> Self {
        Self { format_version: RECORD_FORMAT_VERSION,
               pipeline_id: pipeline_id.to_string(),
               run_id: None,
               invocation: 0,
               definition_hash: None,
               updated_at: None,
               steps: IndexMap::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.invocation == 0 && self.steps.is_empty()
    }

    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.get(name)
    }

    /// Estado de `name`; un step nunca visto está `Pending`.
    pub fn status_of(&self, name: &str) -> StepStatus {
        self.steps.get(name).map(|s| s.status).unwrap_or(StepStatus::Pending)
    }

    /// Inicia una invocación: nuevo `run_id`, steps re-ordenados según la
    /// definición actual, steps nuevos en `Pending` y steps ya no declarados
    /// descartados. Un `Running` heredado (proceso caído con el step en
    /// vuelo) vuelve a `Pending`.
    pub fn begin(&mut self, header: &RunHeader) {
        let mut steps = IndexMap::with_capacity(header.steps.len());
        for name in &header.steps {
            let mut rec = self.steps.swap_remove(name).unwrap_or_default();
            if rec.status == StepStatus::Running {
                rec = StepRecord { attempts: rec.attempts,
                                   started_at: rec.started_at,
                                   ..StepRecord::default() };
            }
            steps.insert(name.clone(), rec);
        }
        self.steps = steps;
        self.run_id = Some(header.run_id);
        self.invocation += 1;
        self.definition_hash = Some(header.definition_hash.clone());
        self.updated_at = Some(header.at);
    }

    /// Aplica una transición validándola contra el estado actual.
    pub fn apply(&mut self, update: &StepUpdate) -> Result<(), RunStateError> {
        let current = self.status_of(&update.step);
        if !current.can_transition_to(update.status) {
            return Err(RunStateError::InvalidTransition { step: update.step.clone(),
                                                          from: current,
                                                          to: update.status });
        }
        let slot = self.steps.entry(update.step.clone()).or_default();
        match update.status {
            StepStatus::Running => {
                slot.attempts += 1;
                slot.started_at = Some(update.at);
                slot.finished_at = None;
                slot.outputs.clear();
                slot.fingerprint = None;
                slot.failure = None;
            }
            StepStatus::Succeeded => {
                slot.outputs = update.outputs.clone();
                slot.fingerprint = update.fingerprint.clone();
                slot.failure = None;
                slot.finished_at = Some(update.at);
            }
            StepStatus::Failed => {
                slot.outputs.clear();
                slot.fingerprint = None;
                slot.failure = update.failure.clone();
                slot.finished_at = Some(update.at);
            }
            StepStatus::Skipped(SkipReason::Cached) => {}
            StepStatus::Skipped(SkipReason::DependencyFailed) | StepStatus::Pending => {
                slot.outputs.clear();
                slot.fingerprint = None;
                slot.failure = None;
                slot.finished_at = None;
            }
        }
        slot.status = update.status;
        self.updated_at = Some(update.at);
        Ok(())
    }

    /// Chequeo de consistencia usado por los stores al cargar.
    pub fn validate(&self, expected_pipeline: &str) -> Result<(), RunStateError> {
        let corrupt = |reason: String| RunStateError::Corruption { pipeline_id: expected_pipeline.to_string(),
                                                                   reason };
        if self.format_version != RECORD_FORMAT_VERSION {
            return Err(corrupt(format!("unsupported format version {}", self.format_version)));
        }
        if self.pipeline_id != expected_pipeline {
            return Err(corrupt(format!("record belongs to pipeline '{}'", self.pipeline_id)));
        }
        for (name, rec) in &self.steps {
            if rec.status.is_success() && rec.fingerprint.is_none() {
                return Err(corrupt(format!("step '{name}' is {} without fingerprint", rec.status.label())));
            }
            if rec.status == StepStatus::Failed && rec.failure.is_none() {
                return Err(corrupt(format!("step '{name}' is FAILED without cause")));
            }
            for (i, out) in rec.outputs.iter().enumerate() {
                if rec.outputs[..i].iter().any(|o| o.name == out.name) {
                    return Err(corrupt(format!("step '{name}' lists output '{}' twice", out.name)));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(steps: &[&str]) -> RunHeader {
        RunHeader { run_id: Uuid::new_v4(),
                    definition_hash: "h".into(),
                    steps: steps.iter().map(|s| s.to_string()).collect(),
                    at: Utc::now() }
    }

    #[test]
    fn begin_prunes_and_registers_pending() {
        let mut rec = RunRecord::empty("p");
        rec.begin(&header(&["a", "old"]));
        rec.apply(&StepUpdate::running("old")).expect("running");
        rec.begin(&header(&["b", "a"]));
        assert_eq!(rec.steps.keys().cloned().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(rec.invocation, 2);
        assert_eq!(rec.status_of("b"), StepStatus::Pending);
    }

    #[test]
    fn begin_resets_interrupted_step() {
        let mut rec = RunRecord::empty("p");
        rec.begin(&header(&["a"]));
        rec.apply(&StepUpdate::running("a")).expect("running");
        rec.begin(&header(&["a"]));
        assert_eq!(rec.status_of("a"), StepStatus::Pending);
        assert_eq!(rec.step("a").map(|s| s.attempts), Some(1));
        rec.apply(&StepUpdate::running("a")).expect("rerun after crash");
    }

    #[test]
    fn success_requires_running_first() {
        let mut rec = RunRecord::empty("p");
        let err = rec.apply(&StepUpdate::succeeded("a", vec![], "fp".into())).unwrap_err();
        assert!(matches!(err, RunStateError::InvalidTransition { from: StepStatus::Pending, .. }));

        rec.apply(&StepUpdate::running("a")).expect("running");
        rec.apply(&StepUpdate::succeeded("a", vec![ArtifactRef::new("x", "v1")], "fp".into()))
           .expect("succeeded");
        let a = rec.step("a").expect("slot");
        assert_eq!(a.attempts, 1);
        assert_eq!(a.output("x").map(|r| r.version.as_str()), Some("v1"));
        assert!(rec.validate("p").is_ok());
    }

    #[test]
    fn validate_detects_inconsistent_record() {
        let mut rec = RunRecord::empty("p");
        rec.steps.insert("a".into(),
                         StepRecord { status: StepStatus::Succeeded,
                                      ..StepRecord::default() });
        assert!(matches!(rec.validate("p"), Err(RunStateError::Corruption { .. })));
        assert!(matches!(RunRecord::empty("q").validate("p"), Err(RunStateError::Corruption { .. })));
    }
}
