use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::{RunHeader, RunRecord, RunStateStore, StepUpdate};
use crate::errors::RunStateError;
use crate::step::StepStatus;

/// Entrada del historial append-only de transiciones (sólo in-memory; útil
/// para inspeccionar el orden observado por un lector).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionEvent {
    pub seq: u64,
    pub step: String,
    pub status: StepStatus,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct InMemoryRunStateStore {
    records: HashMap<String, RunRecord>,
    history: HashMap<String, Vec<TransitionEvent>>,
}

impl InMemoryRunStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transiciones aplicadas a `pipeline_id`, en orden de escritura.
    pub fn history(&self, pipeline_id: &str) -> Vec<TransitionEvent> {
        self.history.get(pipeline_id).cloned().unwrap_or_default()
    }

    /// Historial filtrado por step.
    pub fn history_of(&self, pipeline_id: &str, step: &str) -> Vec<StepStatus> {
        self.history
            .get(pipeline_id)
            .map(|h| h.iter().filter(|e| e.step == step).map(|e| e.status).collect())
            .unwrap_or_default()
    }

    /// Inserta un record tal cual, sin validar (para simular estados previos).
    pub fn insert_raw(&mut self, record: RunRecord) {
        self.records.insert(record.pipeline_id.clone(), record);
    }
}

impl RunStateStore for InMemoryRunStateStore {
    fn load(&self, pipeline_id: &str) -> Result<RunRecord, RunStateError> {
        match self.records.get(pipeline_id) {
            Some(rec) => {
                rec.validate(pipeline_id)?;
                Ok(rec.clone())
            }
            None => Ok(RunRecord::empty(pipeline_id)),
        }
    }

    fn begin(&mut self, pipeline_id: &str, header: RunHeader) -> Result<RunRecord, RunStateError> {
        let mut rec = self.load(pipeline_id)?;
        rec.begin(&header);
        self.records.insert(pipeline_id.to_string(), rec.clone());
        Ok(rec)
    }

    fn update(&mut self, pipeline_id: &str, update: StepUpdate) -> Result<(), RunStateError> {
        // Se aplica sobre una copia: si la transición es inválida el record
        // guardado queda intacto.
        let mut rec = self.records
                          .get(pipeline_id)
                          .cloned()
                          .unwrap_or_else(|| RunRecord::empty(pipeline_id));
        rec.apply(&update)?;
        self.records.insert(pipeline_id.to_string(), rec);
        let log = self.history.entry(pipeline_id.to_string()).or_default();
        let seq = log.len() as u64;
        log.push(TransitionEvent { seq,
                                   step: update.step,
                                   status: update.status,
                                   ts: update.at });
        Ok(())
    }

    fn discard(&mut self, pipeline_id: &str) -> Result<(), RunStateError> {
        self.records.remove(pipeline_id);
        self.history.remove(pipeline_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::StepRecord;

    #[test]
    fn invalid_transition_leaves_record_untouched() {
        let mut store = InMemoryRunStateStore::new();
        store.update("p", StepUpdate::running("a")).expect("running");
        let before = store.load("p").expect("load");
        assert!(store.update("p", StepUpdate::running("a")).is_err());
        assert_eq!(store.load("p").expect("load"), before);
        assert_eq!(store.history_of("p", "a"), vec![StepStatus::Running]);
    }

    #[test]
    fn load_reports_corruption() {
        let mut store = InMemoryRunStateStore::new();
        let mut rec = RunRecord::empty("p");
        rec.steps.insert("a".into(),
                         StepRecord { status: StepStatus::Failed,
                                      ..StepRecord::default() });
        store.insert_raw(rec);
        assert!(matches!(store.load("p"), Err(RunStateError::Corruption { .. })));
        store.discard("p").expect("discard");
        assert!(store.load("p").expect("load").is_empty());
    }
}
