//! Run state durable en archivos JSON.
//!
//! Un documento por pipeline dentro de `dir`. Cada `begin`/`update` reescribe
//! el documento completo vía temp file + rename, así que un lector (o un
//! proceso que arranca tras un crash) ve el record anterior o el nuevo, nunca
//! uno a medias. No hay arbitraje entre procesos concurrentes.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use pipeflow_core::{RunHeader, RunRecord, RunStateError, RunStateStore, StepUpdate};

use crate::error::PersistenceError;
use crate::fs_util::{ensure_dir, file_name_for, read_optional, write_atomic};

#[derive(Debug, Clone)]
pub struct FileRunStateStore {
    dir: PathBuf,
}

impl FileRunStateStore {
    /// Abre (creando si hace falta) el directorio de estado.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        Ok(Self { dir: ensure_dir(dir)? })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ruta del documento de `pipeline_id`.
    pub fn path_for(&self, pipeline_id: &str) -> PathBuf {
        self.dir.join(file_name_for(pipeline_id))
    }

    fn read(&self, pipeline_id: &str) -> Result<RunRecord, PersistenceError> {
        let path = self.path_for(pipeline_id);
        let Some(raw) = read_optional(&path)? else { return Ok(RunRecord::empty(pipeline_id)) };
        let record: RunRecord =
            serde_json::from_str(&raw).map_err(|e| PersistenceError::Corruption { path: path.display().to_string(),
                                                                                  reason: e.to_string() })?;
        record.validate(pipeline_id)?;
        Ok(record)
    }

    fn write(&self, record: &RunRecord) -> Result<(), PersistenceError> {
        let path = self.path_for(&record.pipeline_id);
        let bytes = serde_json::to_vec_pretty(record)?;
        write_atomic(&self.dir, &path, &bytes)?;
        debug!("run record written pipeline={} path={}", record.pipeline_id, path.display());
        Ok(())
    }
}

impl RunStateStore for FileRunStateStore {
    fn load(&self, pipeline_id: &str) -> Result<RunRecord, RunStateError> {
        self.read(pipeline_id).map_err(|e| e.into_run_state(pipeline_id))
    }

    fn begin(&mut self, pipeline_id: &str, header: RunHeader) -> Result<RunRecord, RunStateError> {
        let mut record = self.load(pipeline_id)?;
        record.begin(&header);
        self.write(&record).map_err(|e| e.into_run_state(pipeline_id))?;
        Ok(record)
    }

    fn update(&mut self, pipeline_id: &str, update: StepUpdate) -> Result<(), RunStateError> {
        let mut record = self.load(pipeline_id)?;
        record.apply(&update)?;
        self.write(&record).map_err(|e| e.into_run_state(pipeline_id))
    }

    fn discard(&mut self, pipeline_id: &str) -> Result<(), RunStateError> {
        let path = self.path_for(pipeline_id);
        match fs::remove_file(&path) {
            Ok(()) => {
                warn!("run record discarded pipeline={pipeline_id} path={}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RunStateError::Io(e.to_string())),
        }
    }
}
