//! Core `Engine` implementation

use chrono::Utc;
use log::info;
use uuid::Uuid;

use crate::cache::CachePolicy;
use crate::errors::{PipelineError, RunStateError};
use crate::pipeline::Pipeline;
use crate::run::{InMemoryRunStateStore, RunHeader, RunRecord, RunStateStore};
use crate::scheduler::{RunOptions, RunOutcome, Scheduler};
use crate::store::{ArtifactStore, InMemoryArtifactStore};

/// Motor de ejecución de pipelines.
///
/// Agrupa el `ArtifactStore` (datos) y el `RunStateStore` (estado por step).
/// Varios pipelines pueden compartir un mismo engine: el record se indexa por
/// id de pipeline.
#[derive(Debug)]
pub struct Engine<A, S>
    where A: ArtifactStore,
          S: RunStateStore
{
    artifacts: A,
    state: S,
}

impl<A, S> Engine<A, S>
    where A: ArtifactStore,
          S: RunStateStore
{
    /// Crea un motor con los stores proporcionados
    pub fn new(artifacts: A, state: S) -> Self {
        Self { artifacts, state }
    }

    pub fn artifacts(&self) -> &A {
        &self.artifacts
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    pub fn into_parts(self) -> (A, S) {
        (self.artifacts, self.state)
    }

    /// Record persistido de `pipeline_id`.
    pub fn record(&self, pipeline_id: &str) -> Result<RunRecord, RunStateError> {
        self.state.load(pipeline_id)
    }

    /// Ejecuta una invocación de `pipeline`.
    ///
    /// Errores de construcción del grafo y de run state abortan con `Err`;
    /// los fallos de steps quedan en el `RunOutcome`.
    pub fn execute(&mut self,
                   pipeline: &Pipeline,
                   cache: &dyn CachePolicy,
                   options: &RunOptions)
                   -> Result<RunOutcome, PipelineError> {
        let graph = pipeline.graph()?;
        let run_id = Uuid::new_v4();
        let header = RunHeader { run_id,
                                 definition_hash: pipeline.definition_hash(),
                                 steps: graph.order_names(),
                                 at: Utc::now() };
        let record = self.state.begin(pipeline.id(), header)?;
        info!("run {run_id} of '{}' starting: invocation={} steps={} policy={} cache={} parallel={}",
              pipeline.id(),
              record.invocation,
              graph.len(),
              options.failure_policy,
              cache.name(),
              options.max_parallel);
        Scheduler::new(&graph,
                       &self.artifacts,
                       &mut self.state,
                       cache,
                       options,
                       pipeline.id(),
                       run_id,
                       record).run()
    }
}

impl Engine<InMemoryArtifactStore, InMemoryRunStateStore> {
    /// Motor con ambos stores en memoria.
    pub fn in_memory() -> Self {
        Self::new(InMemoryArtifactStore::new(), InMemoryRunStateStore::new())
    }
}

impl Default for Engine<InMemoryArtifactStore, InMemoryRunStateStore> {
    fn default() -> Self {
        Self::in_memory()
    }
}
