//! Recorrido del grafo y ejecución de steps.
//!
//! Todas las escrituras del run state ocurren en el hilo coordinador: los
//! workers sólo resuelven inputs, ejecutan la lógica y escriben outputs en el
//! artifact store. Así la secuencia `Pending -> Running -> {Succeeded|Failed}`
//! de cada step se persiste en orden aunque haya varios steps en vuelo.

use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;

use log::{debug, info, warn};
use uuid::Uuid;

use super::options::{FailurePolicy, RunOptions, RunOutcome, RunStatus, StepReport};
use crate::cache::{CacheCheck, CachePolicy};
use crate::errors::{PipelineError, RunStateError};
use crate::graph::DependencyGraph;
use crate::model::{ArtifactRef, RunContext, StepFingerprintInput};
use crate::run::{FailureKind, RunRecord, RunStateStore, StepFailure, StepUpdate};
use crate::step::{SkipReason, Step, StepInputs, StepStatus};
use crate::store::ArtifactStore;

/// Resolución de un step dentro de la invocación actual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Unresolved,
    Cached,
    Succeeded,
    Failed,
    DependencyFailed,
}

/// Resultado de un step ejecutado con éxito.
#[derive(Debug)]
pub(crate) struct Completed {
    outputs: Vec<ArtifactRef>,
    fingerprint: String,
}

type JobResult = Result<Completed, StepFailure>;

pub(crate) struct Scheduler<'a, A: ArtifactStore, S: RunStateStore> {
    graph: &'a DependencyGraph,
    artifacts: &'a A,
    state: &'a mut S,
    cache: &'a dyn CachePolicy,
    options: &'a RunOptions,
    pipeline_id: &'a str,
    run_id: Uuid,
    record: RunRecord,
    rank: Vec<usize>,
    remaining: Vec<usize>,
    resolution: Vec<Resolution>,
    failures: Vec<Option<StepFailure>>,
    ready: BTreeSet<(usize, usize)>,
    halted: bool,
}

impl<'a, A: ArtifactStore, S: RunStateStore> Scheduler<'a, A, S> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(graph: &'a DependencyGraph,
                      artifacts: &'a A,
                      state: &'a mut S,
                      cache: &'a dyn CachePolicy,
                      options: &'a RunOptions,
                      pipeline_id: &'a str,
                      run_id: Uuid,
                      record: RunRecord)
                      -> Self {
        let n = graph.len();
        let mut rank = vec![0; n];
        for (r, &i) in graph.order_indices().iter().enumerate() {
            rank[i] = r;
        }
        let remaining: Vec<usize> = (0..n).map(|i| graph.upstream_indices(i).len()).collect();
        let ready = (0..n).filter(|&i| remaining[i] == 0).map(|i| (rank[i], i)).collect();
        Self { graph,
               artifacts,
               state,
               cache,
               options,
               pipeline_id,
               run_id,
               record,
               rank,
               remaining,
               resolution: vec![Resolution::Unresolved; n],
               failures: vec![None; n],
               ready,
               halted: false }
    }

    /// Ejecuta la invocación completa y devuelve el outcome.
    pub(crate) fn run(mut self) -> Result<RunOutcome, PipelineError> {
        if self.options.max_parallel <= 1 {
            self.run_sequential()?;
        } else {
            self.run_parallel()?;
        }
        self.finish()
    }

    fn run_sequential(&mut self) -> Result<(), PipelineError> {
        while let Some((idx, ctx)) = self.next_job()? {
            let result = execute_step(self.graph.step_at(idx), self.artifacts, &ctx);
            self.complete(idx, result)?;
        }
        Ok(())
    }

    fn run_parallel(&mut self) -> Result<(), PipelineError> {
        let workers = self.options.max_parallel;
        let pool = rayon::ThreadPoolBuilder::new().num_threads(workers)
                                                  .thread_name(|i| format!("pipeflow-worker-{i}"))
                                                  .build()
                                                  .map_err(|e| PipelineError::Scheduler(format!("thread pool: {e}")))?;
        let graph = self.graph;
        let artifacts = self.artifacts;
        let (tx, rx) = mpsc::channel::<(usize, JobResult)>();

        pool.in_place_scope(|scope| -> Result<(), PipelineError> {
            let mut in_flight = 0usize;
            loop {
                while in_flight < workers {
                    let Some((idx, ctx)) = self.next_job()? else { break };
                    let tx = tx.clone();
                    let step = graph.step_at(idx);
                    scope.spawn(move |_| {
                             let result = execute_step(step, artifacts, &ctx);
                             // El receptor sólo desaparece si el coordinador abortó.
                             let _ = tx.send((idx, result));
                         });
                    in_flight += 1;
                }
                if in_flight == 0 {
                    return Ok(());
                }
                let (idx, result) =
                    rx.recv()
                      .map_err(|e| PipelineError::Scheduler(format!("worker channel closed: {e}")))?;
                in_flight -= 1;
                self.complete(idx, result)?;
            }
        })
    }

    /// Próximo step a ejecutar. Los cache hits se resuelven aquí mismo sin
    /// ocupar un worker.
    fn next_job(&mut self) -> Result<Option<(usize, RunContext)>, PipelineError> {
        loop {
            if self.halted || self.options.cancel.is_cancelled() {
                return Ok(None);
            }
            let Some((_, idx)) = self.ready.pop_first() else { return Ok(None) };
            let step = self.graph.step_at(idx);
            if self.is_cache_hit(idx) {
                info!("step {} cached, skipping", step.name());
                self.resolution[idx] = Resolution::Cached;
                self.release(idx);
                continue;
            }
            self.persist(StepUpdate::running(step.name()))?;
            info!("step {} running", step.name());
            let ctx = RunContext::new(self.pipeline_id, self.run_id, step.name(), self.options.cancel.clone());
            return Ok(Some((idx, ctx)));
        }
    }

    fn is_cache_hit(&self, idx: usize) -> bool {
        let step = self.graph.step_at(idx);
        let Some(rec) = self.record.step(step.name()) else { return false };
        if !rec.status.is_success() {
            return false;
        }
        // Validez transitiva: todo productor debe haber sido cache hit ahora.
        if self.graph
               .upstream_indices(idx)
               .iter()
               .any(|&u| self.resolution[u] != Resolution::Cached)
        {
            return false;
        }
        let Some(versions) = self.current_input_versions(step) else { return false };
        let params = step.params();
        let expected = StepFingerprintInput::new(step.name(), &params, &versions, step.output_names()).fingerprint();
        let check = CacheCheck { step,
                                 record: rec,
                                 expected_fingerprint: &expected,
                                 store: self.artifacts };
        let valid = self.cache.is_valid(&check);
        debug!("cache check step={} policy={} valid={valid}", step.name(), self.cache.name());
        valid
    }

    /// Versiones actuales de los inputs: las registradas por el productor o,
    /// para inputs externos, las que reporta el store.
    fn current_input_versions(&self, step: &Step) -> Option<Vec<(String, String)>> {
        step.input_names()
            .iter()
            .map(|input| {
                let version = match self.graph.producer_of(input) {
                    Some(p) => self.record.step(p.name())?.output(input)?.version.clone(),
                    None => self.artifacts.version(input).ok()??,
                };
                Some((input.clone(), version))
            })
            .collect()
    }

    fn complete(&mut self, idx: usize, result: JobResult) -> Result<(), PipelineError> {
        let name = self.graph.step_at(idx).name();
        match result {
            Ok(done) => {
                info!("step {name} succeeded ({} outputs)", done.outputs.len());
                self.persist(StepUpdate::succeeded(name, done.outputs, done.fingerprint))?;
                self.resolution[idx] = Resolution::Succeeded;
                self.release(idx);
            }
            Err(failure) => {
                warn!("step {name} failed [{:?}]: {}", failure.kind, failure.message);
                self.persist(StepUpdate::failed(name, failure.clone()))?;
                self.resolution[idx] = Resolution::Failed;
                self.failures[idx] = Some(failure);
                match self.options.failure_policy {
                    FailurePolicy::FailFast => self.halted = true,
                    FailurePolicy::BestEffort => self.skip_dependents(idx)?,
                }
            }
        }
        Ok(())
    }

    /// Un productor terminó bien: desbloquea a sus consumidores.
    fn release(&mut self, idx: usize) {
        for &d in self.graph.downstream_indices(idx) {
            self.remaining[d] -= 1;
            if self.remaining[d] == 0 && self.resolution[d] == Resolution::Unresolved {
                self.ready.insert((self.rank[d], d));
            }
        }
    }

    /// Marca `Skipped(DependencyFailed)` todo lo alcanzable desde `idx`.
    fn skip_dependents(&mut self, idx: usize) -> Result<(), PipelineError> {
        let mut stack = self.graph.downstream_indices(idx).to_vec();
        stack.sort_by_key(|&d| std::cmp::Reverse(self.rank[d]));
        while let Some(d) = stack.pop() {
            if self.resolution[d] != Resolution::Unresolved {
                continue;
            }
            let name = self.graph.step_at(d).name();
            info!("step {name} skipped: dependency failed");
            self.persist(StepUpdate::skipped(name, SkipReason::DependencyFailed))?;
            self.resolution[d] = Resolution::DependencyFailed;
            stack.extend(self.graph.downstream_indices(d).iter().copied());
        }
        Ok(())
    }

    fn persist(&mut self, update: StepUpdate) -> Result<(), RunStateError> {
        self.record.apply(&update)?;
        self.state.update(self.pipeline_id, update)
    }

    fn finish(mut self) -> Result<RunOutcome, PipelineError> {
        // Steps no alcanzados (fail-fast o cancelación) quedan `Pending`. Un
        // `Succeeded` previo sólo se conserva si nada aguas arriba cambió en
        // esta invocación.
        let mut stale = vec![false; self.graph.len()];
        for &idx in self.graph.order_indices() {
            if self.resolution[idx] != Resolution::Unresolved {
                continue;
            }
            let upstream_changed = self.graph.upstream_indices(idx).iter().any(|&u| match self.resolution[u] {
                                                                                 Resolution::Cached => false,
                                                                                 Resolution::Unresolved => stale[u],
                                                                                 _ => true,
                                                                             });
            stale[idx] = upstream_changed;
            let name = self.graph.step_at(idx).name();
            let current = self.record.status_of(name);
            let reset = match current {
                StepStatus::Pending => false,
                StepStatus::Failed | StepStatus::Skipped(SkipReason::DependencyFailed) => true,
                _ => stale[idx],
            };
            if reset {
                debug!("step {name} not reached, {} -> PENDING", current.label());
                self.persist(StepUpdate::pending(name))?;
            }
        }

        let unresolved = self.resolution.iter().any(|r| *r == Resolution::Unresolved);
        let cancelled = unresolved && self.options.cancel.is_cancelled();
        let status = if self.resolution.contains(&Resolution::Failed) {
            RunStatus::Failed
        } else if self.resolution.iter().all(|r| matches!(r, Resolution::Succeeded | Resolution::Cached)) {
            RunStatus::AllSucceeded
        } else {
            RunStatus::Partial
        };

        let steps = self.graph
                        .order_indices()
                        .iter()
                        .map(|&idx| {
                            let name = self.graph.step_at(idx).name();
                            let status = match self.resolution[idx] {
                                Resolution::Cached => StepStatus::Skipped(SkipReason::Cached),
                                Resolution::Succeeded => StepStatus::Succeeded,
                                Resolution::Failed => StepStatus::Failed,
                                Resolution::DependencyFailed => StepStatus::Skipped(SkipReason::DependencyFailed),
                                Resolution::Unresolved => self.record.status_of(name),
                            };
                            StepReport { step: name.to_string(),
                                         status,
                                         executed: matches!(self.resolution[idx],
                                                            Resolution::Succeeded | Resolution::Failed),
                                         failure: self.failures[idx].clone() }
                        })
                        .collect();

        let record = self.state.load(self.pipeline_id)?;
        info!("run {} of '{}' finished: {:?}{}",
              self.run_id,
              self.pipeline_id,
              status,
              if cancelled { " (cancelled)" } else { "" });
        Ok(RunOutcome { pipeline_id: self.pipeline_id.to_string(),
                        run_id: self.run_id,
                        status,
                        steps,
                        record,
                        cancelled })
    }
}

/// Resuelve inputs, ejecuta la lógica y persiste outputs. Corre en el hilo
/// del caller o en un worker; no toca el run state.
pub(crate) fn execute_step<A: ArtifactStore + ?Sized>(step: &Step, artifacts: &A, ctx: &RunContext) -> JobResult {
    let mut inputs = StepInputs::new();
    let mut versions = Vec::with_capacity(step.input_names().len());
    for name in step.input_names() {
        let artifact = artifacts.get(name)
                                .map_err(|e| StepFailure::new(FailureKind::Store, format!("reading '{name}': {e}")))?;
        versions.push((name.clone(), artifact.version.clone()));
        inputs.insert(name.clone(), artifact);
    }

    let produced = match catch_unwind(AssertUnwindSafe(|| step.logic().run(&inputs, ctx))) {
        Ok(Ok(out)) => out,
        Ok(Err(e)) => return Err(StepFailure::new(FailureKind::Execution, e.cause)),
        Err(panic) => {
            let msg = panic.downcast_ref::<&str>()
                           .map(|s| s.to_string())
                           .or_else(|| panic.downcast_ref::<String>().cloned())
                           .unwrap_or_else(|| "unknown panic payload".to_string());
            return Err(StepFailure::new(FailureKind::Execution, format!("step panicked: {msg}")));
        }
    };

    let declared = step.output_names();
    if let Some(extra) = produced.names().find(|n| !declared.iter().any(|d| d == n)) {
        return Err(StepFailure::new(FailureKind::Contract, format!("undeclared output '{extra}'")));
    }
    let mut produced = produced.into_inner();
    // Nada se escribe hasta comprobar que están todos los outputs declarados.
    let contents = declared.iter()
                           .map(|name| {
                               produced.swap_remove(name).map(|c| (name, c)).ok_or_else(|| {
                                   StepFailure::new(FailureKind::Contract, format!("missing declared output '{name}'"))
                               })
                           })
                           .collect::<Result<Vec<_>, _>>()?;
    let mut refs = Vec::with_capacity(contents.len());
    for (name, content) in contents {
        let version = artifacts.put(name, content)
                               .map_err(|e| StepFailure::new(FailureKind::Store, format!("writing '{name}': {e}")))?;
        debug!("artifact {name} written version={version}");
        refs.push(ArtifactRef::new(name.clone(), version));
    }

    let params = step.params();
    let fingerprint = StepFingerprintInput::new(step.name(), &params, &versions, declared).fingerprint();
    Ok(Completed { outputs: refs,
                   fingerprint })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StepExecutionError;
    use crate::step::StepOutputs;
    use crate::store::InMemoryArtifactStore;
    use serde_json::json;

    fn ctx() -> RunContext {
        RunContext::new("p", Uuid::new_v4(), "s", Default::default())
    }

    #[test]
    fn execute_step_rejects_undeclared_and_missing_outputs() {
        let store = InMemoryArtifactStore::new();
        let extra = Step::new("s", |_: &StepInputs, _: &RunContext| {
                        Ok::<_, StepExecutionError>(StepOutputs::new().with("x", json!(1)).with("y", json!(2)))
                    }).outputs(["x"]);
        let err = execute_step(&extra, &store, &ctx()).unwrap_err();
        assert_eq!(err.kind, FailureKind::Contract);

        let missing = Step::new("s", |_: &StepInputs, _: &RunContext| Ok::<_, StepExecutionError>(StepOutputs::new()))
                          .outputs(["x"]);
        let err = execute_step(&missing, &store, &ctx()).unwrap_err();
        assert!(err.message.contains("missing declared output 'x'"));
        assert!(!store.exists("x"));

        // Uno de dos outputs: el presente tampoco llega al store.
        let partial = Step::new("s", |_: &StepInputs, _: &RunContext| {
                          Ok::<_, StepExecutionError>(StepOutputs::new().with("a", json!(1)))
                      }).outputs(["a", "b"]);
        let err = execute_step(&partial, &store, &ctx()).unwrap_err();
        assert_eq!(err.kind, FailureKind::Contract);
        assert!(err.message.contains("missing declared output 'b'"));
        assert!(!store.exists("a"));
        assert!(!store.exists("b"));
    }

    #[test]
    fn failed_step_keeps_previous_artifact_version() {
        let store = InMemoryArtifactStore::new();
        let before = store.put("a", json!("old")).expect("seed");
        let partial = Step::new("s", |_: &StepInputs, _: &RunContext| {
                          Ok::<_, StepExecutionError>(StepOutputs::new().with("a", json!("new")))
                      }).outputs(["a", "b"]);
        assert!(execute_step(&partial, &store, &ctx()).is_err());
        assert_eq!(store.get("a").expect("a").version, before);
    }

    #[test]
    fn execute_step_reports_store_and_panic_failures() {
        let store = InMemoryArtifactStore::new();
        let reader = Step::new("s", |i: &StepInputs, _: &RunContext| -> Result<StepOutputs, StepExecutionError> {
                         let _ = i.require("raw")?;
                         Ok(StepOutputs::new())
                     }).inputs(["raw"]);
        assert_eq!(execute_step(&reader, &store, &ctx()).unwrap_err().kind, FailureKind::Store);

        let panicky = Step::new("s", |_: &StepInputs, _: &RunContext| -> Result<StepOutputs, StepExecutionError> {
                          panic!("boom")
                      });
        let err = execute_step(&panicky, &store, &ctx()).unwrap_err();
        assert_eq!(err.kind, FailureKind::Execution);
        assert!(err.message.contains("boom"));
    }
}
