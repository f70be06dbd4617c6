//! Declaración de un pipeline: steps + artifacts externos.
//!
//! Un `Pipeline` es sólo definición; el estado vive en el `RunStateStore` del
//! engine bajo el id del pipeline, así re-ejecutar la misma definición retoma
//! donde quedó la invocación anterior.

use serde_json::{json, Value};

use crate::cache::CachePolicy;
use crate::engine::Engine;
use crate::errors::{GraphError, PipelineError};
use crate::graph::DependencyGraph;
use crate::hashing::hash_value;
use crate::run::RunStateStore;
use crate::scheduler::{FailurePolicy, RunOptions, RunOutcome};
use crate::step::Step;
use crate::store::ArtifactStore;

#[derive(Debug, Clone)]
pub struct Pipeline {
    id: String,
    externals: Vec<String>,
    steps: Vec<Step>,
}

impl Pipeline {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(),
               externals: Vec::new(),
               steps: Vec::new() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn external_inputs(&self) -> &[String] {
        &self.externals
    }

    /// Declara un artifact que ningún step produce y que debe existir en el
    /// store antes de ejecutar.
    pub fn external_input(mut self, name: impl Into<String>) -> Self {
        self.add_external_input(name);
        self
    }

    pub fn add_external_input(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        if !self.externals.contains(&name) {
            self.externals.push(name);
        }
        self
    }

    /// Registra un step. Nombre repetido, output ya producido por otro step,
    /// output declarado como externo y listas inválidas se rechazan aquí;
    /// inputs sin productor y ciclos se detectan al construir el grafo.
    pub fn add_step(&mut self, step: Step) -> Result<&mut Self, GraphError> {
        step.validate()?;
        if self.steps.iter().any(|s| s.name() == step.name()) {
            return Err(GraphError::DuplicateStep { name: step.name().to_string() });
        }
        for out in step.output_names() {
            if self.externals.contains(out) {
                return Err(GraphError::ExternalConflict { artifact: out.clone(),
                                                          step: step.name().to_string() });
            }
            if let Some(first) = self.steps.iter().find(|s| s.output_names().contains(out)) {
                return Err(GraphError::DuplicateOutput { artifact: out.clone(),
                                                         first: first.name().to_string(),
                                                         second: step.name().to_string() });
            }
        }
        self.steps.push(step);
        Ok(self)
    }

    /// Variante encadenable de [`Pipeline::add_step`].
    pub fn with_step(mut self, step: Step) -> Result<Self, GraphError> {
        self.add_step(step)?;
        Ok(self)
    }

    /// Construye (y valida) el grafo de dependencias.
    pub fn graph(&self) -> Result<DependencyGraph, GraphError> {
        DependencyGraph::build(&self.steps, self.externals.iter().cloned())
    }

    /// Hash estable de la definición (ids, declaraciones y params).
    pub fn definition_hash(&self) -> String {
        let steps: Vec<Value> = self.steps
                                    .iter()
                                    .map(|s| {
                                        json!({
                                            "name": s.name(),
                                            "inputs": s.input_names(),
                                            "outputs": s.output_names(),
                                            "params": s.params(),
                                        })
                                    })
                                    .collect();
        hash_value(&json!({
                       "id": self.id,
                       "externals": self.externals,
                       "steps": steps,
                   }))
    }

    /// Ejecuta el pipeline con la política de fallo indicada y el resto de
    /// opciones por defecto (secuencial).
    pub fn run<A, S>(&self,
                     engine: &mut Engine<A, S>,
                     cache: &dyn CachePolicy,
                     failure_policy: FailurePolicy)
                     -> Result<RunOutcome, PipelineError>
        where A: ArtifactStore,
              S: RunStateStore
    {
        self.run_with(engine, cache, &RunOptions::new(failure_policy))
    }

    pub fn run_with<A, S>(&self,
                          engine: &mut Engine<A, S>,
                          cache: &dyn CachePolicy,
                          options: &RunOptions)
                          -> Result<RunOutcome, PipelineError>
        where A: ArtifactStore,
              S: RunStateStore
    {
        engine.execute(self, cache, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StepExecutionError;
    use crate::model::RunContext;
    use crate::step::{StepInputs, StepOutputs};

    fn noop(_: &StepInputs, _: &RunContext) -> Result<StepOutputs, StepExecutionError> {
        Ok(StepOutputs::new())
    }

    #[test]
    fn add_step_rejects_duplicate_names() {
        let mut p = Pipeline::new("p");
        p.add_step(Step::new("a", noop).outputs(["x"])).expect("first");
        let err = p.add_step(Step::new("a", noop).outputs(["y"])).unwrap_err();
        assert_eq!(err, GraphError::DuplicateStep { name: "a".into() });
        assert_eq!(p.steps().len(), 1);
    }

    #[test]
    fn add_step_rejects_shared_and_external_outputs() {
        let mut p = Pipeline::new("p").external_input("raw");
        p.add_step(Step::new("a", noop).inputs(["raw"]).outputs(["x"])).expect("a");
        assert!(matches!(p.add_step(Step::new("b", noop).outputs(["x"])),
                         Err(GraphError::DuplicateOutput { ref first, .. }) if first == "a"));
        assert!(matches!(p.add_step(Step::new("c", noop).outputs(["raw"])),
                         Err(GraphError::ExternalConflict { .. })));
        assert_eq!(p.steps().len(), 1);
    }

    #[test]
    fn definition_hash_tracks_declarations() {
        let build = |out: &str| {
            Pipeline::new("p").external_input("raw")
                              .with_step(Step::new("a", noop).inputs(["raw"]).outputs([out]))
                              .expect("step")
        };
        assert_eq!(build("x").definition_hash(), build("x").definition_hash());
        assert_ne!(build("x").definition_hash(), build("y").definition_hash());
    }
}
