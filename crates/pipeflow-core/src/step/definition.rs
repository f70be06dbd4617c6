use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::{StepInputs, StepOutputs};
use crate::errors::{GraphError, StepExecutionError};
use crate::model::RunContext;

/// Capacidad ejecutable de un step.
///
/// Implementaciones deben depender únicamente de `inputs` + `params()`: el
/// engine asume que mismos inputs y params producen outputs equivalentes al
/// decidir cache hits.
pub trait StepLogic: Send + Sync {
    /// Ejecuta el step. Debe devolver exactamente los outputs declarados.
    fn run(&self, inputs: &StepInputs, ctx: &RunContext) -> Result<StepOutputs, StepExecutionError>;

    /// Parámetros deterministas que forman parte del fingerprint. Cambiarlos
    /// invalida la cache del step y de todo lo que depende de él.
    fn params(&self) -> Value {
        Value::Null
    }
}

impl<F> StepLogic for F
    where F: Fn(&StepInputs, &RunContext) -> Result<StepOutputs, StepExecutionError> + Send + Sync
{
    fn run(&self, inputs: &StepInputs, ctx: &RunContext) -> Result<StepOutputs, StepExecutionError> {
        self(inputs, ctx)
    }
}

/// Declaración inmutable de un step.
#[derive(Clone)]
pub struct Step {
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    logic: Arc<dyn StepLogic>,
}

impl Step {
    pub fn new(name: impl Into<String>, logic: impl StepLogic + 'static) -> Self {
        Self::from_arc(name, Arc::new(logic))
    }

    pub fn from_arc(name: impl Into<String>, logic: Arc<dyn StepLogic>) -> Self {
        Self { name: name.into(),
               inputs: Vec::new(),
               outputs: Vec::new(),
               logic }
    }

    pub fn inputs<I, S>(mut self, names: I) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        self.inputs = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn outputs<I, S>(mut self, names: I) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        self.outputs = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_names(&self) -> &[String] {
        &self.inputs
    }

    pub fn output_names(&self) -> &[String] {
        &self.outputs
    }

    pub fn logic(&self) -> &Arc<dyn StepLogic> {
        &self.logic
    }

    pub fn params(&self) -> Value {
        self.logic.params()
    }

    /// Validación local: nombre no vacío, sin nombres repetidos en sus
    /// propias listas.
    pub fn validate(&self) -> Result<(), GraphError> {
        let invalid = |reason: String| GraphError::InvalidStep { step: self.name.clone(),
                                                                 reason };
        if self.name.trim().is_empty() {
            return Err(invalid("step name must not be empty".into()));
        }
        for (kind, names) in [("input", &self.inputs), ("output", &self.outputs)] {
            for (i, n) in names.iter().enumerate() {
                if n.trim().is_empty() {
                    return Err(invalid(format!("empty {kind} name")));
                }
                if names[..i].contains(n) {
                    return Err(invalid(format!("{kind} '{n}' declared twice")));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
         .field("name", &self.name)
         .field("inputs", &self.inputs)
         .field("outputs", &self.outputs)
         .finish_non_exhaustive()
    }
}
