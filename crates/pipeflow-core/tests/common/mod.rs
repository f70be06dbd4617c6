#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use pipeflow_core::{RunContext, Step, StepExecutionError, StepInputs, StepLogic, StepOutputs};
use serde_json::{json, Value};

/// Bitácora compartida de ejecuciones (orden observado).
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, name: &str) {
        self.0.lock().expect("journal lock").push(name.to_string());
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().expect("journal lock"))
    }
}

/// Lógica de prueba: registra la ejecución, puede fallar a demanda y emite
/// un output derivado de sus inputs y params.
pub struct Tracked {
    name: String,
    outputs: Vec<String>,
    journal: Journal,
    fail: Arc<AtomicBool>,
    params: Value,
}

impl StepLogic for Tracked {
    fn run(&self, inputs: &StepInputs, _ctx: &RunContext) -> Result<StepOutputs, StepExecutionError> {
        self.journal.push(&self.name);
        if self.fail.load(Ordering::SeqCst) {
            return Err(StepExecutionError::new(format!("{} exploded", self.name)));
        }
        let seen: Vec<Value> = inputs.iter().map(|(_, a)| a.content.clone()).collect();
        Ok(self.outputs
               .iter()
               .map(|o| (o.clone(), json!({ "by": self.name, "from": seen, "params": self.params })))
               .collect())
    }

    fn params(&self) -> Value {
        self.params.clone()
    }
}

pub fn tracked(name: &str, inputs: &[&str], outputs: &[&str], journal: &Journal) -> (Step, Arc<AtomicBool>) {
    tracked_with(name, inputs, outputs, journal, Value::Null)
}

pub fn tracked_with(name: &str,
                    inputs: &[&str],
                    outputs: &[&str],
                    journal: &Journal,
                    params: Value)
                    -> (Step, Arc<AtomicBool>) {
    let fail = Arc::new(AtomicBool::new(false));
    let logic = Tracked { name: name.to_string(),
                          outputs: outputs.iter().map(|s| s.to_string()).collect(),
                          journal: journal.clone(),
                          fail: fail.clone(),
                          params };
    let step = Step::new(name, logic).inputs(inputs.iter().copied()).outputs(outputs.iter().copied());
    (step, fail)
}
