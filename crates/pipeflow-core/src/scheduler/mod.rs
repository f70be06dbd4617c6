//! Scheduler/Executor: recorre el grafo en orden de dependencias respetando
//! el estado previo, la política de cache y la de fallos.

mod executor;
mod options;

pub(crate) use executor::Scheduler;
pub use options::{FailurePolicy, RunOptions, RunOutcome, RunStatus, StepReport};
