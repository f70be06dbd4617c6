//! Definiciones relacionadas a Steps.
//!
//! Un Step es una unidad de trabajo con inputs y outputs declarados por
//! nombre. Este módulo define:
//! - `StepLogic`: la capacidad ejecutable (trait único; closures la
//!   implementan).
//! - `Step`: declaración inmutable (nombre, inputs, outputs, lógica).
//! - `StepInputs` / `StepOutputs`: mapas estructurados de entrada y salida.
//! - `StepStatus` y `SkipReason`.

pub mod definition;
pub mod io;
mod status;

pub use definition::{Step, StepLogic};
pub use io::{StepInputs, StepOutputs};
pub use status::{SkipReason, StepStatus};
