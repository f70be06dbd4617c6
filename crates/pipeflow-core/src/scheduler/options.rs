//! Opciones de ejecución y resultado agregado de un run.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::CancelToken;
use crate::run::{RunRecord, StepFailure};
use crate::step::StepStatus;

/// Qué hacer cuando un step falla.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// No se inicia ningún step más; los no iniciados quedan `Pending`.
    #[default]
    FailFast,
    /// Se ejecuta todo lo que no dependa de un fallo; lo demás queda
    /// `Skipped(DependencyFailed)`.
    BestEffort,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-fast" | "failfast" | "fail_fast" => Ok(Self::FailFast),
            "best-effort" | "besteffort" | "best_effort" => Ok(Self::BestEffort),
            other => Err(format!("unknown failure policy '{other}' (expected fail-fast or best-effort)")),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FailFast => "fail-fast",
            Self::BestEffort => "best-effort",
        })
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub failure_policy: FailurePolicy,
    /// Steps concurrentes como máximo; `1` ejecuta en el hilo del caller.
    pub max_parallel: usize,
    pub cancel: CancelToken,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { failure_policy: FailurePolicy::FailFast,
               max_parallel: 1,
               cancel: CancelToken::new() }
    }
}

impl RunOptions {
    pub fn new(failure_policy: FailurePolicy) -> Self {
        Self { failure_policy,
               ..Self::default() }
    }

    pub fn max_parallel(mut self, n: usize) -> Self {
        self.max_parallel = n.max(1);
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }
}

/// Estado agregado de una invocación.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Todos los steps terminaron bien (ejecutados o desde cache).
    AllSucceeded,
    /// Ningún fallo, pero quedaron steps sin completar (cancelación).
    Partial,
    /// Al menos un step falló.
    Failed,
}

/// Resultado de un step en esta invocación.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: String,
    pub status: StepStatus,
    /// `true` si su lógica se invocó en esta invocación.
    pub executed: bool,
    pub failure: Option<StepFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub pipeline_id: String,
    pub run_id: Uuid,
    pub status: RunStatus,
    /// Un reporte por step, en orden topológico.
    pub steps: Vec<StepReport>,
    /// Record persistido al terminar.
    pub record: RunRecord,
    pub cancelled: bool,
}

impl RunOutcome {
    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.step == name)
    }

    pub fn status_of(&self, name: &str) -> Option<StepStatus> {
        self.step(name).map(|s| s.status)
    }

    /// Steps cuya lógica se ejecutó, en orden de reporte.
    pub fn executed(&self) -> Vec<&str> {
        self.steps.iter().filter(|s| s.executed).map(|s| s.step.as_str()).collect()
    }

    pub fn failed(&self) -> Vec<&StepReport> {
        self.steps.iter().filter(|s| s.status == StepStatus::Failed).collect()
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::AllSucceeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_policy_parses_cli_spellings() {
        assert_eq!("fail-fast".parse::<FailurePolicy>(), Ok(FailurePolicy::FailFast));
        assert_eq!("Best_Effort".parse::<FailurePolicy>(), Ok(FailurePolicy::BestEffort));
        assert!("sometimes".parse::<FailurePolicy>().is_err());
        assert_eq!(FailurePolicy::BestEffort.to_string(), "best-effort");
    }

    #[test]
    fn max_parallel_is_at_least_one() {
        assert_eq!(RunOptions::default().max_parallel(0).max_parallel, 1);
    }
}
