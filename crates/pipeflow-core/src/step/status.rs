use serde::{Deserialize, Serialize};

/// Por qué un step terminó `Skipped` en una invocación.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkipReason {
    /// Sus outputs previos siguen siendo válidos; no se invocó su lógica.
    Cached,
    /// Algún step productor de sus inputs falló (política best-effort).
    DependencyFailed,
}

/// Estado de un Step dentro del run record.
///
/// Las transiciones válidas son:
/// - cualquier estado no `Running` -> `Running`
/// - `Running` -> `Succeeded`
/// - `Running` -> `Failed`
/// - cualquier estado no `Running` -> `Skipped(_)`
///
/// `Running` persistido al cargar significa que el proceso murió con el step
/// en vuelo; se vuelve a ejecutar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped(SkipReason),
}

impl StepStatus {
    /// Comprueba si `self -> next` es una transición permitida.
    pub fn can_transition_to(self, next: StepStatus) -> bool {
        match (self, next) {
            (StepStatus::Running, StepStatus::Succeeded | StepStatus::Failed) => true,
            (StepStatus::Running, _) => false,
            (_, StepStatus::Running) => true,
            (_, StepStatus::Skipped(_)) => true,
            (_, StepStatus::Pending) => true,
            _ => false,
        }
    }

    /// `Succeeded` o `Skipped(Cached)`: los outputs registrados son usables.
    pub fn is_success(self) -> bool {
        matches!(self, StepStatus::Succeeded | StepStatus::Skipped(SkipReason::Cached))
    }

    pub fn label(self) -> &'static str {
        match self {
            StepStatus::Pending => "PENDING",
            StepStatus::Running => "RUNNING",
            StepStatus::Succeeded => "SUCCEEDED",
            StepStatus::Failed => "FAILED",
            StepStatus::Skipped(SkipReason::Cached) => "SKIPPED_CACHED",
            StepStatus::Skipped(SkipReason::DependencyFailed) => "SKIPPED_DEPENDENCY_FAILED",
        }
    }

    /// Inversa de `label`, usada por backends que guardan el estado como texto.
    pub fn from_label(label: &str) -> Option<Self> {
        Some(match label {
            "PENDING" => StepStatus::Pending,
            "RUNNING" => StepStatus::Running,
            "SUCCEEDED" => StepStatus::Succeeded,
            "FAILED" => StepStatus::Failed,
            "SKIPPED_CACHED" => StepStatus::Skipped(SkipReason::Cached),
            "SKIPPED_DEPENDENCY_FAILED" => StepStatus::Skipped(SkipReason::DependencyFailed),
            _ => return None,
        })
    }
}
