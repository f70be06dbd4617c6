//! pipeflow-core: motor de pipelines con DAG de dependencias, cache por
//! fingerprint y reanudación desde el último run.
//!
//! Piezas principales:
//! - [`Step`] / [`StepLogic`]: unidad de trabajo con inputs y outputs nombrados.
//! - [`Pipeline`]: conjunto de steps + artifacts externos.
//! - [`DependencyGraph`]: orden topológico determinista.
//! - [`ArtifactStore`] y [`RunStateStore`]: almacenamiento de datos y de estado.
//! - [`Engine`]: ejecuta invocaciones aplicando una [`CachePolicy`].
pub mod cache;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod hashing;
pub mod model;
pub mod pipeline;
pub mod run;
pub mod scheduler;
pub mod step;
pub mod store;

pub use cache::{CacheCheck, CachePolicy, ExistenceCache, FingerprintCache, Invalidate, NoCache};
pub use engine::Engine;
pub use errors::{GraphError, PipelineError, RunStateError, StepExecutionError, StoreError};
pub use graph::DependencyGraph;
pub use model::{ArtifactRef, CancelToken, RunContext, StoredArtifact};
pub use pipeline::Pipeline;
pub use run::{FailureKind, InMemoryRunStateStore, RunHeader, RunRecord, RunStateStore, StepFailure, StepRecord, StepUpdate};
pub use scheduler::{FailurePolicy, RunOptions, RunOutcome, RunStatus, StepReport};
pub use step::{SkipReason, Step, StepInputs, StepLogic, StepOutputs, StepStatus};
pub use store::{ArtifactStore, InMemoryArtifactStore};
