//! Modelos neutrales (ArtifactRef, Fingerprint, RunContext, ...)

pub mod artifact;
pub mod context;
pub mod fingerprint;

pub use artifact::{ArtifactRef, StoredArtifact};
pub use context::{CancelToken, RunContext};
pub use fingerprint::StepFingerprintInput;
