//! Referencias a artifacts.
//!
//! El engine nunca posee los bytes de un artifact: eso es responsabilidad del
//! `ArtifactStore`. Lo que circula por el record y entre steps es un
//! `ArtifactRef` (nombre + version marker). El marker es opaco para el motor;
//! los stores incluidos usan el hash canónico del contenido.
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Nombre + version marker de un artifact producido por un step exitoso.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ArtifactRef {
    pub name: String,
    pub version: String,
}

impl ArtifactRef {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self { name: name.into(),
               version: version.into() }
    }
}

/// Artifact resuelto desde el store: contenido + marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub content: Value,
    pub version: String,
}

impl StoredArtifact {
    pub fn new(content: Value, version: impl Into<String>) -> Self {
        Self { content,
               version: version.into() }
    }
}
