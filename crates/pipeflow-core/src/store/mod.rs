//! Interfaz del artifact store.
//!
//! Son las únicas primitivas de persistencia de datos de las que depende el
//! engine. El locking (si hace falta) es responsabilidad de la
//! implementación; el engine sólo asume read-after-write para un mismo nombre
//! dentro del proceso.

mod memory;

pub use memory::InMemoryArtifactStore;

use serde_json::Value;

use crate::errors::StoreError;
use crate::model::StoredArtifact;

pub trait ArtifactStore: Send + Sync {
    /// Contenido + version marker del artifact `name`.
    fn get(&self, name: &str) -> Result<StoredArtifact, StoreError>;

    /// Escribe `content` bajo `name` y devuelve el nuevo version marker.
    fn put(&self, name: &str, content: Value) -> Result<String, StoreError>;

    fn exists(&self, name: &str) -> bool;

    /// Version marker actual sin necesidad de materializar el contenido.
    /// `Ok(None)` si el artifact no existe.
    fn version(&self, name: &str) -> Result<Option<String>, StoreError> {
        if !self.exists(name) {
            return Ok(None);
        }
        self.get(name).map(|a| Some(a.version))
    }
}

impl<T: ArtifactStore + ?Sized> ArtifactStore for &T {
    fn get(&self, name: &str) -> Result<StoredArtifact, StoreError> {
        (**self).get(name)
    }

    fn put(&self, name: &str, content: Value) -> Result<String, StoreError> {
        (**self).put(name, content)
    }

    fn exists(&self, name: &str) -> bool {
        (**self).exists(name)
    }

    fn version(&self, name: &str) -> Result<Option<String>, StoreError> {
        (**self).version(name)
    }
}
