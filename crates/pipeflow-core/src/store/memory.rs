use dashmap::DashMap;
use serde_json::Value;

use super::ArtifactStore;
use crate::errors::StoreError;
use crate::hashing::hash_value;
use crate::model::StoredArtifact;

/// Store en memoria; el version marker es el hash canónico del contenido.
///
/// `DashMap` permite lecturas/escrituras concurrentes desde workers del modo
/// paralelo sin un lock global.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    inner: DashMap<String, StoredArtifact>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Precarga un artifact externo (p. ej. datos crudos del pipeline).
    pub fn seed(&self, name: &str, content: Value) -> String {
        let version = hash_value(&content);
        self.inner.insert(name.to_string(), StoredArtifact::new(content, version.clone()));
        version
    }

    pub fn remove(&self, name: &str) -> Option<StoredArtifact> {
        self.inner.remove(name).map(|(_, v)| v)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn get(&self, name: &str) -> Result<StoredArtifact, StoreError> {
        self.inner
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn put(&self, name: &str, content: Value) -> Result<String, StoreError> {
        Ok(self.seed(name, content))
    }

    fn exists(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    fn version(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.get(name).map(|e| e.value().version.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn version_is_content_hash() {
        let store = InMemoryArtifactStore::new();
        let v1 = store.put("x", json!({"a": 1, "b": 2})).expect("put");
        let v2 = store.put("x", json!({"b": 2, "a": 1})).expect("put");
        assert_eq!(v1, v2);
        let v3 = store.put("x", json!({"a": 2})).expect("put");
        assert_ne!(v1, v3);
        assert_eq!(store.get("x").expect("get").version, v3);
        assert_eq!(store.version("missing").expect("version"), None);
        assert!(matches!(store.get("missing"), Err(StoreError::NotFound(_))));
    }
}
