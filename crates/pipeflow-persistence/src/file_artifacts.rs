//! Artifact store en disco: un documento JSON por artifact.
//!
//! El version marker es el hash canónico del contenido, igual que en el store
//! en memoria, así los fingerprints no dependen del backend elegido.

use std::path::{Path, PathBuf};

use log::debug;
use pipeflow_core::hashing::hash_value;
use pipeflow_core::{ArtifactStore, StoreError, StoredArtifact};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PersistenceError;
use crate::fs_util::{ensure_dir, file_name_for, read_optional, write_atomic};

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactDocument {
    name: String,
    version: String,
    content: Value,
}

#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    dir: PathBuf,
}

impl FileArtifactStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        Ok(Self { dir: ensure_dir(dir)? })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(file_name_for(name))
    }

    fn read(&self, name: &str) -> Result<Option<ArtifactDocument>, PersistenceError> {
        let path = self.path_for(name);
        let Some(raw) = read_optional(&path)? else { return Ok(None) };
        let doc: ArtifactDocument = serde_json::from_str(&raw)?;
        if doc.name != name {
            return Err(PersistenceError::Corruption { path: path.display().to_string(),
                                                      reason: format!("document holds artifact '{}'", doc.name) });
        }
        Ok(Some(doc))
    }
}

impl ArtifactStore for FileArtifactStore {
    fn get(&self, name: &str) -> Result<StoredArtifact, StoreError> {
        match self.read(name).map_err(|e| e.into_store(name))? {
            Some(doc) => Ok(StoredArtifact::new(doc.content, doc.version)),
            None => Err(StoreError::NotFound(name.to_string())),
        }
    }

    fn put(&self, name: &str, content: Value) -> Result<String, StoreError> {
        let version = hash_value(&content);
        let doc = ArtifactDocument { name: name.to_string(),
                                     version: version.clone(),
                                     content };
        let bytes = serde_json::to_vec(&doc).map_err(|e| StoreError::Serialization(format!("{name}: {e}")))?;
        write_atomic(&self.dir, &self.path_for(name), &bytes).map_err(|e| e.into_store(name))?;
        debug!("artifact {name} stored version={version}");
        Ok(version)
    }

    fn exists(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }

    fn version(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read(name).map_err(|e| e.into_store(name))?.map(|d| d.version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeflow_core::InMemoryArtifactStore;
    use serde_json::json;

    #[test]
    fn versions_match_in_memory_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileArtifactStore::open(dir.path()).expect("open");
        let content = json!({"rows": [1, 2], "kind": "demo"});
        let v = store.put("dataset/raw", content.clone()).expect("put");
        assert_eq!(v, InMemoryArtifactStore::new().seed("dataset/raw", content.clone()));
        assert_eq!(store.get("dataset/raw").expect("get").content, content);
        assert_eq!(store.version("dataset/raw").expect("version"), Some(v));
        assert_eq!(store.version("other").expect("version"), None);
        assert!(matches!(store.get("other"), Err(StoreError::NotFound(_))));
    }
}
