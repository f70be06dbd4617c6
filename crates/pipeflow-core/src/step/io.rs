//! Mapas de entrada/salida de un step.

use indexmap::IndexMap;
use serde_json::Value;

use crate::errors::StepExecutionError;
use crate::model::StoredArtifact;

/// Inputs resueltos de un step, en el orden declarado.
#[derive(Debug, Clone, Default)]
pub struct StepInputs {
    artifacts: IndexMap<String, StoredArtifact>,
}

impl StepInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, artifact: StoredArtifact) {
        self.artifacts.insert(name.into(), artifact);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.artifacts.get(name).map(|a| &a.content)
    }

    /// Como `get`, pero un input ausente es un error del step.
    pub fn require(&self, name: &str) -> Result<&Value, StepExecutionError> {
        self.get(name)
            .ok_or_else(|| StepExecutionError::new(format!("input '{name}' not resolved")))
    }

    pub fn version(&self, name: &str) -> Option<&str> {
        self.artifacts.get(name).map(|a| a.version.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StoredArtifact)> {
        self.artifacts.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// Outputs producidos por un step: nombre declarado -> contenido.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutputs {
    artifacts: IndexMap<String, Value>,
}

impl StepOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variante encadenable de `insert`.
    pub fn with(mut self, name: impl Into<String>, content: Value) -> Self {
        self.insert(name, content);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, content: Value) {
        self.artifacts.insert(name.into(), content);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.artifacts.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub(crate) fn into_inner(self) -> IndexMap<String, Value> {
        self.artifacts
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for StepOutputs {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        let mut out = StepOutputs::new();
        for (k, v) in iter {
            out.insert(k, v);
        }
        out
    }
}
