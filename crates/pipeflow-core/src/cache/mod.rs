//! Políticas de validez de cache.
//!
//! El scheduler sólo consulta la política para steps cuyo estado persistido
//! es `Succeeded` y cuyos productores directos fueron cache hit en la misma
//! invocación; la política decide si los outputs registrados siguen valiendo.

use std::collections::BTreeSet;

use log::debug;

use crate::run::StepRecord;
use crate::step::Step;
use crate::store::ArtifactStore;

/// Datos disponibles para decidir un cache hit.
pub struct CacheCheck<'a> {
    pub step: &'a Step,
    pub record: &'a StepRecord,
    /// Fingerprint calculado con los params actuales y las versiones actuales
    /// de los inputs.
    pub expected_fingerprint: &'a str,
    pub store: &'a dyn ArtifactStore,
}

impl CacheCheck<'_> {
    /// Todos los outputs declarados tienen referencia registrada.
    fn declared_outputs_recorded(&self) -> bool {
        self.step.output_names().iter().all(|o| self.record.output(o).is_some())
    }
}

pub trait CachePolicy: Send + Sync {
    fn is_valid(&self, check: &CacheCheck<'_>) -> bool;

    fn name(&self) -> &str;
}

/// Política por defecto (hash de contenido): el fingerprint coincide y cada
/// output sigue en el store con la misma versión.
#[derive(Debug, Default, Clone, Copy)]
pub struct FingerprintCache;

impl CachePolicy for FingerprintCache {
    fn is_valid(&self, check: &CacheCheck<'_>) -> bool {
        if check.record.fingerprint.as_deref() != Some(check.expected_fingerprint) {
            debug!("cache miss step={} reason=fingerprint", check.step.name());
            return false;
        }
        if !check.declared_outputs_recorded() {
            return false;
        }
        check.record.outputs.iter().all(|r| match check.store.version(&r.name) {
                                         Ok(Some(v)) if v == r.version => true,
                                         other => {
                                             debug!("cache miss step={} artifact={} store={:?}",
                                                    check.step.name(),
                                                    r.name,
                                                    other);
                                             false
                                         }
                                     })
    }

    fn name(&self) -> &str {
        "fingerprint"
    }
}

/// Basta con que los outputs registrados existan en el store (para stores
/// cuyos markers no son comparables, p. ej. timestamps externos).
#[derive(Debug, Default, Clone, Copy)]
pub struct ExistenceCache;

impl CachePolicy for ExistenceCache {
    fn is_valid(&self, check: &CacheCheck<'_>) -> bool {
        check.declared_outputs_recorded() && check.record.outputs.iter().all(|r| check.store.exists(&r.name))
    }

    fn name(&self) -> &str {
        "existence"
    }
}

/// Nunca hay cache hit: todo se re-ejecuta.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl CachePolicy for NoCache {
    fn is_valid(&self, _check: &CacheCheck<'_>) -> bool {
        false
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Invalidación manual: los steps nombrados se re-ejecutan; el resto delega
/// en `inner`. Como la validez es transitiva, sus consumidores también.
pub struct Invalidate<P: CachePolicy> {
    steps: BTreeSet<String>,
    inner: P,
}

impl<P: CachePolicy> Invalidate<P> {
    pub fn new<I, S>(steps: I, inner: P) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        Self { steps: steps.into_iter().map(Into::into).collect(),
               inner }
    }
}

impl<P: CachePolicy> CachePolicy for Invalidate<P> {
    fn is_valid(&self, check: &CacheCheck<'_>) -> bool {
        !self.steps.contains(check.step.name()) && self.inner.is_valid(check)
    }

    fn name(&self) -> &str {
        "invalidate"
    }
}
