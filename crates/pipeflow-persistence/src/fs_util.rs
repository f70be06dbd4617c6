//! Helpers de filesystem compartidos por los stores de archivo.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use pipeflow_core::hashing::hash_str;
use tempfile::NamedTempFile;

use crate::error::PersistenceError;

/// Nombre de archivo estable para una clave arbitraria: la parte legible se
/// sanea y un prefijo del hash evita colisiones entre claves que sanean igual.
pub(crate) fn file_name_for(key: &str) -> String {
    let readable: String = key.chars()
                              .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') { c } else { '_' })
                              .take(64)
                              .collect();
    format!("{readable}.{}.json", &hash_str(key)[..12])
}

/// Reemplaza `target` con `bytes` de forma atómica: temp file en el mismo
/// directorio, fsync, rename y fsync del directorio.
pub(crate) fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| PersistenceError::Io(e.error))?;
    sync_dir(dir)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), PersistenceError> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), PersistenceError> {
    Ok(())
}

pub(crate) fn ensure_dir(dir: impl Into<PathBuf>) -> Result<PathBuf, PersistenceError> {
    let dir = dir.into();
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Lee `path`; `Ok(None)` si no existe.
pub(crate) fn read_optional(path: &Path) -> Result<Option<String>, PersistenceError> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_safe_and_distinct() {
        let a = file_name_for("team/a b");
        let b = file_name_for("team_a_b");
        assert!(a.starts_with("team_a_b."));
        assert!(a.ends_with(".json"));
        assert_ne!(a, b);
        assert!(!a.contains('/'));
    }

    #[test]
    fn write_atomic_replaces_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("doc.json");
        write_atomic(dir.path(), &target, b"one").expect("first");
        write_atomic(dir.path(), &target, b"two").expect("second");
        assert_eq!(read_optional(&target).expect("read").as_deref(), Some("two"));
        assert_eq!(read_optional(&dir.path().join("missing")).expect("read"), None);
        // Sólo queda el documento final, sin temporales.
        assert_eq!(std::fs::read_dir(dir.path()).expect("ls").count(), 1);
    }
}
