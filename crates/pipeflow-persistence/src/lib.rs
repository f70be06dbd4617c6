//! pipeflow-persistence
//!
//! Implementaciones durables de los traits de almacenamiento del core.
//!
//! Módulos:
//! - `file_state`: `FileRunStateStore`, un documento JSON por pipeline
//!   reemplazado atómicamente (temp file + rename + fsync).
//! - `file_artifacts`: `FileArtifactStore`, un archivo por artifact con el
//!   hash del contenido como version marker.
//! - `pg` (feature `postgres`): `PgRunStateStore` sobre Diesel + r2d2 con log
//!   append-only de transiciones.
//! - `config`: carga de `.env` y configuración de conexión.

pub mod config;
pub mod error;
pub mod file_artifacts;
pub mod file_state;
mod fs_util;

#[cfg(feature = "postgres")]
pub mod migrations;
#[cfg(feature = "postgres")]
pub mod pg;
#[cfg(feature = "postgres")]
pub mod schema;

pub use config::init_dotenv;
pub use error::PersistenceError;
pub use file_artifacts::FileArtifactStore;
pub use file_state::FileRunStateStore;
#[cfg(feature = "postgres")]
pub use pg::{build_pool, ConnectionProvider, PgPool, PgRunStateStore, PoolProvider};
