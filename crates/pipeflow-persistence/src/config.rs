//! Carga de configuración desde variables de entorno.
//! Usa convención `DATABASE_URL` y parámetros opcionales de pool.

use dotenvy::dotenv;
use once_cell::sync::Lazy;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

/// Forzar carga temprana de .env desde aplicaciones externas.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}

#[cfg(feature = "postgres")]
pub use db::DbConfig;

#[cfg(feature = "postgres")]
mod db {
    use std::env;

    use crate::error::PersistenceError;

    #[derive(Debug, Clone)]
    pub struct DbConfig {
        pub url: String,
        pub min_connections: u32,
        pub max_connections: u32,
    }

    impl DbConfig {
        pub fn from_env() -> Result<Self, PersistenceError> {
            super::init_dotenv();
            let url = env::var("DATABASE_URL").map_err(|_| PersistenceError::Config("DATABASE_URL no definido".into()))?;
            let min_connections = env::var("DATABASE_MIN_CONNECTIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(1);
            let max_connections = env::var("DATABASE_MAX_CONNECTIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(4);
            Ok(Self { url,
                      min_connections,
                      max_connections })
        }
    }
}
