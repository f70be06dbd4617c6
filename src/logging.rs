//! Inicialización de logging para el binario.

use env_logger::{Builder, Env};

/// `RUST_LOG` manda; sin él se usa `info` (o `debug` con `verbose`).
/// Llamadas repetidas no fallan.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let _ = Builder::from_env(Env::default().default_filter_or(default)).format_timestamp_millis()
                                                                         .try_init();
}
