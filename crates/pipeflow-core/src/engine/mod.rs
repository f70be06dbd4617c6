//! Engine: dueño de los stores (artifacts + run state) y punto de entrada de
//! cada invocación.

pub mod core;

pub use self::core::Engine;
