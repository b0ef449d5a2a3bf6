//! # Módulo del Servidor HTTP
//! src/server/mod.rs
//!
//! Servidor TCP que:
//! 1. Escucha en un puerto
//! 2. Corre los hooks de ciclo de vida antes de aceptar conexiones
//! 3. Atiende cada conexión en su propio thread
//! 4. Al detenerse, espera a las conexiones en curso y corre los hooks de parada

pub mod tcp;

// Re-exportar para facilitar el uso
pub use tcp::{HookResult, Lifecycle, Server, ServerError, StopHandle};
