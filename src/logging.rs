//! # Logging
//! src/logging.rs
//!
//! Inicializa el subscriber global de `tracing` para el binario. `RUST_LOG`
//! tiene prioridad; si no está definido se usa el nivel de la configuración.

use anyhow::{anyhow, Context};
use tracing_subscriber::EnvFilter;

/// Instala el subscriber `fmt` con un `EnvFilter`
///
/// Falla si el filtro es inválido o si ya había un subscriber global.
pub fn init(default_level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level)
            .with_context(|| format!("invalid log filter: {default_level}"))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("could not install log subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_is_rejected() {
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(init("job_server=loudest").is_err());
        }
    }
}
