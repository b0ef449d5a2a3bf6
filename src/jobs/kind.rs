//! # Tipos de Job
//! src/jobs/kind.rs
//!
//! Un tipo de job decide qué proceso se lanza para unos argumentos dados.
//! El `JobManager` es genérico sobre este trait.

use crate::jobs::error::JobError;
use crate::jobs::types::{Kwargs, WorkingDirectory};
use std::ffi::OsString;
use std::process::Child;

/// Capacidades de un tipo de job concreto
pub trait JobKind: Send + 'static {
    /// Construye el argv del proceso a lanzar dentro de `working_dir`
    ///
    /// El primer elemento es el programa.
    fn get_args(
        &self,
        working_dir: &WorkingDirectory,
        kwargs: &Kwargs,
    ) -> Result<Vec<OsString>, JobError>;

    /// Valida y normaliza los argumentos del cliente antes de `run`
    ///
    /// Por defecto los deja pasar tal cual. Un error aquí significa que no
    /// se lanza ningún proceso ni se asigna job id.
    fn verify_run_kwargs(&self, kwargs: Kwargs) -> Result<Kwargs, JobError> {
        Ok(kwargs)
    }

    /// Hook de limpieza para un proceso que sigue vivo al apagar
    ///
    /// Por defecto no hace nada: el proceso queda abandonado.
    fn cleanup_subprocess(&self, _working_dir: &WorkingDirectory, _child: &mut Child) {}
}
