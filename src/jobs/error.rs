//! # Errores del Sistema de Jobs
//! src/jobs/error.rs
//!
//! Taxonomía de errores del manager y del JobServer. Cada variante se
//! traduce a una respuesta HTTP distinta en `jobs::handlers`.

use std::path::PathBuf;
use thiserror::Error;

/// Errores del ciclo de vida de jobs
#[derive(Debug, Error)]
pub enum JobError {
    /// Operación invocada antes de `start()` o después de `stop()`
    #[error("manager not started")]
    NotStarted,

    /// `start()` invocado sobre un manager ya iniciado
    #[error("manager already started")]
    AlreadyStarted,

    /// Argumentos del job faltantes o malformados
    #[error("{0}")]
    Validation(String),

    /// La key no resuelve a un archivo dentro del directorio de trabajo
    #[error("no such working_dir or key")]
    NoSuchKey,

    /// Job id desconocido para el JobServer
    #[error("no such job_id")]
    NoSuchJob,

    /// Se consultó un directorio que nunca tuvo un subproceso asociado
    #[error("no subprocess tracked for working directory {0}")]
    UntrackedWorkingDir(PathBuf),

    /// Ya hay un subproceso vivo asociado al directorio
    #[error("working directory {0} already has a running subprocess")]
    Busy(PathBuf),

    /// El tipo de job produjo un argv vacío
    #[error("job produced an empty command line")]
    EmptyArgs,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl JobError {
    /// Construye un error de validación
    pub fn validation(message: impl Into<String>) -> Self {
        JobError::Validation(message.into())
    }

    /// Indica si el error es culpa del cliente (400/404)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            JobError::Validation(_) | JobError::NoSuchKey | JobError::NoSuchJob
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(JobError::NotStarted.to_string(), "manager not started");
        assert_eq!(JobError::NoSuchKey.to_string(), "no such working_dir or key");
        assert_eq!(JobError::NoSuchJob.to_string(), "no such job_id");
        assert_eq!(
            JobError::validation("missing or invalid arguments").to_string(),
            "missing or invalid arguments"
        );
    }

    #[test]
    fn test_client_errors() {
        assert!(JobError::validation("bad").is_client_error());
        assert!(JobError::NoSuchJob.is_client_error());
        assert!(!JobError::NotStarted.is_client_error());
        assert!(!JobError::EmptyArgs.is_client_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err: JobError = io.into();
        assert!(matches!(err, JobError::Io(_)));
        assert!(err.to_string().contains("disk gone"));
    }
}
