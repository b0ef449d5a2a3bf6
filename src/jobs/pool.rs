//! # Pool de Directorios de Trabajo
//! src/jobs/pool.rs
//!
//! Es dueño de un directorio raíz temporal y crea dentro de él un
//! subdirectorio con nombre único por cada job. Los subdirectorios no se
//! borran uno por uno: todo el árbol desaparece en `stop()`.

use crate::jobs::error::JobError;
use crate::jobs::types::WorkingDirectory;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempDir};
use tracing::debug;

const ROOT_PREFIX: &str = "job_server-";
const WORKING_DIR_PREFIX: &str = "wd-";

/// Pool de directorios de trabajo
#[derive(Debug, Default)]
pub struct WorkingDirectoryPool {
    /// Directorio padre de la raíz (None = temp del sistema)
    parent: Option<PathBuf>,

    /// Raíz actual; None mientras no esté iniciado
    root: Option<TempDir>,
}

impl WorkingDirectoryPool {
    /// Pool cuya raíz vive en el directorio temporal del sistema
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool cuya raíz se crea dentro de `parent`
    pub fn in_dir(parent: impl Into<PathBuf>) -> Self {
        Self {
            parent: Some(parent.into()),
            root: None,
        }
    }

    /// Crea una raíz nueva con nombre único
    ///
    /// Llamarlo dos veces sin `stop()` en medio es un error de estado.
    pub fn start(&mut self) -> Result<&Path, JobError> {
        if self.root.is_some() {
            return Err(JobError::AlreadyStarted);
        }

        let mut builder = Builder::new();
        builder.prefix(ROOT_PREFIX);
        let root = match &self.parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        debug!(root = %root.path().display(), "working directory root created");

        Ok(self.root.insert(root).path())
    }

    /// Borra recursivamente la raíz (si existe) y vuelve a no-iniciado
    ///
    /// Es un no-op si nunca se llamó `start()`.
    pub fn stop(&mut self) -> Result<(), JobError> {
        let Some(root) = self.root.take() else {
            return Ok(());
        };

        let path = root.path().to_path_buf();
        match root.close() {
            Ok(()) => {}
            // Alguien más ya la borró: el resultado es el mismo
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!(root = %path.display(), "working directory root removed");
        Ok(())
    }

    /// Crea un subdirectorio nuevo dentro de la raíz
    pub fn allocate(&self) -> Result<WorkingDirectory, JobError> {
        let root = self.root.as_ref().ok_or(JobError::NotStarted)?;

        let dir = Builder::new()
            .prefix(WORKING_DIR_PREFIX)
            .tempdir_in(root.path())?;

        Ok(WorkingDirectory::new(dir.keep()))
    }

    /// Ruta de la raíz actual
    pub fn root(&self) -> Option<&Path> {
        self.root.as_ref().map(|root| root.path())
    }

    pub fn is_started(&self) -> bool {
        self.root.is_some()
    }
}
