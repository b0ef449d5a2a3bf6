//! # Gestor Central de Jobs
//! src/jobs/manager.rs
//!
//! Une la asignación de directorios de trabajo con el lanzamiento de
//! subprocesos bajo una sola máquina de estados, y expone acceso seguro a
//! los archivos de resultado.
//!
//! ```text
//! Unstarted --start()--> Started --stop()--> Stopped (equivale a Unstarted)
//! ```
//!
//! `run` solo es válido en `Started`.

use crate::jobs::error::JobError;
use crate::jobs::kind::JobKind;
use crate::jobs::pool::WorkingDirectoryPool;
use crate::jobs::process::ProcessRegistry;
use crate::jobs::types::{Kwargs, ProcessStatus, WorkingDirectory};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{dispatcher, info, warn, Dispatch};

/// Estado del ciclo de vida del manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Unstarted,
    Started,
    Stopped,
}

/// Gestor central de jobs
pub struct JobManager<K: JobKind> {
    /// Tipo de job concreto (argv, validación, limpieza)
    kind: K,

    state: ManagerState,

    /// Directorios de trabajo
    pool: WorkingDirectoryPool,

    /// Subprocesos por directorio
    processes: ProcessRegistry,

    /// Sink de logs inyectado; None = subscriber global
    log: Option<Dispatch>,
}

impl<K: JobKind> JobManager<K> {
    /// Crea un manager cuya raíz vive en el temp del sistema
    pub fn new(kind: K) -> Self {
        Self::with_pool(kind, WorkingDirectoryPool::new())
    }

    /// Crea un manager con un pool ya configurado
    pub fn with_pool(kind: K, pool: WorkingDirectoryPool) -> Self {
        Self {
            kind,
            state: ManagerState::Unstarted,
            pool,
            processes: ProcessRegistry::new(),
            log: None,
        }
    }

    /// Emite todos los logs del manager a `dispatch` en vez del global
    pub fn with_log_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.log = Some(dispatch);
        self
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn is_started(&self) -> bool {
        self.state == ManagerState::Started
    }

    /// Raíz actual del pool (None si no está iniciado)
    pub fn root(&self) -> Option<&Path> {
        self.pool.root()
    }

    /// Cantidad de subprocesos registrados
    pub fn tracked(&self) -> usize {
        self.processes.len()
    }

    /// Crea la raíz del pool y pasa a `Started`
    pub fn start(&mut self) -> Result<(), JobError> {
        if self.is_started() {
            return Err(JobError::AlreadyStarted);
        }

        let pool = &mut self.pool;
        with_log(&self.log, || -> Result<(), JobError> {
            let root = pool.start()?;
            info!(root = %root.display(), "job manager started");
            Ok(())
        })?;

        self.state = ManagerState::Started;
        Ok(())
    }

    /// Barre los subprocesos vivos y borra el pool
    ///
    /// Seguro de llamar sin `start()` previo. Los procesos que el hook de
    /// limpieza no termine siguen corriendo después de esto.
    pub fn stop(&mut self) -> Result<(), JobError> {
        let kind = &self.kind;
        let processes = &mut self.processes;
        let pool = &mut self.pool;
        let was_started = self.state == ManagerState::Started;

        with_log(&self.log, || -> Result<(), JobError> {
            let orphans = processes.shutdown_sweep(|working_dir, child| {
                kind.cleanup_subprocess(working_dir, child)
            });
            if orphans > 0 {
                warn!(orphans, "job manager stopped with subprocesses still running");
            }

            pool.stop()?;
            if was_started {
                info!("job manager stopped");
            }
            Ok(())
        })?;

        if was_started {
            self.state = ManagerState::Stopped;
        }
        Ok(())
    }

    /// Valida los argumentos del cliente con el tipo de job
    pub fn verify_run_kwargs(&self, kwargs: Kwargs) -> Result<Kwargs, JobError> {
        self.kind.verify_run_kwargs(kwargs)
    }

    /// Asigna un directorio, deriva el argv y lanza el proceso
    ///
    /// Retorna en cuanto el proceso arrancó, sin esperar a que termine. El
    /// directorio retornado es la llave de correlación del job.
    pub fn run(&mut self, kwargs: &Kwargs) -> Result<WorkingDirectory, JobError> {
        if !self.is_started() {
            return Err(JobError::NotStarted);
        }

        let kind = &self.kind;
        let pool = &self.pool;
        let processes = &mut self.processes;

        with_log(&self.log, || {
            let working_dir = pool.allocate()?;
            let argv = kind.get_args(&working_dir, kwargs)?;
            processes.spawn(&working_dir, &argv)?;
            Ok(working_dir)
        })
    }

    /// Estado no bloqueante del proceso del job
    pub fn poll(&mut self, working_dir: &WorkingDirectory) -> Result<ProcessStatus, JobError> {
        let processes = &mut self.processes;
        with_log(&self.log, || processes.poll(working_dir))
    }

    /// PID del proceso del job
    pub fn pid(&self, working_dir: &WorkingDirectory) -> Option<u32> {
        self.processes.pid(working_dir)
    }

    /// Resuelve `key` a un archivo regular dentro de `working_dir`
    ///
    /// Retorna None si la ruta normalizada escapa del directorio, si no
    /// existe, o si no es un archivo regular. Un symlink que apunte fuera
    /// del directorio también se rechaza.
    pub fn lookup_path(&self, working_dir: &WorkingDirectory, key: &str) -> Option<PathBuf> {
        let base = normalize(working_dir.as_path());
        let target = normalize(&base.join(key));

        // Comparación por componentes: "wd-1" no contiene a "wd-10/x"
        if target == base || !target.starts_with(&base) {
            return None;
        }
        if !target.is_file() {
            return None;
        }

        let real_base = base.canonicalize().ok()?;
        let real_target = target.canonicalize().ok()?;
        if !real_target.starts_with(&real_base) {
            return None;
        }

        Some(target)
    }

    /// Entradas directamente dentro de `working_dir` (sin recursión, orden del FS)
    pub fn list_working_dir(&self, working_dir: &WorkingDirectory) -> Result<Vec<String>, JobError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(working_dir.as_path())? {
            keys.push(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(keys)
    }

    /// Contenido completo del archivo `key`
    pub fn get_result_by_key(
        &self,
        working_dir: &WorkingDirectory,
        key: &str,
    ) -> Result<Vec<u8>, JobError> {
        let path = self
            .lookup_path(working_dir, key)
            .ok_or(JobError::NoSuchKey)?;
        Ok(fs::read(path)?)
    }
}

/// Ejecuta `f` con el sink inyectado como subscriber por defecto
fn with_log<T>(log: &Option<Dispatch>, f: impl FnOnce() -> T) -> T {
    match log {
        Some(dispatch) => dispatcher::with_default(dispatch, f),
        None => f(),
    }
}

/// Normalización léxica: resuelve `.` y `..` sin tocar el filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
