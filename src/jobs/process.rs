//! # Registro de Subprocesos
//! src/jobs/process.rs
//!
//! Asocia cada directorio de trabajo con el proceso lanzado dentro de él.
//! Nunca bloquea esperando a un proceso: el estado se consulta con
//! `try_wait`. Los procesos no se matan automáticamente; al apagar, los que
//! siguen vivos se reportan y se entregan a un hook de limpieza opcional.

use crate::jobs::error::JobError;
use crate::jobs::types::{ProcessStatus, WorkingDirectory};
use std::collections::HashMap;
use std::ffi::OsString;
use std::process::{Child, Command, Stdio};
use tracing::{debug, info, warn};

/// Asociación directorio de trabajo → proceso
#[derive(Debug)]
pub struct SubprocessRecord {
    child: Child,

    /// Estado terminal una vez observado (None = aún no terminó o no se consultó)
    exit: Option<ProcessStatus>,
}

impl SubprocessRecord {
    fn new(child: Child) -> Self {
        Self { child, exit: None }
    }

    /// PID del proceso
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Consulta no bloqueante del estado; cachea el estado terminal
    fn refresh(&mut self) -> Result<ProcessStatus, JobError> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }

        match self.child.try_wait()? {
            None => Ok(ProcessStatus::Running),
            Some(status) => {
                let exit = ProcessStatus::Exited { code: status.code() };
                if exit.success() {
                    debug!(pid = self.pid(), "subprocess exited successfully");
                } else {
                    warn!(pid = self.pid(), code = ?status.code(), "subprocess exited with an error");
                }
                self.exit = Some(exit);
                Ok(exit)
            }
        }
    }
}

/// Registro de subprocesos por directorio de trabajo
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    records: HashMap<WorkingDirectory, SubprocessRecord>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lanza `argv` con `working_dir` como directorio actual, sin esperar
    ///
    /// Retorna el PID del proceso lanzado.
    pub fn spawn(
        &mut self,
        working_dir: &WorkingDirectory,
        argv: &[OsString],
    ) -> Result<u32, JobError> {
        let (program, args) = argv.split_first().ok_or(JobError::EmptyArgs)?;

        // Un solo proceso vivo por directorio
        if let Some(record) = self.records.get_mut(working_dir) {
            if record.refresh()?.is_running() {
                return Err(JobError::Busy(working_dir.as_path().to_path_buf()));
            }
        }

        let child = Command::new(program)
            .args(args)
            .current_dir(working_dir.as_path())
            .stdin(Stdio::null())
            .spawn()?;

        let pid = child.id();
        info!(pid, working_dir = %working_dir, program = ?program, "subprocess spawned");
        self.records
            .insert(working_dir.clone(), SubprocessRecord::new(child));

        Ok(pid)
    }

    /// Estado no bloqueante del proceso asociado a `working_dir`
    ///
    /// Un directorio sin registro solo puede venir de un error del llamador:
    /// las llaves válidas salen siempre de un `spawn` previo.
    pub fn poll(&mut self, working_dir: &WorkingDirectory) -> Result<ProcessStatus, JobError> {
        self.records
            .get_mut(working_dir)
            .ok_or_else(|| JobError::UntrackedWorkingDir(working_dir.as_path().to_path_buf()))?
            .refresh()
    }

    /// PID del proceso asociado (si hay)
    pub fn pid(&self, working_dir: &WorkingDirectory) -> Option<u32> {
        self.records.get(working_dir).map(|record| record.pid())
    }

    pub fn contains(&self, working_dir: &WorkingDirectory) -> bool {
        self.records.contains_key(working_dir)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Vacía el registro, avisando por cada proceso que sigue corriendo
    ///
    /// `cleanup` recibe cada proceso huérfano; lo que haga con él (esperar,
    /// matarlo o nada) es decisión del llamador. Los procesos que sobrevivan
    /// al hook quedan abandonados: soltar un `Child` no lo mata.
    /// Retorna cuántos procesos seguían corriendo.
    pub fn shutdown_sweep<F>(&mut self, mut cleanup: F) -> usize
    where
        F: FnMut(&WorkingDirectory, &mut Child),
    {
        let mut orphans = 0;

        for (working_dir, mut record) in self.records.drain() {
            let running = match record.refresh() {
                Ok(status) => status.is_running(),
                Err(e) => {
                    warn!(pid = record.pid(), error = %e, "could not query subprocess at shutdown");
                    true
                }
            };
            if !running {
                continue;
            }

            orphans += 1;
            warn!(
                pid = record.pid(),
                working_dir = %working_dir,
                "subprocess still running at shutdown"
            );
            cleanup(&working_dir, &mut record.child);
        }

        orphans
    }
}
