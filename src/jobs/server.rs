//! # JobServer
//! src/jobs/server.rs
//!
//! Frontera entre HTTP y el `JobManager`: genera los job ids, mantiene el
//! mapa job id → directorio de trabajo y traduce el estado del proceso a
//! `PollStatus`.
//!
//! El servidor TCP atiende cada conexión en su propio thread, así que el
//! manager y el mapa viven detrás de un solo `Mutex`. Ninguna operación
//! espera a un subproceso mientras tiene el lock.

use crate::http::Method;
use crate::jobs::error::JobError;
use crate::jobs::handlers;
use crate::jobs::kind::JobKind;
use crate::jobs::manager::JobManager;
use crate::jobs::types::{Kwargs, PollStatus, Submission, WorkingDirectory};
use crate::router::Router;
use crate::server::{HookResult, Lifecycle, Server};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

struct Inner<K: JobKind> {
    manager: JobManager<K>,
    jobs: HashMap<String, WorkingDirectory>,
}

/// Archivo de resultado listo para servir
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultFile {
    /// Ruta resuelta dentro del directorio del job
    pub path: PathBuf,

    pub contents: Vec<u8>,
}

/// Servidor de jobs sobre un `JobManager`
pub struct JobServer<K: JobKind> {
    inner: Mutex<Inner<K>>,

    /// Si es true, `attach` registra el servidor como listener de ciclo de vida
    hook_start_stop: bool,
}

/// Une el prefijo de montaje con un path relativo (`/api` + `/poll/x`)
pub fn mount_path(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Job id nuevo: 128 bits aleatorios en hex
///
/// Las colisiones no se detectan; con 128 bits se consideran despreciables.
fn generate_job_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

impl<K: JobKind> JobServer<K> {
    pub fn new(manager: JobManager<K>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                manager,
                jobs: HashMap::new(),
            }),
            hook_start_stop: true,
        }
    }

    /// Desactiva el arranque/parada automáticos con el servidor HTTP
    pub fn with_hook_start_stop(mut self, hook_start_stop: bool) -> Self {
        self.hook_start_stop = hook_start_stop;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K>> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("job server lock was poisoned; recovering");
            poisoned.into_inner()
        })
    }

    /// Inicia el manager
    pub fn start(&self) -> Result<(), JobError> {
        let mut inner = self.lock();
        inner.manager.start()?;
        inner.jobs.clear();
        Ok(())
    }

    /// Detiene el manager y olvida todos los job ids
    ///
    /// Si el manager no logra detenerse los job ids se conservan; un
    /// segundo `stop()` los limpia.
    pub fn stop(&self) -> Result<(), JobError> {
        let mut inner = self.lock();
        inner.manager.stop()?;
        inner.jobs.clear();
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.lock().manager.is_started()
    }

    /// Cantidad de job ids conocidos
    pub fn job_count(&self) -> usize {
        self.lock().jobs.len()
    }

    /// Directorio de trabajo de un job
    pub fn working_dir(&self, job_id: &str) -> Option<WorkingDirectory> {
        self.lock().jobs.get(job_id).cloned()
    }

    /// Valida los argumentos, lanza el job y registra un job id nuevo
    ///
    /// Si la validación falla no se lanza nada ni se asigna id. La
    /// `location` es relativa al prefijo de montaje.
    pub fn submit(&self, kwargs: Kwargs) -> Result<Submission, JobError> {
        let mut inner = self.lock();
        if !inner.manager.is_started() {
            return Err(JobError::NotStarted);
        }

        let kwargs = inner.manager.verify_run_kwargs(kwargs)?;
        let working_dir = inner.manager.run(&kwargs)?;

        let job_id = generate_job_id();
        info!(job_id = %job_id, working_dir = %working_dir, "job created");
        inner.jobs.insert(job_id.clone(), working_dir);

        Ok(Submission {
            location: format!("/poll/{}", job_id),
            job_id,
        })
    }

    /// Estado actual de un job, sin bloquear
    pub fn poll(&self, job_id: &str) -> Result<PollStatus, JobError> {
        let mut inner = self.lock();
        let working_dir = inner.jobs.get(job_id).cloned().ok_or(JobError::NoSuchJob)?;

        let status = inner.manager.poll(&working_dir)?;
        if status.is_running() {
            return Ok(PollStatus::Running);
        }
        if !status.success() {
            debug!(job_id = %job_id, status = ?status, "job failed");
            return Ok(PollStatus::failure());
        }

        let keys = inner.manager.list_working_dir(&working_dir)?;
        Ok(PollStatus::Success { keys })
    }

    /// Contenido del archivo `key` de un job
    ///
    /// Un job desconocido (`NoSuchJob`) y una llave que no resuelve
    /// (`NoSuchKey`) son errores distintos.
    pub fn fetch_result(&self, job_id: &str, key: &str) -> Result<ResultFile, JobError> {
        let path = {
            let inner = self.lock();
            let working_dir = inner.jobs.get(job_id).ok_or(JobError::NoSuchJob)?;
            inner
                .manager
                .lookup_path(working_dir, key)
                .ok_or(JobError::NoSuchKey)?
        };

        // Fuera del lock: un stop() concurrente puede borrar el archivo
        let contents = match fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(JobError::NoSuchKey),
            Err(e) => return Err(e.into()),
        };

        Ok(ResultFile { path, contents })
    }

    /// Monta las rutas del servidor de jobs bajo `base_url`
    ///
    /// - `POST {base}/execute`
    /// - `GET {base}/poll/{job_id}`
    /// - `GET {base}/poll/{job_id}/{key}`
    pub fn register(self: &Arc<Self>, router: &mut Router, base_url: &str) {
        let base = base_url.trim_end_matches('/').to_string();

        let server = Arc::clone(self);
        let mount = base.clone();
        router.register(
            Method::POST,
            &mount_path(&base, "/execute"),
            move |request, _params| handlers::execute(&server, &mount, request),
        );

        let server = Arc::clone(self);
        router.register(
            Method::GET,
            &mount_path(&base, "/poll/{job_id}"),
            move |_request, params| handlers::poll(&server, params),
        );

        let server = Arc::clone(self);
        router.register(
            Method::GET,
            &mount_path(&base, "/poll/{job_id}/{key}"),
            move |_request, params| handlers::fetch_result(&server, params),
        );

        debug!(base_url = %base_url, "job routes registered");
    }

    /// Registra las rutas y, si corresponde, los hooks de ciclo de vida
    pub fn attach(self: &Arc<Self>, server: &mut Server, base_url: &str) {
        self.register(server.router_mut(), base_url);
        if self.hook_start_stop {
            server.add_lifecycle(Arc::clone(self) as Arc<dyn Lifecycle>);
        }
    }
}

impl<K: JobKind> Lifecycle for JobServer<K> {
    fn before_start(&self) -> HookResult {
        self.start()?;
        Ok(())
    }

    fn after_stop(&self) -> HookResult {
        self.stop()?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Duerme `t` segundos y escribe `msg` en `out`; `t=0` falla de inmediato
    struct SleepEcho;

    impl JobKind for SleepEcho {
        fn get_args(
            &self,
            _working_dir: &WorkingDirectory,
            kwargs: &Kwargs,
        ) -> Result<Vec<OsString>, JobError> {
            Ok(vec![
                "/bin/sh".into(),
                "-c".into(),
                r#"if [ "$1" = "0" ]; then exit 1; fi; sleep "$1"; printf '%s' "$2" > out"#.into(),
                "sh".into(),
                kwargs.first("timeout").unwrap_or_default().into(),
                kwargs.first("msg").unwrap_or_default().into(),
            ])
        }

        fn verify_run_kwargs(&self, kwargs: Kwargs) -> Result<Kwargs, JobError> {
            match (kwargs.parse::<f64>("timeout"), kwargs.first("msg")) {
                (Some(_), Some(_)) => Ok(kwargs),
                _ => Err(JobError::validation("missing or invalid arguments")),
            }
        }
    }

    fn started() -> JobServer<SleepEcho> {
        let server = JobServer::new(JobManager::new(SleepEcho));
        server.start().unwrap();
        server
    }

    fn wait_done(server: &JobServer<SleepEcho>, job_id: &str) -> PollStatus {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let status = server.poll(job_id).unwrap();
            if status != PollStatus::Running || Instant::now() > deadline {
                return status;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_submit_and_fetch() {
        let server = started();
        let submission = server
            .submit(Kwargs::new().with("timeout", "0.1").with("msg", "hello"))
            .unwrap();

        assert_eq!(submission.job_id.len(), 32);
        assert!(submission.job_id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(submission.location, format!("/poll/{}", submission.job_id));
        assert_eq!(server.poll(&submission.job_id).unwrap(), PollStatus::Running);

        let status = wait_done(&server, &submission.job_id);
        assert_eq!(
            status,
            PollStatus::Success {
                keys: vec!["out".to_string()]
            }
        );

        let result = server.fetch_result(&submission.job_id, "out").unwrap();
        assert_eq!(result.contents, b"hello");
        assert!(matches!(
            server.fetch_result(&submission.job_id, "../out"),
            Err(JobError::NoSuchKey)
        ));

        server.stop().unwrap();
    }

    #[test]
    fn test_invalid_submission_creates_nothing() {
        let server = started();
        let result = server.submit(Kwargs::new().with("timeout", "xxxx").with("msg", "hi"));

        match result {
            Err(JobError::Validation(message)) => {
                assert_eq!(message, "missing or invalid arguments")
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(server.job_count(), 0);
        assert!(matches!(server.poll("0123456789abcdef"), Err(JobError::NoSuchJob)));
        server.stop().unwrap();
    }

    #[test]
    fn test_failed_job() {
        let server = started();
        let submission = server
            .submit(Kwargs::new().with("timeout", "0").with("msg", "hello"))
            .unwrap();

        assert_eq!(wait_done(&server, &submission.job_id), PollStatus::failure());
        assert!(matches!(
            server.fetch_result(&submission.job_id, "out"),
            Err(JobError::NoSuchKey)
        ));
        server.stop().unwrap();
    }

    #[test]
    fn test_unknown_job_vs_unknown_key() {
        let server = started();
        let submission = server
            .submit(Kwargs::new().with("timeout", "0.01").with("msg", "x"))
            .unwrap();

        assert!(matches!(
            server.fetch_result("nope", "out"),
            Err(JobError::NoSuchJob)
        ));
        assert!(matches!(
            server.fetch_result(&submission.job_id, "missing"),
            Err(JobError::NoSuchKey)
        ));
        server.stop().unwrap();
    }

    #[test]
    fn test_submit_requires_start() {
        let server = JobServer::new(JobManager::new(SleepEcho));
        assert!(matches!(
            server.submit(Kwargs::new().with("timeout", "0.1").with("msg", "x")),
            Err(JobError::NotStarted)
        ));
    }

    #[test]
    fn test_stop_forgets_jobs() {
        let server = started();
        let submission = server
            .submit(Kwargs::new().with("timeout", "0.01").with("msg", "x"))
            .unwrap();
        let working_dir = server.working_dir(&submission.job_id).unwrap();

        server.stop().unwrap();
        assert_eq!(server.job_count(), 0);
        assert!(!working_dir.as_path().exists());
        assert!(matches!(server.poll(&submission.job_id), Err(JobError::NoSuchJob)));
    }

    #[test]
    fn test_failed_stop_keeps_job_ids() {
        let server = started();
        let submission = server
            .submit(Kwargs::new().with("timeout", "0.01").with("msg", "x"))
            .unwrap();
        wait_done(&server, &submission.job_id);

        // Un archivo en lugar de la raíz hace fallar el borrado del pool
        let working_dir = server.working_dir(&submission.job_id).unwrap();
        let root = working_dir.as_path().parent().unwrap().to_path_buf();
        fs::remove_dir_all(&root).unwrap();
        fs::write(&root, b"not a directory").unwrap();

        assert!(server.stop().is_err());
        assert!(server.is_started());
        assert_eq!(server.job_count(), 1);

        server.stop().unwrap();
        assert!(!server.is_started());
        assert_eq!(server.job_count(), 0);
        fs::remove_file(&root).unwrap();
    }

    #[test]
    fn test_job_ids_are_unique() {
        let ids: std::collections::HashSet<String> = (0..100).map(|_| generate_job_id()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_mount_path() {
        assert_eq!(mount_path("", "/execute"), "/execute");
        assert_eq!(mount_path("/", "/execute"), "/execute");
        assert_eq!(mount_path("/api/", "/poll/x"), "/api/poll/x");
    }
}
