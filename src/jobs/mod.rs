//! # Sistema de Jobs
//! src/jobs/mod.rs
//!
//! Ejecuta cada job como un subproceso dentro de su propio directorio de
//! trabajo y expone su estado por polling.
//!
//! ## Endpoints
//!
//! - `POST /execute` - Lanzar job (argumentos en el formulario)
//! - `GET /poll/{job_id}` - Consultar estado (`running`, `success`, `failure`)
//! - `GET /poll/{job_id}/{key}` - Descargar un archivo de resultado
//!
//! ## Capas
//!
//! ```text
//! JobServer (job ids) → JobManager (estado) → WorkingDirectoryPool + ProcessRegistry
//! ```

pub mod command;
pub mod error;
pub mod handlers;
pub mod kind;
pub mod manager;
pub mod pool;
pub mod process;
pub mod server;
pub mod types;

pub use command::CommandJob;
pub use error::JobError;
pub use kind::JobKind;
pub use manager::{JobManager, ManagerState};
pub use pool::WorkingDirectoryPool;
pub use process::ProcessRegistry;
pub use server::{JobServer, ResultFile};
pub use types::{Kwargs, PollStatus, ProcessStatus, Submission, WorkingDirectory, FAILURE_MESSAGE};
