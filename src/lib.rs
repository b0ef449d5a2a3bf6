//! # Job Server
//! src/lib.rs
//!
//! Servidor HTTP/1.0 que ejecuta jobs como subprocesos, cada uno en un
//! directorio de trabajo aislado, y permite consultar su estado y descargar
//! sus archivos de resultado.
//!
//! ## Arquitectura
//!
//! - `http`: Parsing y manejo del protocolo HTTP/1.0
//! - `router`: Enrutamiento por método y patrón de path
//! - `server`: Servidor TCP, un thread por conexión, con hooks de ciclo de vida
//! - `jobs`: Pool de directorios, registro de subprocesos, manager y JobServer
//! - `config`: Configuración CLI/env
//! - `logging`: Inicialización de `tracing`
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use job_server::jobs::{CommandJob, JobManager, JobServer};
//! use job_server::router::Router;
//! use job_server::server::Server;
//! use std::sync::Arc;
//!
//! let job = CommandJob::new("/bin/sh").with_args(["-c".to_string(), "echo {msg} > out".to_string()])
//!     .with_fields(["msg".to_string()]);
//! let jobs = Arc::new(JobServer::new(JobManager::new(job)));
//!
//! let mut server = Server::new(Router::new());
//! jobs.attach(&mut server, "/");
//! server.bind("127.0.0.1:8080").unwrap();
//! server.run().unwrap();
//! ```

pub mod config;
pub mod http;
pub mod jobs;
pub mod logging;
pub mod router;
pub mod server;
