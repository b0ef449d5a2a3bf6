//! # Job Server - Entry Point
//! src/main.rs
//!
//! Lee la configuración, monta el JobServer en el router y atiende hasta
//! recibir Ctrl+C. Al salir se borra el directorio raíz de los jobs.

use anyhow::{anyhow, Context};
use job_server::config::Config;
use job_server::jobs::{CommandJob, JobManager, JobServer, WorkingDirectoryPool};
use job_server::logging;
use job_server::router::Router;
use job_server::server::Server;
use std::sync::Arc;
use tracing::info;

fn main() -> anyhow::Result<()> {
    let config = Config::new();
    logging::init(&config.log_level)?;
    config
        .validate()
        .map_err(|e| anyhow!("invalid configuration: {e}"))?;
    config.log_summary();

    let pool = match &config.temp_root {
        Some(parent) => WorkingDirectoryPool::in_dir(parent),
        None => WorkingDirectoryPool::new(),
    };
    let manager = JobManager::with_pool(CommandJob::from_config(&config), pool);
    let jobs = Arc::new(JobServer::new(manager));

    let mut server = Server::new(Router::new()).with_max_request_bytes(config.max_request_bytes);
    jobs.attach(&mut server, &config.base_url);

    let address = server
        .bind(config.address())
        .with_context(|| format!("could not bind {}", config.address()))?;
    info!(%address, "job server listening");

    let stop = server.stop_handle();
    ctrlc::set_handler(move || stop.stop()).context("could not install Ctrl+C handler")?;

    server.run()?;
    info!("job server stopped");
    Ok(())
}
