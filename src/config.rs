//! # Configuración del Servidor
//! src/config.rs
//!
//! Configuración del servidor de jobs con soporte para argumentos CLI y
//! variables de entorno.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./job_server --port 8080 \
//!   --program /bin/sh \
//!   --arg -c --arg 'sleep "$0"; printf %s "$1" > out' \
//!   --arg {timeout} --arg {msg} \
//!   --field timeout --field msg
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! JOB_SERVER_PORT=9000 JOB_SERVER_PROGRAM=/usr/bin/env ./job_server
//! ```

use crate::jobs::command::{placeholders, WORKING_DIR_PLACEHOLDER};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// Configuración del servidor de jobs
#[derive(Debug, Clone, Parser)]
#[command(name = "job_server")]
#[command(about = "Servidor HTTP que ejecuta jobs en directorios de trabajo aislados")]
#[command(version = "0.1.0")]
pub struct Config {
    /// Puerto en el que escucha el servidor
    #[arg(short, long, default_value = "8080", env = "JOB_SERVER_PORT")]
    pub port: u16,

    /// Host/IP en el que escucha
    #[arg(long, default_value = "127.0.0.1", env = "JOB_SERVER_HOST")]
    pub host: String,

    /// Prefijo de las rutas (`/execute`, `/poll/...`)
    #[arg(long = "base-url", default_value = "/", env = "JOB_SERVER_BASE_URL")]
    pub base_url: String,

    /// Directorio padre de la raíz de directorios de trabajo (default: temp del sistema)
    #[arg(long = "temp-root", env = "JOB_SERVER_TEMP_ROOT")]
    pub temp_root: Option<PathBuf>,

    // === Job ===
    /// Programa que se ejecuta por cada job
    #[arg(long, env = "JOB_SERVER_PROGRAM")]
    pub program: String,

    /// Plantilla de argumento; admite `{working_dir}` y `{campo}` (repetible)
    #[arg(
        long = "arg",
        value_name = "TEMPLATE",
        allow_hyphen_values = true,
        value_delimiter = ',',
        env = "JOB_SERVER_ARGS"
    )]
    pub args: Vec<String>,

    /// Campo de formulario obligatorio en cada submit (repetible)
    #[arg(
        long = "field",
        value_name = "NAME",
        value_delimiter = ',',
        env = "JOB_SERVER_FIELDS"
    )]
    pub fields: Vec<String>,

    // === Apagado ===
    /// Cuánto esperar a un job que sigue corriendo al apagar (ms)
    #[arg(
        long = "shutdown-grace-ms",
        default_value = "0",
        env = "JOB_SERVER_SHUTDOWN_GRACE_MS"
    )]
    pub shutdown_grace_ms: u64,

    /// Matar los jobs que siguen corriendo después del periodo de gracia
    #[arg(long = "kill-orphans", env = "JOB_SERVER_KILL_ORPHANS")]
    pub kill_orphans: bool,

    // === HTTP ===
    /// Tamaño máximo de un request (headers + body) en bytes
    #[arg(
        long = "max-request-bytes",
        default_value = "65536",
        env = "JOB_SERVER_MAX_REQUEST_BYTES"
    )]
    pub max_request_bytes: usize,

    /// Filtro de logs si `RUST_LOG` no está definido
    #[arg(long = "log-level", default_value = "info", env = "JOB_SERVER_LOG")]
    pub log_level: String,
}

impl Config {
    /// Crea una nueva configuración parseando argumentos CLI
    pub fn new() -> Self {
        Config::parse()
    }

    /// Obtiene la dirección completa para bind (host:port)
    ///
    /// # Ejemplo
    /// ```rust
    /// use job_server::config::Config;
    ///
    /// let config = Config::default();
    /// assert_eq!(config.address(), "127.0.0.1:8080");
    /// ```
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Valida la configuración
    ///
    /// Retorna errores si hay valores inválidos
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port must be >= 1".to_string());
        }
        if self.program.trim().is_empty() {
            return Err("Program must not be empty".to_string());
        }
        if !self.base_url.starts_with('/') {
            return Err(format!("Base URL must start with '/': {}", self.base_url));
        }
        if self.max_request_bytes == 0 {
            return Err("Max request bytes must be > 0".to_string());
        }

        for field in &self.fields {
            if field == WORKING_DIR_PLACEHOLDER {
                return Err(format!("Field name '{}' is reserved", field));
            }
        }

        // Cada placeholder debe ser working_dir o un campo declarado
        for template in &self.args {
            for name in placeholders(template) {
                if name != WORKING_DIR_PLACEHOLDER && !self.fields.iter().any(|f| f == name) {
                    return Err(format!(
                        "Argument template '{}' uses undeclared field '{}'",
                        template, name
                    ));
                }
            }
        }

        Ok(())
    }

    /// Escribe un resumen de la configuración en el log
    pub fn log_summary(&self) {
        info!(
            address = %self.address(),
            base_url = %self.base_url,
            temp_root = ?self.temp_root,
            "server configuration"
        );
        info!(
            program = %self.program,
            args = ?self.args,
            fields = ?self.fields,
            "job configuration"
        );
        info!(
            shutdown_grace_ms = self.shutdown_grace_ms,
            kill_orphans = self.kill_orphans,
            max_request_bytes = self.max_request_bytes,
            "limits"
        );
    }
}

impl Default for Config {
    /// Configuración por defecto (sin programa: no pasa `validate()`)
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            base_url: "/".to_string(),
            temp_root: None,
            program: String::new(),
            args: Vec::new(),
            fields: Vec::new(),
            shutdown_grace_ms: 0,
            kill_orphans: false,
            max_request_bytes: 65_536,
            log_level: "info".to_string(),
        }
    }
}
