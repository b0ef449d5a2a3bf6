//! # Handlers HTTP para Jobs
//! src/jobs/handlers.rs
//!
//! Endpoints del servidor de jobs:
//! - `POST /execute` (form-urlencoded) → 201 + `Location`
//! - `GET /poll/{job_id}` → estado del job
//! - `GET /poll/{job_id}/{key}` → contenido crudo de un archivo de resultado

use crate::http::{Request, Response, StatusCode};
use crate::jobs::error::JobError;
use crate::jobs::kind::JobKind;
use crate::jobs::server::{mount_path, JobServer};
use crate::jobs::types::{Kwargs, PollStatus};
use crate::router::Params;
use serde_json::json;
use std::path::Path;
use tracing::error;

/// Mensaje 404 para un job id desconocido
pub const NO_SUCH_JOB: &str = "no such job_id";

/// Mensaje 404 para una llave que no resuelve dentro del job
pub const NO_SUCH_KEY: &str = "no such key for job";

/// Respuesta para errores que no son del cliente
fn internal_error(err: &JobError) -> Response {
    match err {
        JobError::NotStarted => Response::error(StatusCode::ServiceUnavailable, &err.to_string()),
        _ => {
            error!(error = %err, "job request failed");
            Response::error(StatusCode::InternalServerError, "internal server error")
        }
    }
}

/// Handler para `POST /execute`
///
/// Los campos del formulario son los argumentos del job; los repetidos se
/// acumulan.
///
/// # Ejemplo de response
/// ```json
/// {"status": "created", "location": "/poll/5d0c...e1"}
/// ```
pub fn execute<K: JobKind>(server: &JobServer<K>, base_url: &str, req: &Request) -> Response {
    let kwargs: Kwargs = req.form_pairs().into_iter().collect();

    match server.submit(kwargs) {
        Ok(submission) => {
            let location = mount_path(base_url, &submission.location);
            Response::json(
                StatusCode::Created,
                &json!({ "status": "created", "location": location }),
            )
            .with_header("Location", &location)
        }
        Err(JobError::Validation(message)) => Response::error(StatusCode::BadRequest, &message),
        Err(e) => internal_error(&e),
    }
}

/// Handler para `GET /poll/{job_id}`
///
/// Un job fallido responde 400 con `{"status": "failure", "error": ...}`.
pub fn poll<K: JobKind>(server: &JobServer<K>, params: &Params) -> Response {
    let job_id = params.get("job_id").unwrap_or_default();

    match server.poll(job_id) {
        Ok(status @ PollStatus::Failure { .. }) => Response::json(StatusCode::BadRequest, &status),
        Ok(status) => Response::json(StatusCode::Ok, &status),
        Err(JobError::NoSuchJob) => Response::error(StatusCode::NotFound, NO_SUCH_JOB),
        Err(e) => internal_error(&e),
    }
}

/// Handler para `GET /poll/{job_id}/{key}`
pub fn fetch_result<K: JobKind>(server: &JobServer<K>, params: &Params) -> Response {
    let job_id = params.get("job_id").unwrap_or_default();
    let key = params.get("key").unwrap_or_default();

    match server.fetch_result(job_id, key) {
        Ok(result) => Response::new(StatusCode::Ok)
            .with_header("Content-Type", content_type(&result.path))
            .with_body_bytes(result.contents),
        Err(JobError::NoSuchJob) => Response::error(StatusCode::NotFound, NO_SUCH_JOB),
        Err(JobError::NoSuchKey) => Response::error(StatusCode::NotFound, NO_SUCH_KEY),
        Err(e) => internal_error(&e),
    }
}

/// Content type según la extensión del archivo
pub fn content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("txt") | Some("log") => "text/plain; charset=utf-8",
        Some("csv") => "text/csv",
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("gz") => "application/gzip",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type() {
        assert_eq!(content_type(Path::new("/tmp/x/report.PDF")), "application/pdf");
        assert_eq!(content_type(Path::new("data.json")), "application/json");
        assert_eq!(content_type(Path::new("out")), "application/octet-stream");
        assert_eq!(content_type(Path::new("notes.txt")), "text/plain; charset=utf-8");
    }

    #[test]
    fn test_internal_error_mapping() {
        assert_eq!(
            internal_error(&JobError::NotStarted).status(),
            StatusCode::ServiceUnavailable
        );
        assert_eq!(
            internal_error(&JobError::EmptyArgs).status(),
            StatusCode::InternalServerError
        );
    }
}
