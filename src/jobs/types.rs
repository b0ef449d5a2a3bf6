//! # Tipos y Estructuras para el Sistema de Jobs
//! src/jobs/types.rs
//!
//! Define los tipos fundamentales compartidos por el pool de directorios,
//! el registro de procesos, el manager y el JobServer.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Handle opaco de un directorio de trabajo aislado
///
/// Solo el `WorkingDirectoryPool` crea valores de este tipo; sirve como
/// llave de correlación entre el job y su subproceso.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkingDirectory(PathBuf);

impl WorkingDirectory {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self(path)
    }

    /// Ruta absoluta del directorio
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for WorkingDirectory {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for WorkingDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Argumentos de un job tal como llegan del cliente
///
/// Igual que un formulario, cada campo puede repetirse y acumula una lista
/// de valores en orden de llegada.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Kwargs {
    fields: BTreeMap<String, Vec<String>>,
}

impl Kwargs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un valor (versión builder)
    ///
    /// # Ejemplo
    /// ```
    /// use job_server::jobs::Kwargs;
    ///
    /// let kwargs = Kwargs::new().with("msg", "hello").with("timeout", "0.1");
    /// assert_eq!(kwargs.first("msg"), Some("hello"));
    /// ```
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    /// Agrega un valor al final de la lista del campo
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.entry(key.into()).or_default().push(value.into());
    }

    /// Reemplaza todos los valores de un campo por uno solo
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), vec![value.into()]);
    }

    /// Todos los valores de un campo
    pub fn get_all(&self, key: &str) -> Option<&[String]> {
        self.fields.get(key).map(|values| values.as_slice())
    }

    /// Primer valor de un campo
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get_all(key)
            .and_then(|values| values.first())
            .map(|s| s.as_str())
    }

    /// Valores de un campo unidos con `sep`
    pub fn joined(&self, key: &str, sep: &str) -> Option<String> {
        self.get_all(key).map(|values| values.join(sep))
    }

    /// Parsea el primer valor de un campo
    pub fn parse<T: FromStr>(&self, key: &str) -> Option<T> {
        self.first(key).and_then(|value| value.trim().parse().ok())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Kwargs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut kwargs = Kwargs::new();
        for (key, value) in iter {
            kwargs.push(key, value);
        }
        kwargs
    }
}

/// Estado de un subproceso según un poll no bloqueante
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// El proceso sigue corriendo
    Running,

    /// El proceso terminó; `code` es `None` si lo mató una señal
    Exited { code: Option<i32> },
}

impl ProcessStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessStatus::Running)
    }

    /// Terminó con código 0
    pub fn success(&self) -> bool {
        matches!(self, ProcessStatus::Exited { code: Some(0) })
    }
}

/// Mensaje genérico que ve el cliente cuando el job falla
pub const FAILURE_MESSAGE: &str = "job execution terminated with an error";

/// Estado de un job tal como lo expone `/poll/{job_id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PollStatus {
    Running,
    Success { keys: Vec<String> },
    Failure { error: String },
}

impl PollStatus {
    pub fn failure() -> Self {
        PollStatus::Failure {
            error: FAILURE_MESSAGE.to_string(),
        }
    }
}

/// Resultado de un submit exitoso
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// ID opaco del job (128 bits en hex)
    pub job_id: String,

    /// URL de polling (`{base}/poll/{job_id}`)
    pub location: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kwargs_accumulates_repeated_fields() {
        let kwargs: Kwargs = vec![("msg", "a"), ("msg", "b"), ("timeout", "1")]
            .into_iter()
            .collect();

        assert_eq!(kwargs.len(), 2);
        assert_eq!(kwargs.first("msg"), Some("a"));
        assert_eq!(kwargs.joined("msg", "\n"), Some("a\nb".to_string()));
        assert_eq!(kwargs.parse::<f64>("timeout"), Some(1.0));
    }

    #[test]
    fn test_kwargs_parse_invalid() {
        let kwargs = Kwargs::new().with("timeout", "xxxx");
        assert_eq!(kwargs.parse::<f64>("timeout"), None);
        assert_eq!(kwargs.parse::<f64>("missing"), None);
    }

    #[test]
    fn test_kwargs_set_replaces() {
        let mut kwargs = Kwargs::new().with("msg", "a").with("msg", "b");
        kwargs.set("msg", "c");
        assert_eq!(kwargs.get_all("msg"), Some(&["c".to_string()][..]));
    }

    #[test]
    fn test_process_status() {
        assert!(ProcessStatus::Running.is_running());
        assert!(ProcessStatus::Exited { code: Some(0) }.success());
        assert!(!ProcessStatus::Exited { code: Some(1) }.success());
        assert!(!ProcessStatus::Exited { code: None }.success());
    }

    #[test]
    fn test_poll_status_serialization() {
        let running = serde_json::to_string(&PollStatus::Running).unwrap();
        assert_eq!(running, r#"{"status":"running"}"#);

        let success = PollStatus::Success {
            keys: vec!["out".to_string()],
        };
        assert_eq!(
            serde_json::to_string(&success).unwrap(),
            r#"{"status":"success","keys":["out"]}"#
        );

        let failure = serde_json::to_value(PollStatus::failure()).unwrap();
        assert_eq!(failure["status"], "failure");
        assert_eq!(failure["error"], FAILURE_MESSAGE);
    }
}
