//! # CommandJob
//! src/jobs/command.rs
//!
//! Tipo de job configurable desde la línea de comandos: un programa fijo y
//! una lista de plantillas de argumentos.
//!
//! ```text
//! --program /usr/bin/convert --arg {input} --arg {working_dir}/out.png --field input
//! ```
//!
//! Las plantillas admiten `{working_dir}` y `{campo}` para cualquier campo
//! declarado. Un campo con varios valores se une con `\n`.

use crate::config::Config;
use crate::jobs::error::JobError;
use crate::jobs::kind::JobKind;
use crate::jobs::types::{Kwargs, WorkingDirectory};
use std::ffi::OsString;
use std::process::Child;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Placeholder reservado para el directorio del job
pub const WORKING_DIR_PLACEHOLDER: &str = "working_dir";

/// Mensaje de validación que ve el cliente
pub const INVALID_ARGUMENTS: &str = "missing or invalid arguments";

/// Intervalo entre consultas al esperar un proceso huérfano
const CLEANUP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Job que ejecuta un programa externo con argumentos derivados del formulario
#[derive(Debug, Clone)]
pub struct CommandJob {
    program: String,
    args: Vec<String>,
    fields: Vec<String>,

    /// Cuánto esperar a un huérfano al apagar
    grace: Duration,

    /// Matar al huérfano si sigue vivo después de `grace`
    kill_orphans: bool,
}

impl CommandJob {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            fields: Vec::new(),
            grace: Duration::ZERO,
            kill_orphans: false,
        }
    }

    /// Construye el job a partir de la configuración del binario
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.program.clone())
            .with_args(config.args.iter().cloned())
            .with_fields(config.fields.iter().cloned())
            .with_grace(Duration::from_millis(config.shutdown_grace_ms))
            .with_kill_orphans(config.kill_orphans)
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn with_fields(mut self, fields: impl IntoIterator<Item = String>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_kill_orphans(mut self, kill_orphans: bool) -> Self {
        self.kill_orphans = kill_orphans;
        self
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

/// Nombres de los placeholders `{nombre}` de una plantilla, en orden
///
/// # Ejemplo
/// ```
/// use job_server::jobs::command::placeholders;
///
/// assert_eq!(placeholders("{working_dir}/{name}.txt"), vec!["working_dir", "name"]);
/// assert!(placeholders("{not a placeholder}").is_empty());
/// ```
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_placeholder_name(&after[..close]) => {
                names.push(&after[..close]);
                rest = &after[close + 1..];
            }
            _ => rest = after,
        }
    }

    names
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Sustituye los placeholders de `template`
///
/// `lookup` retorna None para un placeholder sin valor.
fn render<'a>(
    template: &str,
    lookup: impl Fn(&str) -> Option<std::borrow::Cow<'a, str>>,
) -> Option<String> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_placeholder_name(&after[..close]) => {
                output.push_str(&lookup(&after[..close])?);
                rest = &after[close + 1..];
            }
            _ => {
                output.push('{');
                rest = after;
            }
        }
    }
    output.push_str(rest);

    Some(output)
}

impl JobKind for CommandJob {
    fn get_args(
        &self,
        working_dir: &WorkingDirectory,
        kwargs: &Kwargs,
    ) -> Result<Vec<OsString>, JobError> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(OsString::from(&self.program));

        for template in &self.args {
            let arg = render(template, |name| {
                if name == WORKING_DIR_PLACEHOLDER {
                    Some(working_dir.as_path().to_string_lossy())
                } else {
                    kwargs.joined(name, "\n").map(Into::into)
                }
            })
            .ok_or_else(|| JobError::validation(INVALID_ARGUMENTS))?;
            argv.push(OsString::from(arg));
        }

        Ok(argv)
    }

    /// Exige cada campo declarado con al menos un valor no vacío
    ///
    /// Los campos no declarados se descartan; los repetidos se unen con `\n`.
    fn verify_run_kwargs(&self, kwargs: Kwargs) -> Result<Kwargs, JobError> {
        let mut verified = Kwargs::new();

        for field in &self.fields {
            let values = kwargs
                .get_all(field)
                .filter(|values| values.iter().any(|value| !value.is_empty()))
                .ok_or_else(|| JobError::validation(INVALID_ARGUMENTS))?;
            verified.set(field.as_str(), values.join("\n"));
        }

        Ok(verified)
    }

    /// Espera hasta `grace` a que el proceso termine; luego lo mata si se pidió
    fn cleanup_subprocess(&self, working_dir: &WorkingDirectory, child: &mut Child) {
        let pid = child.id();
        let deadline = Instant::now() + self.grace;

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    info!(pid, code = ?status.code(), "orphaned subprocess finished during grace period");
                    return;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(CLEANUP_POLL_INTERVAL),
                Ok(None) => break,
                Err(e) => {
                    warn!(pid, error = %e, "could not wait for orphaned subprocess");
                    return;
                }
            }
        }

        if !self.kill_orphans {
            warn!(pid, working_dir = %working_dir, "abandoning orphaned subprocess");
            return;
        }

        match child.kill().and_then(|()| child.wait()) {
            Ok(_) => info!(pid, "orphaned subprocess killed"),
            Err(e) => warn!(pid, error = %e, "could not kill orphaned subprocess"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn working_dir(path: &str) -> WorkingDirectory {
        WorkingDirectory::new(path.into())
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders("plain"), Vec::<&str>::new());
        assert_eq!(placeholders("{a}{b}-{c_1}"), vec!["a", "b", "c_1"]);
        assert_eq!(placeholders("{{a}}"), vec!["a"]);
        assert_eq!(placeholders("{open"), Vec::<&str>::new());
    }

    #[test]
    fn test_get_args_substitutes() {
        let job = CommandJob::new("/usr/bin/tool")
            .with_args(["--out={working_dir}/out".to_string(), "{msg}".to_string()])
            .with_fields(["msg".to_string()]);
        let kwargs = Kwargs::new().with("msg", "a").with("msg", "b");

        let argv = job.get_args(&working_dir("/tmp/wd-1"), &kwargs).unwrap();
        assert_eq!(
            argv,
            vec![
                OsString::from("/usr/bin/tool"),
                OsString::from("--out=/tmp/wd-1/out"),
                OsString::from("a\nb"),
            ]
        );
    }

    #[test]
    fn test_get_args_keeps_literal_braces() {
        let job = CommandJob::new("awk").with_args(["{ print $1 }".to_string()]);
        let argv = job.get_args(&working_dir("/tmp"), &Kwargs::new()).unwrap();
        assert_eq!(argv[1], OsString::from("{ print $1 }"));
    }

    #[test]
    fn test_get_args_missing_value() {
        let job = CommandJob::new("tool").with_args(["{msg}".to_string()]);
        let result = job.get_args(&working_dir("/tmp"), &Kwargs::new());
        assert!(matches!(result, Err(JobError::Validation(_))));
    }

    #[test]
    fn test_verify_requires_fields() {
        let job = CommandJob::new("tool").with_fields(["msg".to_string(), "timeout".to_string()]);

        let err = job
            .verify_run_kwargs(Kwargs::new().with("msg", "hello"))
            .unwrap_err();
        assert_eq!(err.to_string(), INVALID_ARGUMENTS);

        let err = job
            .verify_run_kwargs(Kwargs::new().with("msg", "").with("timeout", "1"))
            .unwrap_err();
        assert!(matches!(err, JobError::Validation(_)));
    }

    #[test]
    fn test_verify_normalizes() {
        let job = CommandJob::new("tool").with_fields(["msg".to_string()]);
        let kwargs = Kwargs::new()
            .with("msg", "one")
            .with("msg", "two")
            .with("extra", "dropped");

        let verified = job.verify_run_kwargs(kwargs).unwrap();
        assert_eq!(verified.first("msg"), Some("one\ntwo"));
        assert!(!verified.contains_key("extra"));
    }

    #[cfg(unix)]
    #[test]
    fn test_cleanup_kills_after_grace() {
        use std::process::Command;

        let job = CommandJob::new("sh")
            .with_grace(Duration::from_millis(200))
            .with_kill_orphans(true);
        let mut child = Command::new("/bin/sh").args(["-c", "sleep 5"]).spawn().unwrap();

        let start = Instant::now();
        job.cleanup_subprocess(&working_dir("/tmp"), &mut child);

        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(start.elapsed() < Duration::from_secs(4));
        assert!(child.try_wait().unwrap().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_cleanup_waits_for_quick_exit() {
        use std::process::Command;

        let job = CommandJob::new("sh").with_grace(Duration::from_secs(3));
        let mut child = Command::new("/bin/sh").args(["-c", "sleep 0.1"]).spawn().unwrap();

        let start = Instant::now();
        job.cleanup_subprocess(&working_dir("/tmp"), &mut child);

        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(child.try_wait().unwrap().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_cleanup_abandons_without_kill() {
        use std::process::Command;

        let job = CommandJob::new("sh");
        let mut child = Command::new("/bin/sh").args(["-c", "sleep 1"]).spawn().unwrap();

        job.cleanup_subprocess(&working_dir("/tmp"), &mut child);
        assert!(child.try_wait().unwrap().is_none());

        let _ = child.kill();
        let _ = child.wait();
    }
}
