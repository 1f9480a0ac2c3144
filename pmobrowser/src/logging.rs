use std::env;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

/// Variable d'environnement désignant le fichier de logs.
pub const ENV_LOG_FILE: &str = "PMOBROWSER_LOG_FILE";

/// Log file to use: the command line, then `PMOBROWSER_LOG_FILE`, then the configuration.
pub fn resolve_log_file(cli: Option<String>, configured: Option<String>) -> Option<String> {
    cli.or_else(|| env::var(ENV_LOG_FILE).ok().filter(|p| !p.is_empty()))
        .or(configured)
}

/// Installs the global subscriber.
///
/// The filter comes from `RUST_LOG`, else from `default_level`. Logs are
/// appended to `log_file`, stderr is used only when there is none or it
/// cannot be opened.
pub fn init_tracing(default_level: &str, log_file: Option<&str>) {
    let _ = tracing_log::LogTracer::init();
    let writer = log_writer(log_file);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level.to_ascii_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
}

fn log_writer(log_file: Option<&str>) -> BoxMakeWriter {
    if let Some(path) = log_file {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                let shared = SharedLogWriter::new(file);
                return BoxMakeWriter::new(move || shared.clone());
            }
            Err(err) => {
                eprintln!("Impossible d'ouvrir {path} pour les logs tracing: {err}. Retour à stderr");
            }
        }
    }
    BoxMakeWriter::new(io::stderr)
}

#[derive(Clone)]
struct SharedLogWriter {
    inner: Arc<Mutex<File>>,
}

impl SharedLogWriter {
    fn new(file: File) -> Self {
        Self {
            inner: Arc::new(Mutex::new(file)),
        }
    }
}

impl Write for SharedLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| io::Error::other(err.to_string()))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| io::Error::other(err.to_string()))?;
        guard.flush()
    }
}
