use anyhow::Context;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::Dispatch;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Filter directives used when `RUST_LOG` is not set.
    pub filter: String,
    /// Forces debug output regardless of `filter` and `RUST_LOG`.
    pub verbose: bool,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            verbose: false,
            file: None,
        }
    }
}

/// Logging for one batch run.
///
/// The subscriber is never installed globally; [`crate::core::Pipeline::run_batch`]
/// attaches it to the batch future, so it lives exactly as long as the caller keeps it.
#[derive(Clone)]
pub struct LoggingContext {
    dispatch: Dispatch,
}

impl LoggingContext {
    pub fn new(settings: &LogSettings) -> anyhow::Result<Self> {
        let filter = if settings.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.filter))
        };

        let writer = match &settings.file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("Failed to open log file {}", path.display()))?;
                BoxMakeWriter::new(Mutex::new(file))
            }
            None => BoxMakeWriter::new(std::io::stderr),
        };

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(settings.file.is_none())
            .with_target(false)
            .finish();

        Ok(Self {
            dispatch: Dispatch::new(subscriber),
        })
    }

    /// A context that discards every event.
    pub fn disabled() -> Self {
        Self {
            dispatch: Dispatch::none(),
        }
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }
}
