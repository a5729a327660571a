use crate::{LoggerConfig, TokenRedactor};
use std::io::{self, Write};
use std::sync::Arc;
use thiserror::Error;
use tracing_subscriber::fmt::{self, time::ChronoUtc, MakeWriter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Invalid log filter '{directive}': {reason}")]
    InvalidFilter { directive: String, reason: String },

    #[error("Failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Writer that redacts each formatted event before it reaches `inner`.
///
/// The fmt layer renders an event into a buffer and hands it over in a single
/// write, so each call sees a whole line.
pub struct RedactingWriter<W> {
    inner: W,
    redactor: Option<Arc<TokenRedactor>>,
}

impl<W> RedactingWriter<W> {
    pub fn new(inner: W, redactor: Option<Arc<TokenRedactor>>) -> Self {
        Self { inner, redactor }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &self.redactor {
            Some(redactor) => {
                let redacted = redactor.redact(&String::from_utf8_lossy(buf));
                self.inner.write_all(redacted.as_bytes())?;
                Ok(buf.len())
            }
            None => self.inner.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Hands out redacting stderr writers to the fmt layer.
#[derive(Clone, Default)]
pub struct RedactingMakeWriter {
    redactor: Option<Arc<TokenRedactor>>,
}

impl RedactingMakeWriter {
    pub fn new(redaction_enabled: bool) -> Self {
        Self {
            redactor: redaction_enabled.then(|| Arc::new(TokenRedactor::default())),
        }
    }
}

impl<'a> MakeWriter<'a> for RedactingMakeWriter {
    type Writer = RedactingWriter<io::Stderr>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new(io::stderr(), self.redactor.clone())
    }
}

/// Install the global subscriber. `RUST_LOG` overrides `config.log_level`.
pub fn init_tracing(config: &LoggerConfig) -> Result<(), LoggerError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| LoggerError::InvalidFilter {
            directive: config.log_level.clone(),
            reason: e.to_string(),
        })?,
    };

    let writer = RedactingMakeWriter::new(config.redaction_enabled);

    if config.json {
        // Structured JSON logging for scheduled invocations
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .with_writer(writer)
                    .json(),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .with_writer(writer),
            )
            .try_init()
    }
    .map_err(|e| LoggerError::Init(e.to_string()))
}
