//! Log initialization and setup

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::future_not_send,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

pub mod cli;
pub mod config;

pub use config::*;

use std::{
    cmp::min,
    io::{self, Write},
};
use thiserror::Error;
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    filter::ParseError,
    fmt::{self, MakeWriter, writer::BoxMakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
};

/// Maximum length of a log line.
/// Space for a final trailing newline if truncated.
///
/// Docker chunks log messages at 16KB and not every log driver recombines
/// them, so lines are truncated right below that.
const MAX_LINE_LENGTH: usize = 16 * 1024 - 1;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid log filter '{filter}': {source}")]
    InvalidLogFilter {
        filter: String,
        #[source]
        source: ParseError,
    },

    #[error("Cannot set global tracing subscriber")]
    SetGlobalDefaultError(#[from] tracing::dispatcher::SetGlobalDefaultError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Builder for the log layer.
#[derive(Debug)]
pub struct Builder {
    log_format: LogFormat,
    log_filter: Option<String>,
    // used when log_filter is none.
    default_log_filter: String,
    make_writer: BoxMakeWriter,
    with_ansi: bool,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Full,
            log_filter: None,
            default_log_filter: Self::DEFAULT_LOG_FILTER.to_string(),
            make_writer: make_writer(io::stderr),
            with_ansi: true,
        }
    }
}

impl Builder {
    pub const DEFAULT_LOG_FILTER: &'static str = "info";

    pub fn new() -> Self {
        Self::default()
    }

    /// Set log_filter using a simple numeric "verbosity level".
    ///
    /// 0 means, keep existing `log_filter` value.
    pub fn with_log_verbose_count(self, log_verbose_count: u8) -> Self {
        let log_filter = match log_verbose_count {
            0 => self.log_filter,
            1 => Some("info".to_string()),
            2 => Some("debug,hyper=info,reqwest=info,h2=info".to_string()),
            _ => Some("trace,hyper=info,reqwest=info,h2=info".to_string()),
        };
        Self { log_filter, ..self }
    }

    pub fn with_log_filter(self, log_filter: &Option<String>) -> Self {
        Self {
            log_filter: log_filter.clone(),
            ..self
        }
    }

    pub fn with_default_log_filter(self, default_log_filter: impl Into<String>) -> Self {
        Self {
            default_log_filter: default_log_filter.into(),
            ..self
        }
    }

    pub fn with_log_format(self, log_format: LogFormat) -> Self {
        Self { log_format, ..self }
    }

    pub fn with_log_destination(self, log_destination: LogDestination) -> Self {
        let make_writer = match log_destination {
            LogDestination::Stdout => make_writer(io::stdout),
            LogDestination::Stderr => make_writer(io::stderr),
        };
        Self {
            make_writer,
            ..self
        }
    }

    /// Routes log output to an arbitrary writer, bypassing line truncation.
    pub fn with_writer<M>(self, make_writer: M) -> Self
    where
        M: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        Self {
            make_writer: BoxMakeWriter::new(make_writer),
            ..self
        }
    }

    /// Enable/disable ANSI encoding for formatted events (i.e. colors).
    pub fn with_ansi(self, with_ansi: bool) -> Self {
        Self { with_ansi, ..self }
    }

    /// Build the filtered log layer.
    pub fn build<S>(self) -> Result<Box<dyn Layer<S> + Send + Sync + 'static>>
    where
        S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    {
        let filter = self.log_filter.unwrap_or(self.default_log_filter);
        let log_filter = EnvFilter::try_new(&filter)
            .map_err(|source| Error::InvalidLogFilter { filter, source })?;

        let layer = match self.log_format {
            LogFormat::Full => fmt::layer()
                .with_writer(self.make_writer)
                .with_ansi(self.with_ansi)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .pretty()
                .with_writer(self.make_writer)
                .with_ansi(self.with_ansi)
                .boxed(),
            LogFormat::Json => fmt::layer()
                .json()
                .with_writer(self.make_writer)
                .with_ansi(false)
                .boxed(),
        };

        Ok(layer.with_filter(log_filter).boxed())
    }

    /// Build the log layer and install it as the global default subscriber.
    pub fn install_global(self) -> Result<()> {
        let subscriber = Registry::default().with(self.build::<Registry>()?);
        tracing::subscriber::set_global_default(subscriber)?;
        Ok(())
    }
}

fn make_writer<W>(m: fn() -> W) -> BoxMakeWriter
where
    W: Write + 'static,
{
    BoxMakeWriter::new(move || {
        io::LineWriter::with_capacity(MAX_LINE_LENGTH, LimitedWriter(MAX_LINE_LENGTH, m()))
    })
}

struct LimitedWriter<W: Write>(usize, W);

impl<W: Write> Write for LimitedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let truncated = &buf[..min(self.0, buf.len())];
        let had_trailing_newline = buf[buf.len() - 1] == b'\n';
        if had_trailing_newline && (truncated[truncated.len() - 1] != b'\n') {
            // keep the line terminated, still in a single write
            let mut tmp = truncated.to_vec();
            tmp.push(b'\n');
            self.1.write_all(&tmp).map(|_| buf.len())
        } else {
            self.1.write_all(truncated).map(|_| buf.len())
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.1.flush()
    }
}
