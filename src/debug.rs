//! Logging and tracing setup.
//!
//! Traces are split across two sinks: a compact, human-readable view of
//! INFO-and-above events to stderr, and a full JSON record of every span and
//! event, rotated daily, under the configured log root. The file sink is the
//! one worth reading when diagnosing a cycle after the fact; the stderr sink
//! is for watching a foreground run.

use std::path::{Path, PathBuf};

use derive_more::{AsRef, From, Into};
use derive_new::new;
use error_stack::{report, Report, ResultExt};
use getset::{CopyGetters, Getters};
use rolling_file::{BasicRollingFileAppender, RollingConditionBasic};
use tracing::{info, Metadata};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter, fmt::format::FmtSpan, layer::Context, prelude::*, Layer, Registry,
};

use crate::ext::{
    error_stack::{DescribeContext, ErrorHelper, IntoContext},
    result::WrapErr,
};

/// Errors that are possibly surfaced when setting up tracing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The trace sink is a global singleton; a second attempt to initialize it
    /// is a program logic error, not something users can fix.
    #[error("trace sink was configured again after being configured once")]
    TraceSinkReconfigured,

    /// The rolling file appender could not be constructed.
    #[error("failed to configure tracing output location")]
    TraceConfig,

    /// The configured log root doesn't exist and couldn't be created.
    #[error("failed to create tracing output location")]
    EnsureTraceRoot,
}

/// Errors raised validating observability config values.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Retentions must be above a minimum value.
    #[error("retention value is too small")]
    RetentionBelowMinimum,
}

/// Validated config values for observability.
#[derive(Debug, Clone, PartialEq, Eq, Getters, new)]
#[getset(get = "pub")]
pub struct Config {
    /// The location into which log files are written.
    location: Root,

    /// The configured retention settings.
    retention: Retention,
}

impl Config {
    /// Initialize the tracing sinks.
    ///
    /// Until this method is run, traces are not output anywhere and are lost forever;
    /// run it as soon as possible.
    #[must_use = "This guard must be stored in a variable that is retained; if it is dropped the tracing sink will stop running"]
    pub fn run_tracing_sink(&self) -> Result<WorkerGuard, Report<Error>> {
        self.ensure_log_root_exists()?;
        self.initialize_tracing_sink()
    }

    /// The path to the directory containing log files.
    fn log_root(&self) -> PathBuf {
        self.location().as_ref().join("log")
    }

    fn ensure_log_root_exists(&self) -> Result<(), Report<Error>> {
        let root = self.log_root();
        std::fs::create_dir_all(&root)
            .context(Error::EnsureTraceRoot)
            .help("this location is derived from the config file's base_directory")
            .describe_lazy(|| format!("log output is configured to be stored in '{}'", root.display()))
    }

    /// Initialize tracing sinks:
    /// - Compact INFO+ traces to stderr.
    /// - Daily-rotating sink of all raw traces, full span events, in JSON, to disk.
    fn initialize_tracing_sink(&self) -> Result<WorkerGuard, Report<Error>> {
        let target = self.log_root().join("patchbridge.log");
        let file = self.retention().sink(&target)?;
        let (sink, guard) = tracing_appender::non_blocking(file);

        let subscriber = Registry::default()
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_file(false)
                    .with_level(true)
                    .with_line_number(false)
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(atty::is(atty::Stream::Stderr))
                    .with_filter(filter::dynamic_filter_fn(filter_to_events))
                    .with_filter(filter::LevelFilter::INFO),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::FULL)
                    .with_writer(sink),
            );

        tracing::subscriber::set_global_default(subscriber)
            .context(Error::TraceSinkReconfigured)
            .describe("this is a program bug and is not something that users can fix")?;

        info!("log output being stored in '{}'", self.log_root().display());
        Ok(guard)
    }
}

/// Limits the stderr sink to events, dropping span-open/span-close noise that
/// the file sink still records in full.
fn filter_to_events(metadata: &Metadata<'_>, ctx: &Context<'_, Registry>) -> bool {
    if metadata.is_event() {
        return true;
    }

    if let Some(current) = ctx.lookup_current() {
        return current.metadata().is_event();
    }

    false
}

/// The root directory under which log files are stored, derived from the
/// config file's `base_directory`.
#[derive(Debug, Clone, PartialEq, Eq, AsRef, From, new)]
pub struct Root(PathBuf);

impl Root {
    /// The location of the root as a path.
    pub fn as_path(&self) -> &Path {
        self.as_ref()
    }
}

/// How many rotated log files are kept before the oldest is deleted.
#[derive(Debug, Clone, PartialEq, CopyGetters, Eq, new)]
#[getset(get_copy = "pub")]
pub struct Retention {
    /// The number of rotated files to retain.
    days: ArtifactRetentionCount,
}

impl Retention {
    fn sink(&self, target: &Path) -> Result<BasicRollingFileAppender, Report<Error>> {
        let roll_condition = RollingConditionBasic::new().daily();
        BasicRollingFileAppender::new(target, roll_condition, self.days.into())
            .context(Error::TraceConfig)
            .help("ensure that the parent directory exists and you have access to it")
            .describe_lazy(|| format!("initialize sink to '{}'", target.display()))
    }
}

/// Specifies the number of rotated log files that are kept.
#[derive(Debug, Clone, Copy, PartialEq, Into, Eq, new)]
pub struct ArtifactRetentionCount(usize);

impl Default for ArtifactRetentionCount {
    /// Defaults to seven days of rotated files.
    fn default() -> Self {
        Self(7)
    }
}

impl PartialEq<usize> for ArtifactRetentionCount {
    fn eq(&self, other: &usize) -> bool {
        self.0 == *other
    }
}

impl TryFrom<usize> for ArtifactRetentionCount {
    type Error = Report<ValidationError>;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        if value == 0 {
            report!(ValidationError::RetentionBelowMinimum)
                .wrap_err()
                .help("must specify at least '1'")
                .describe_lazy(|| format!("provided value: {value}"))
        } else {
            Ok(Self(value))
        }
    }
}
