//! The `patchbridge` binary.

#![deny(clippy::unwrap_used)]
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(rust_2018_idioms)]

use atty::Stream;
use clap::{Parser, Subcommand};
use error_stack::{fmt::ColorMode, Report, Result, ResultExt};
use patchbridge::{
    config, debug,
    doc::{self, crate_version},
    ext::error_stack::{DescribeContext, ErrorDocReference, ErrorHelper, FatalErrorReport, IntoContext},
    supervisor,
};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("determine effective configuration")]
    DetermineEffectiveConfig,

    #[error("a fatal error occurred during internal setup")]
    InternalSetup,
}

#[derive(Debug, Parser)]
#[clap(version)]
struct Opts {
    /// patchbridge can run a number of subcommands.
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the synchronization loop with the current config, until shut down.
    Run(config::RawBaseArgs),

    /// Load and validate the config file, printing the resolved tree, then exit.
    Validate(config::RawBaseArgs),
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let version = crate_version();
    if atty::is(Stream::Stdout) {
        Report::set_color_mode(ColorMode::Color);
    } else {
        Report::set_color_mode(ColorMode::None);
    }

    let Opts { command } = Opts::parse();
    let subcommand = || async {
        match command {
            Commands::Run(args) => main_run(args).await,
            Commands::Validate(args) => main_validate(args).await,
        }
    };

    // Run the subcommand, but also listen for a shutdown signal. If one
    // fires, we exit; this drops any futures currently running, which in
    // Rust is the appropriate way to cancel them.
    tokio::select! {
        // We want to handle signals first, regardless of how often the
        // subcommand's future is ready to be polled.
        biased;

        result = shutdown_signal() => {
            // Write directly to stderr because tracing may already be shut
            // down, or may not ever have been started, by the time this runs.
            eprintln!("shutting down due to OS signal");
            result
        },

        result = subcommand() => {
            result
        }
    }
    .request_support()
    .describe_lazy(|| format!("patchbridge version: {version}"))
}

/// Resolves once either `SIGINT` or (on Unix) `SIGTERM` is received.
async fn shutdown_signal() -> Result<(), Error> {
    #[cfg(unix)]
    {
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context(Error::InternalSetup)?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context(Error::InternalSetup),
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.context(Error::InternalSetup)
    }
}

/// Run the synchronization loop with the current config.
async fn main_run(args: config::RawBaseArgs) -> Result<(), Error> {
    let args = config::validate_args(args)
        .await
        .change_context(Error::DetermineEffectiveConfig)
        .help("try running patchbridge with the '--help' argument to see available options and usage suggestions")?;

    let conf = config::load(&args)
        .await
        .change_context(Error::DetermineEffectiveConfig)
        .documentation_lazy(doc::link::config_file_reference)?;
    debug!("loaded {conf:?}");

    let log_config = debug::Config::new(
        debug::Root::new(conf.base_directory().clone()),
        debug::Retention::new(debug::ArtifactRetentionCount::default()),
    );
    let _tracing_guard = log_config.run_tracing_sink().change_context(Error::InternalSetup)?;

    // `supervisor::run` never resolves; cancellation happens when the outer
    // `tokio::select!` in `main` drops this future on a shutdown signal.
    supervisor::run(&conf).await
}

/// Load and validate the config file, printing the resolved tree.
async fn main_validate(args: config::RawBaseArgs) -> Result<(), Error> {
    let args = config::validate_args(args)
        .await
        .change_context(Error::DetermineEffectiveConfig)
        .help("try running patchbridge with the '--help' argument to see available options and usage suggestions")?;

    let conf = config::load(&args)
        .await
        .change_context(Error::DetermineEffectiveConfig)
        .documentation_lazy(doc::link::config_file_reference)?;

    println!("{conf:#?}");
    Ok(())
}
