//! Types and functions for parsing & validating CLI arguments.

use std::path::PathBuf;

use clap::Parser;
use derive_new::new;
use error_stack::{Report, ResultExt};
use getset::{CopyGetters, Getters};
use serde::Serialize;

use crate::{
    config::io,
    ext::{
        error_stack::{DescribeContext, ErrorHelper},
        result::WrapOk,
    },
};

/// Errors that are possibly surfaced during validation of CLI arguments.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The config file was not able to be located.
    #[error("locate config file")]
    ConfigFileLocation,
}

/// Base arguments shared by every subcommand.
/// The "Raw" prefix indicates that this is the initial parsed value before any validation.
///
/// # Background
///
/// There is no exported function in `config` that parses these args; instead these are
/// parsed automatically by `clap` since they implement `Parser` and are included in the
/// top-level subcommand configuration sent to `clap`.
///
/// Unlike with the config file, there's not really a concept of these args "failing to parse",
/// as `clap` steps in and shows the user errors in this case. By the time `clap` hands
/// us this structure, it's already been successfully parsed.
///
/// This odd dichotomy is why we have to leak the `RawBaseArgs` implementation to the package
/// consumer, because the consumer (`main`) needs to be able to give this type to `clap` for it
/// to be parsed.
#[derive(Debug, Clone, Parser, Serialize, new)]
#[command(version, about)]
pub struct RawBaseArgs {
    /// The path to the patchbridge config file.
    ///
    /// If unset, patchbridge searches (in order) for `config.yml` or `config.yaml` in
    /// the current working directory, then (on Linux and macOS) `~/.config/patchbridge/`,
    /// or (on Windows) `%USERPROFILE%\.config\patchbridge`.
    #[arg(short = 'c', long, env = "PATCHBRIDGE_CONFIG")]
    config_file_path: Option<String>,
}

impl RawBaseArgs {
    /// Validate the raw args provided.
    ///
    /// In practice, if the user provided a path to the config file, validation is
    /// straightforward. If they did not, this function discovers its location on
    /// disk or errors if it cannot be found.
    pub async fn validate(self) -> Result<BaseArgs, Report<Error>> {
        let config_path = if let Some(provided_path) = self.config_file_path {
            ConfigFilePath::from(provided_path).wrap_ok()
        } else {
            ConfigFilePath::discover()
                .await
                .change_context(Error::ConfigFileLocation)
        }?;

        Ok(BaseArgs { config_path })
    }
}

/// Base arguments, used by every patchbridge subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct BaseArgs {
    /// The path to the config file on disk.
    config_path: ConfigFilePath,
}

/// The path to the config file.
///
/// Note that this is validated as being correctly shaped; the file is not guaranteed to exist
/// until it is actually read.
#[derive(Debug, Clone, Eq, PartialEq, Getters, CopyGetters)]
pub struct ConfigFilePath {
    /// The path on disk for the file.
    #[getset(get = "pub")]
    path: PathBuf,

    /// Whether the path was provided explicitly by the user, as opposed to discovered.
    #[getset(get_copy = "pub")]
    provided: bool,
}

impl ConfigFilePath {
    /// Discover the location for the config file on disk.
    async fn discover() -> Result<Self, Report<io::Error>> {
        io::find_some(["config.yml", "config.yaml"])
            .await
            .describe("searches for 'config.yml' or 'config.yaml'")
            .help("consider providing an explicit argument instead")
            .map(|path| Self {
                path,
                provided: false,
            })
    }
}

impl From<String> for ConfigFilePath {
    fn from(value: String) -> Self {
        Self {
            path: PathBuf::from(value),
            provided: true,
        }
    }
}
