//! Types and functions for IO actions, wrapped in patchbridge errors and semantics.
//!
//! # Async
//!
//! Generally, prefer the variants in the parent module, as they are async.
//!
//! Functions in this module are the backing sync variants of those functions
//! and should only be used if inside a sync context.
//!
//! # Why backing sync
//!
//! Rust standard library IO operations are synchronous,
//! so in order to make them "async" we have to run these synchronous operations
//! in Tokio's backing thread pool.

use std::{
    env, fmt,
    fs::{self},
    path::{Path, PathBuf},
};

use error_stack::{Report, ResultExt};
use itertools::Itertools;
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::ext::{
    error_stack::{DescribeContext, ErrorHelper, IntoContext},
    result::{WrapErr, WrapOk},
};

/// Errors that are possibly surfaced during IO actions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The provided path-like item failed validation.
    /// Often these errors are related to permissions or the path not existing.
    #[error("validate path")]
    ValidatePath,

    /// The provided file path does not reference a file on disk.
    #[error("path is not a regular file")]
    NotRegularFile,

    /// The provided directory path does not reference a directory on disk.
    #[error("path is not a directory")]
    NotDirectory,

    /// Failed to locate the current working directory.
    #[error("locate working directory")]
    LocateWorkingDirectory,

    /// Failed to read the contents of the file at the provided path.
    #[error("read contents of file")]
    ReadFileContent,

    /// Generic IO error.
    #[error("underlying IO error")]
    IO,
}

/// Lists the contents of a directory.
/// Returns the file names without their path components.
#[tracing::instrument]
pub fn list_contents(dir: &Path) -> Result<Vec<String>, Report<Error>> {
    std::fs::read_dir(dir)
        .context(Error::IO)?
        .map_ok(|entry| entry.file_name().to_string_lossy().to_string())
        .collect::<Result<Vec<_>, _>>()
        .context(Error::IO)
}

/// Reads the provided file content to a string.
#[tracing::instrument]
pub fn read_to_string<P: AsRef<Path> + fmt::Debug>(file: P) -> Result<String, Report<Error>> {
    let file = file.as_ref().to_path_buf();
    fs::read_to_string(file)
        .context(Error::ReadFileContent)
        .help("validate that you have access to the file and that it exists")
}

/// Validate that a file path exists and is a regular file.
#[tracing::instrument]
pub fn validate_file(path: PathBuf) -> Result<PathBuf, Report<Error>> {
    let meta = fs::metadata(&path)
        .context(Error::ValidatePath)
        .describe_lazy(|| format!("validate file: '{}'", path.display()))
        .help("validate that you have access to the file and that it exists")?;

    if meta.is_file() {
        path.wrap_ok()
    } else {
        Error::NotRegularFile
            .wrap_err()
            .map_err(Report::from)
            .attach_printable_lazy(|| format!("validate file: '{}'", path.display()))
    }
}

/// Validate that a directory path exists, creating it if it does not.
#[tracing::instrument]
pub fn ensure_directory(path: PathBuf) -> Result<PathBuf, Report<Error>> {
    fs::create_dir_all(&path)
        .context(Error::IO)
        .describe_lazy(|| format!("create directory: '{}'", path.display()))?;

    let meta = fs::metadata(&path).context(Error::ValidatePath)?;
    if meta.is_dir() {
        path.wrap_ok()
    } else {
        Error::NotDirectory
            .wrap_err()
            .map_err(Report::from)
            .attach_printable_lazy(|| format!("validate directory: '{}'", path.display()))
    }
}

/// Look up the current working directory.
///
/// This function is lazy and memoized:
/// the lookup is performed the first time on demand
/// and (assuming no error was encountered)
/// that result is saved for future invocations.
#[tracing::instrument]
pub fn working_dir() -> Result<&'static PathBuf, Report<Error>> {
    static LAZY: OnceCell<PathBuf> = OnceCell::new();
    LAZY.get_or_try_init(|| {
        debug!("Performing uncached lookup of working directory");
        env::current_dir()
            .context(Error::LocateWorkingDirectory)
            .describe("on macOS and Linux, this uses the system call 'getcwd'")
            .describe("on Windows, this uses the Windows API call 'GetCurrentDirectoryW'")
            .describe("this kind of error is typically caused by the current user not having access to the working directory")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_file_rejects_directories() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let err = validate_file(dir.path().to_path_buf()).expect_err("directory is not a file");
        assert!(format!("{err:?}").contains("is not a regular file"));
    }

    #[test]
    fn ensure_directory_creates_missing_dirs() {
        let root = tempfile::tempdir().expect("create temp dir");
        let nested = root.path().join("a").join("b");
        let created = ensure_directory(nested.clone()).expect("create nested dir");
        assert_eq!(created, nested);
        assert!(nested.is_dir());
    }
}
