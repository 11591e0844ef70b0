use std::process::Command;

use error_stack::fmt::HookContext;
use error_stack::{IntoReport, Report, Result, ResultExt};

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("cargo env var missing: '{0}'")]
    CargoEnv(String),
}

fn main() -> Result<(), Error> {
    Report::set_color_mode(error_stack::fmt::ColorMode::Color);
    Report::install_debug_hook(Help::debug_hook);

    // Only need to re-run this if HEAD moves or the manifest changes.
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=Cargo.toml");

    let _version = env_var("CARGO_PKG_VERSION")?;
    println!("cargo:rustc-env=GIT_HASH={}", git_sha());
    Ok(())
}

fn env_var(var: &str) -> Result<String, Error> {
    std::env::var(var)
        .into_report()
        .change_context_lazy(|| Error::CargoEnv(var.to_owned()))
        .attach(Help("ensure that this program is running in a Cargo build"))
}

/// Best-effort short commit hash. A checkout without `.git` (e.g. a source
/// tarball) must still build, so this never fails the build.
fn git_sha() -> String {
    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|sha| sha.trim().to_owned())
        .unwrap_or_else(|| "unknown".to_owned())
}

/// Provide help text for a given error.
struct Help(&'static str);

impl Help {
    /// Prints the help text and attaches it to the error context stack.
    fn debug_hook(Help(content): &Self, context: &mut HookContext<Self>) {
        context.push_body(format!("help: {content}"));
    }
}
