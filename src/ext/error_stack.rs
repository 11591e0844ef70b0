//! Extensions to `error_stack`.

use colored::Colorize;
use error_stack::{IntoReport, ResultExt};

/// Used to provide help text to an error.
///
/// This is meant to be readable by users of the application;
/// ideally help text is relatively terse and only displayed when
/// you're pretty sure what the user can do to fix the problem.
pub trait ErrorHelper {
    /// Provide help text to the user with what they can do to fix the problem.
    fn help<S: AsRef<str>>(self, help_text: S) -> Self;

    /// Optionally provide help text to the user with what they can do to fix the problem.
    fn help_if<S: AsRef<str>>(self, should_help: bool, help_text: S) -> Self;

    /// Lazily provide help text to the user with what they can do to fix the problem.
    fn help_lazy<S: AsRef<str>, F: FnOnce() -> S>(self, helper: F) -> Self;
}

impl<T, C> ErrorHelper for error_stack::Result<T, C> {
    fn help<S: AsRef<str>>(self, help_text: S) -> Self {
        let help = help_literal();
        let help_text = help_text.as_ref();
        self.attach_printable_lazy(|| format!("{help} {help_text}"))
    }

    fn help_if<S: AsRef<str>>(self, should_help: bool, help_text: S) -> Self {
        if should_help {
            let help = help_literal();
            let help_text = help_text.as_ref();
            self.attach_printable_lazy(|| format!("{help} {help_text}"))
        } else {
            self
        }
    }

    fn help_lazy<S: AsRef<str>, F: FnOnce() -> S>(self, helper: F) -> Self {
        let help = help_literal();
        let help_text = helper();
        let help_text = help_text.as_ref();
        self.attach_printable_lazy(|| format!("{help} {help_text}"))
    }
}

fn help_literal() -> String {
    "help:".bold().blue().to_string()
}

/// Used to provide a description of the operation being performed when an error occurred.
pub trait DescribeContext {
    /// Provide a human-readable description of the context in which the error occurred.
    fn describe<S: AsRef<str>>(self, description: S) -> Self;

    /// Optionally provide a human-readable description of the context in which the error occurred.
    fn describe_if<S: AsRef<str>>(self, should_describe: bool, description: S) -> Self;

    /// Lazily provide a human-readable description of the context in which the error occurred.
    fn describe_lazy<S: AsRef<str>, F: FnOnce() -> S>(self, describer: F) -> Self;
}

impl<T, C> DescribeContext for error_stack::Result<T, C> {
    fn describe<S: AsRef<str>>(self, description: S) -> Self {
        let context = describe_literal();
        let description = description.as_ref();
        self.attach_printable_lazy(|| format!("{context} {description}"))
    }

    fn describe_if<S: AsRef<str>>(self, should_describe: bool, description: S) -> Self {
        if should_describe {
            let context = describe_literal();
            let description = description.as_ref();
            self.attach_printable_lazy(|| format!("{context} {description}"))
        } else {
            self
        }
    }

    fn describe_lazy<S: AsRef<str>, F: FnOnce() -> S>(self, describer: F) -> Self {
        let context = describe_literal();
        let description = describer();
        let description = description.as_ref();
        self.attach_printable_lazy(|| format!("{context} {description}"))
    }
}

fn describe_literal() -> String {
    "context:".bold().green().to_string()
}

/// Convert a plain `Result<T, E>` directly into an `error_stack::Result<T, C>`,
/// folding the `into_report().change_context(...)` two-step into one call.
///
/// ```ignore
/// std::fs::read(path).context(Error::ReadConfig)?;
/// ```
pub trait IntoContext<T> {
    /// Wrap the error side of `self` in a [`Report`], changing its context to `C`.
    fn context<C: error_stack::Context>(self, context: C) -> error_stack::Result<T, C>;
}

impl<T, E> IntoContext<T> for Result<T, E>
where
    E: error_stack::Context,
{
    fn context<C: error_stack::Context>(self, context: C) -> error_stack::Result<T, C> {
        self.into_report().change_context(context)
    }
}

/// Attaches a final, user-facing plea to report the error as a bug.
///
/// Reserved for errors that should never happen in practice; if a user ever
/// sees one, the fix belongs in this program rather than in their config or
/// environment.
pub trait FatalErrorReport {
    /// Ask the user to report the error, since it indicates a program defect.
    fn request_support(self) -> Self;
}

impl<T, C> FatalErrorReport for error_stack::Result<T, C> {
    fn request_support(self) -> Self {
        let label = "fatal:".bold().red().to_string();
        self.attach_printable_lazy(|| {
            format!("{label} this looks like a bug; please report it along with this output")
        })
    }
}

/// Attach a link to further documentation about the error.
pub trait ErrorDocReference {
    /// Attach a documentation link.
    fn documentation<S: AsRef<str>>(self, link: S) -> Self;

    /// Lazily attach a documentation link.
    fn documentation_lazy<S: AsRef<str>, F: FnOnce() -> S>(self, linker: F) -> Self;
}

impl<T, C> ErrorDocReference for error_stack::Result<T, C> {
    fn documentation<S: AsRef<str>>(self, link: S) -> Self {
        let label = documentation_literal();
        let link = link.as_ref();
        self.attach_printable_lazy(|| format!("{label} {link}"))
    }

    fn documentation_lazy<S: AsRef<str>, F: FnOnce() -> S>(self, linker: F) -> Self {
        let label = documentation_literal();
        let link = linker();
        let link = link.as_ref();
        self.attach_printable_lazy(|| format!("{label} {link}"))
    }
}

fn documentation_literal() -> String {
    "documentation:".bold().cyan().to_string()
}

/// Merge several error reports that share a context type into a single report,
/// so that a fallible operation attempted against multiple candidates (e.g.
/// trying several target branches) can report every failure, not just the last.
#[macro_export]
macro_rules! merge_error_stacks {
    ($first:expr $(, $rest:expr)* $(,)?) => {{
        #[allow(unused_mut)]
        let mut stack: error_stack::Report<_> = $first;
        $(
            stack.extend_one($rest);
        )*
        stack
    }};
}

pub use merge_error_stacks;

#[cfg(test)]
mod tests {
    use super::*;
    use error_stack::Report;

    #[derive(Debug, thiserror::Error)]
    #[error("outer")]
    struct Outer;

    #[test]
    fn context_wraps_plain_error() {
        let result: std::io::Result<()> = Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        let wrapped = result.context(Outer);
        assert!(wrapped.is_err());
        assert!(format!("{:?}", wrapped.unwrap_err()).contains("outer"));
    }

    #[test]
    fn help_and_describe_attach_text() {
        let result: error_stack::Result<(), Outer> = Err(Report::new(Outer));
        let decorated = result.help("do the thing").describe("while doing the thing");
        let rendered = format!("{:?}", decorated.unwrap_err());
        assert!(rendered.contains("do the thing"));
        assert!(rendered.contains("while doing the thing"));
    }
}
