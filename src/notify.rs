//! Composes and dispatches CI-result notification emails, subject to a
//! submitter allowlist, by shelling out to `curl` in SMTP-upload mode.

use error_stack::Report;
use indoc::formatdoc;
use secrecy::ExposeSecret;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{
    config::file::EmailConfig,
    ext::{
        command::{Command, CommandDescriber},
        error_stack::DescribeContext,
    },
    model::Series,
};

/// The fixed multipart boundary used for composed messages, overridable for tests.
pub const DEFAULT_MIME_BOUNDARY: &str = "patchbridge-notification-boundary";

/// Errors encountered composing or delivering a notification email.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The `curl` subprocess could not be spawned or piped to.
    #[error("invoke mail submission command")]
    Spawn,

    /// The `curl` subprocess ran but exited non-zero.
    #[error("mail submission command failed: {0}")]
    CommandFailed(String),
}

/// The outcome a notification email reports, per Design Note: CI status and
/// apply-conflict are distinct axes, so this is not [`crate::code_host::CiOutcome`].
#[derive(Debug, Clone)]
pub enum NotificationOutcome {
    /// The series' CI run passed.
    Success,
    /// The series' CI run failed; carries the log excerpt extracted by the log extractor (C9).
    Failure {
        /// The inline log excerpt to embed in the email body.
        log_excerpt: String,
    },
    /// The series could not be applied cleanly on its committed target branch.
    Conflict,
}

/// Whether a submitter's address should additionally receive a copy of the
/// notification, per I6: full-string regex match, short-circuited by `ignore_allowlist`.
pub fn email_in_submitter_allowlist(submitter: &str, config: &EmailConfig) -> bool {
    config.ignore_allowlist() || config.submitter_allowlist().iter().any(|pattern| pattern.is_match(submitter))
}

/// The resolved recipient list: configured `to` ∪ `cc` ∪ `{submitter}` iff allowlisted.
pub fn recipients(submitter: &str, config: &EmailConfig) -> Vec<String> {
    let mut recipients: Vec<String> = config.to().iter().chain(config.cc()).cloned().collect();
    if email_in_submitter_allowlist(submitter, config) && !recipients.iter().any(|r| r == submitter) {
        recipients.push(submitter.to_string());
    }
    recipients
}

/// Compose the MIME document for a notification email.
pub fn compose_message(
    series: &Series,
    target: &str,
    pr_url: &str,
    outcome: &NotificationOutcome,
    config: &EmailConfig,
    boundary: &str,
) -> String {
    let to = recipients(series.submitter_email(), config);
    let subject = format!("Re: [{target}] {}", series.title());

    let body = match outcome {
        NotificationOutcome::Success => formatdoc! {"
            CI passed for this series on branch '{target}'.

            Pull request: {pr_url}
        "},
        NotificationOutcome::Failure { log_excerpt } => formatdoc! {"
            CI failed for this series on branch '{target}'.

            Pull request: {pr_url}

            Failure excerpt:
            {log_excerpt}
        "},
        NotificationOutcome::Conflict => formatdoc! {"
            This series did not apply cleanly on branch '{target}' and was committed
            to that branch anyway, carrying a merge-conflict label.

            Pull request: {pr_url}
        "},
    };

    formatdoc! {r#"
        From: {from}
        To: {to}
        Subject: {subject}
        MIME-Version: 1.0
        Content-Type: multipart/mixed; boundary="{boundary}"

        --{boundary}
        Content-Type: text/plain; charset="utf-8"

        {body}
        --{boundary}--
    "#,
        from = config.from(),
        to = to.join(", "),
    }
}

/// Deliver a composed MIME message via `curl`'s SMTP-upload mode.
#[tracing::instrument(skip(message, config))]
pub async fn send(message: &str, submitter: &str, config: &EmailConfig) -> Result<(), Report<Error>> {
    let to = recipients(submitter, config);
    if to.is_empty() {
        return Ok(());
    }

    let smtps_url = format!("smtps://{}:{}", config.host(), config.port());
    let user_pass = format!("{}:{}", config.user(), config.pass().expose_secret());

    let mut command = Command::new("curl")
        .arg_plain("--silent")
        .arg_plain("--show-error")
        .arg_plain("--ssl-reqd")
        .arg_plain(smtps_url)
        .arg_plain("--mail-from")
        .arg_plain(config.from().to_string())
        .arg_plain("--user")
        .arg_secret(user_pass)
        .arg_plain("--crlf")
        .arg_plain("--upload-file")
        .arg_plain("-");

    for recipient in &to {
        command = command.arg_plain("--mail-rcpt").arg_plain(recipient.clone());
    }
    if let Some(proxy) = config.http_proxy() {
        command = command.arg_plain("--proxy").arg_plain(proxy.clone());
    }

    let mut stream = command.stream().map_err(|err| Report::new(err).change_context(Error::Spawn))?;

    let mut stdin = stream.take_stdin();
    stdin
        .write_all(message.as_bytes())
        .await
        .map_err(|err| Report::new(Error::Spawn).attach_printable(err.to_string()))?;
    drop(stdin);

    let mut stdout = stream.take_stdout();
    let mut stderr = stream.take_stderr();
    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();
    let _ = stdout.read_to_end(&mut stdout_buf).await;
    let _ = stderr.read_to_end(&mut stderr_buf).await;

    let status = stream.wait().await.map_err(|err| Report::new(err).change_context(Error::Spawn))?;
    if status.success() {
        Ok(())
    } else {
        let redacted = stream.redacter().redact_bytes(&stderr_buf);
        Err(Error::CommandFailed(String::from_utf8_lossy(&redacted).to_string()))
            .map_err(Report::new)
            .describe_lazy(|| stream.describe().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::file::{test_email_config, EmailConfig};

    fn config(ignore: bool, allowlist: Vec<&str>) -> EmailConfig {
        let allowlist_yaml = if allowlist.is_empty() {
            "[]".to_string()
        } else {
            format!(
                "\n{}",
                allowlist.iter().map(|p| format!("    - \"{p}\"")).collect::<Vec<_>>().join("\n")
            )
        };
        let yaml = format!(
            "host: smtp.example.com\n\
             user: bot\n\
             from: bot@example.com\n\
             pass: hunter2\n\
             to:\n  - maintainer@example.com\n\
             cc: []\n\
             submitter_allowlist: {allowlist_yaml}\n\
             ignore_allowlist: {ignore}\n"
        );
        test_email_config(&yaml)
    }

    #[test]
    fn allowlist_matches_full_string() {
        let cfg = config(false, vec!["submitter@example\\.com"]);
        assert!(email_in_submitter_allowlist("submitter@example.com", &cfg));
        assert!(!email_in_submitter_allowlist("other@example.com", &cfg));
    }

    #[test]
    fn ignore_allowlist_short_circuits() {
        let cfg = config(true, vec![]);
        assert!(email_in_submitter_allowlist("anyone@example.com", &cfg));
    }

    #[test]
    fn recipients_includes_allowlisted_submitter_once() {
        let cfg = config(true, vec![]);
        let to = recipients("maintainer@example.com", &cfg);
        assert_eq!(to, vec!["maintainer@example.com".to_string()]);
    }
}
