//! HTTP client for the pull-request code-hosting service: PR list/create/edit,
//! branch ref list/delete, label management, check-run reads, and rate-limit
//! telemetry. Authenticates with either a plain OAuth token or a GitHub App
//! installation credential.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use error_stack::{Report, ResultExt};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    config::file::{AppAuth, CodeHostAuth, PrivateKey},
    ext::error_stack::{DescribeContext, ErrorHelper, IntoContext},
    model::{Pr, PrState},
};

/// Errors encountered talking to the code host.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The repository URL could not be parsed into an `owner/name` pair.
    #[error("parse repository identifier from '{0}'")]
    ParseRepo(String),

    /// Minting a GitHub App installation token failed.
    #[error("mint installation access token")]
    MintAppToken,

    /// The request itself could not be completed.
    #[error("request code host")]
    Request,

    /// The code host responded, but not with a successful status.
    #[error("code host responded with status {0}")]
    Status(StatusCode),

    /// The response body didn't match the shape this client expects.
    #[error("parse code host response")]
    Parse,
}

/// An `owner/name` repository identifier, parsed from any of the common remote
/// URL shapes (`git@host:owner/name.git`, `https://host/owner/name.git`, or
/// the bare `owner/name`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoId {
    owner: String,
    name: String,
}

impl RepoId {
    /// Parse a repository identifier out of a git remote URL. Handles
    /// `git@host:owner/name.git`, `https://host/owner/name.git`, and the bare
    /// `owner/name` form.
    pub fn parse(remote_url: &str) -> Result<Self, Report<Error>> {
        let trimmed = remote_url.trim_end_matches(".git").trim_end_matches('/');
        let path = trimmed.split_once("://").map(|(_, rest)| rest).unwrap_or(trimmed);
        let path = path.rsplit_once(':').map(|(_, rest)| rest).unwrap_or(path);

        let mut segments: Vec<&str> = path.rsplit('/').collect();
        segments.truncate(2);
        segments.reverse();

        match segments.as_slice() {
            [owner, name] if !owner.is_empty() && !name.is_empty() => Ok(Self {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(Error::ParseRepo(remote_url.to_string())).map_err(Report::new),
        }
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// The aggregate CI result for a commit, as observed via the code host's check API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CiOutcome {
    /// No checks have reported yet, or all reporting checks are still running.
    Pending,
    /// Every check concluded successfully.
    Success,
    /// At least one check failed; carries a URL to its log output, if any.
    Failure {
        /// A URL pointing at the failing check's log output, for inclusion in notifications.
        log_url: Option<String>,
    },
}

/// A client scoped to one synchronization cycle, matching the tracker client's
/// per-cycle lifetime (Design Note "Global singletons").
#[derive(Debug, Clone)]
pub struct CodeHost {
    http: Client,
    repo: RepoId,
    token: String,
    bot_login: String,
}

const API_BASE: &str = "https://api.github.com";

impl CodeHost {
    /// Build a client authenticated against `repo_url`, resolving a GitHub App
    /// installation credential into a short-lived installation token if needed, and
    /// resolving the bot account's login for the PR-ownership invariant (§3).
    #[tracing::instrument(skip(auth))]
    pub async fn new(repo_url: &str, auth: &CodeHostAuth) -> Result<Self, Report<Error>> {
        let repo = RepoId::parse(repo_url)?;
        let http = Client::new();
        let (token, bot_login) = match auth {
            CodeHostAuth::OAuth(token) => {
                let token = token.expose_secret().to_string();
                let login = authenticated_user_login(&http, &token).await?;
                (token, login)
            }
            CodeHostAuth::App(app) => {
                let login = app_bot_login(&http, app).await?;
                let token = mint_installation_token(&http, app).await?;
                (token, login)
            }
        };
        Ok(Self { http, repo, token, bot_login })
    }

    /// The account this client acts as, used to evaluate the PR-ownership invariant.
    pub fn bot_login(&self) -> &str {
        &self.bot_login
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{API_BASE}{path}"))
            .bearer_auth(&self.token)
            .header("User-Agent", "patchbridge")
            .header("Accept", "application/vnd.github+json")
    }

    /// Pull requests currently open against `base`, owned by this client's bot account.
    #[tracing::instrument(skip(self))]
    pub async fn list_open_pulls(&self, base: &str) -> Result<Vec<Pr>, Report<Error>> {
        let path = format!("/repos/{}/pulls", self.repo);
        let response = self
            .request(reqwest::Method::GET, &path)
            .query(&[("state", "open"), ("base", base), ("per_page", "100")])
            .send()
            .await
            .context(Error::Request)?;
        let raw: Vec<RawPull> = response.json().await.context(Error::Parse)?;
        raw.into_iter().map(Pr::try_from).collect()
    }

    /// Recently closed pull requests against `base`, newest-updated first, for
    /// populating a worker's closed-PR expiry cache.
    #[tracing::instrument(skip(self))]
    pub async fn list_closed_pulls(&self, base: &str) -> Result<Vec<Pr>, Report<Error>> {
        let path = format!("/repos/{}/pulls", self.repo);
        let response = self
            .request(reqwest::Method::GET, &path)
            .query(&[
                ("state", "closed"),
                ("base", base),
                ("sort", "updated"),
                ("direction", "desc"),
                ("per_page", "100"),
            ])
            .send()
            .await
            .context(Error::Request)?;
        let raw: Vec<RawPull> = response.json().await.context(Error::Parse)?;
        raw.into_iter().map(Pr::try_from).collect()
    }

    /// Create a new pull request.
    #[tracing::instrument(skip(self))]
    pub async fn create_pull(&self, head: &str, base: &str, title: &str, body: &str) -> Result<Pr, Report<Error>> {
        let path = format!("/repos/{}/pulls", self.repo);
        let response = self
            .request(reqwest::Method::POST, &path)
            .json(&serde_json::json!({ "head": head, "base": base, "title": title, "body": body }))
            .send()
            .await
            .context(Error::Request)
            .describe_lazy(|| format!("create pull request {head} -> {base}"))?;
        let raw: RawPull = response.json().await.context(Error::Parse)?;
        Pr::try_from(raw)
    }

    /// Edit a pull request's title, body, and/or open/closed state.
    #[tracing::instrument(skip(self, title, body))]
    pub async fn edit_pull(
        &self,
        number: u64,
        title: Option<&str>,
        body: Option<&str>,
        close: bool,
    ) -> Result<(), Report<Error>> {
        let path = format!("/repos/{}/pulls/{number}", self.repo);
        let mut payload = serde_json::Map::new();
        if let Some(title) = title {
            payload.insert("title".to_string(), serde_json::json!(title));
        }
        if let Some(body) = body {
            payload.insert("body".to_string(), serde_json::json!(body));
        }
        if close {
            payload.insert("state".to_string(), serde_json::json!("closed"));
        }
        self.request(reqwest::Method::PATCH, &path)
            .json(&payload)
            .send()
            .await
            .context(Error::Request)
            .describe_lazy(|| format!("edit pull request #{number}"))?;
        Ok(())
    }

    /// Replace the labels on an issue/pull request.
    #[tracing::instrument(skip(self))]
    pub async fn set_labels(&self, number: u64, labels: &[String]) -> Result<(), Report<Error>> {
        let path = format!("/repos/{}/issues/{number}/labels", self.repo);
        self.request(reqwest::Method::PUT, &path)
            .json(&serde_json::json!({ "labels": labels }))
            .send()
            .await
            .context(Error::Request)
            .describe_lazy(|| format!("set labels on #{number}"))?;
        Ok(())
    }

    /// Delete a ref (e.g. `heads/series/1=>b`) on the remote.
    #[tracing::instrument(skip(self))]
    pub async fn delete_ref(&self, reference: &str) -> Result<(), Report<Error>> {
        let path = format!("/repos/{}/git/refs/{reference}", self.repo);
        self.request(reqwest::Method::DELETE, &path)
            .send()
            .await
            .context(Error::Request)
            .describe_lazy(|| format!("delete ref {reference}"))?;
        Ok(())
    }

    /// The aggregate CI outcome for the tip of `reference`.
    #[tracing::instrument(skip(self))]
    pub async fn check_status(&self, reference: &str) -> Result<CiOutcome, Report<Error>> {
        let path = format!("/repos/{}/commits/{reference}/status", self.repo);
        let response = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .context(Error::Request)?;
        let raw: RawCombinedStatus = response.json().await.context(Error::Parse)?;
        Ok(match raw.state.as_str() {
            "success" => CiOutcome::Success,
            "pending" => CiOutcome::Pending,
            _ => CiOutcome::Failure {
                log_url: raw.statuses.into_iter().find(|s| s.state != "success").and_then(|s| s.target_url),
            },
        })
    }

    /// The remaining requests in the code host's rate-limit window for this token.
    #[tracing::instrument(skip(self))]
    pub async fn rate_limit_remaining(&self) -> Result<u64, Report<Error>> {
        let response = self
            .request(reqwest::Method::GET, "/rate_limit")
            .send()
            .await
            .context(Error::Request)?;
        let raw: RawRateLimit = response.json().await.context(Error::Parse)?;
        Ok(raw.resources.core.remaining)
    }
}

/// Mint a short-lived JWT asserting this GitHub App's identity, for the handful of
/// endpoints (installation token minting, `GET /app`) that authenticate as the app
/// itself rather than as one of its installations.
fn app_jwt(app: &AppAuth) -> Result<String, Report<Error>> {
    let pem = match app.private_key() {
        PrivateKey::Inline(key) => key.expose_secret().as_bytes().to_vec(),
        PrivateKey::Path(path) => std::fs::read(path).context(Error::MintAppToken).describe_lazy(|| format!("read private key at {}", path.display()))?,
    };
    let key = EncodingKey::from_rsa_pem(&pem).context(Error::MintAppToken)?;

    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_secs();
    let claims = JwtClaims {
        iat: now.saturating_sub(60),
        exp: now + 9 * 60,
        iss: app.app_id().to_string(),
    };
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key).context(Error::MintAppToken)
}

async fn mint_installation_token(http: &Client, app: &AppAuth) -> Result<String, Report<Error>> {
    let jwt = app_jwt(app)?;
    let url = format!("{API_BASE}/app/installations/{}/access_tokens", app.installation_id());
    let response = http
        .post(url)
        .bearer_auth(jwt)
        .header("User-Agent", "patchbridge")
        .header("Accept", "application/vnd.github+json")
        .send()
        .await
        .context(Error::MintAppToken)
        .help("verify the app_id, installation_id, and private key are correct")?;
    let raw: RawInstallationToken = response.json().await.context(Error::MintAppToken)?;
    Ok(raw.token)
}

/// Resolve the login of the OAuth-authenticated account, for the PR-ownership invariant.
async fn authenticated_user_login(http: &Client, token: &str) -> Result<String, Report<Error>> {
    let response = http
        .get(format!("{API_BASE}/user"))
        .bearer_auth(token)
        .header("User-Agent", "patchbridge")
        .header("Accept", "application/vnd.github+json")
        .send()
        .await
        .context(Error::Request)?;
    let raw: RawOwner = response.json().await.context(Error::Parse)?;
    Ok(raw.login)
}

/// Resolve the bot login a GitHub App's PRs and commits appear under. Apps act
/// through the `<slug>[bot]` machine account rather than a user login proper.
async fn app_bot_login(http: &Client, app: &AppAuth) -> Result<String, Report<Error>> {
    let jwt = app_jwt(app)?;
    let response = http
        .get(format!("{API_BASE}/app"))
        .bearer_auth(jwt)
        .header("User-Agent", "patchbridge")
        .header("Accept", "application/vnd.github+json")
        .send()
        .await
        .context(Error::Request)?;
    let raw: RawApp = response.json().await.context(Error::Parse)?;
    Ok(format!("{}[bot]", raw.slug))
}

#[derive(Debug, Serialize)]
struct JwtClaims {
    iat: u64,
    exp: u64,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct RawInstallationToken {
    token: String,
}

#[derive(Debug, Deserialize)]
struct RawApp {
    slug: String,
}

#[derive(Debug, Deserialize)]
struct RawOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RawRepoRef {
    owner: RawOwner,
}

#[derive(Debug, Deserialize)]
struct RawRef {
    #[serde(rename = "ref")]
    reference: String,
    /// Absent when the head repository (commonly a fork) has been deleted.
    repo: Option<RawRepoRef>,
}

#[derive(Debug, Deserialize)]
struct RawPull {
    number: u64,
    state: String,
    title: String,
    updated_at: String,
    user: RawOwner,
    head: RawRef,
    base: RawRef,
    #[serde(default)]
    labels: Vec<RawLabel>,
}

#[derive(Debug, Deserialize)]
struct RawLabel {
    name: String,
}

/// Sentinel owner recorded for a pull request whose head repository (usually a
/// fork) was deleted; such a PR can never satisfy the ownership invariant.
const DELETED_REPO_OWNER: &str = "";

impl TryFrom<RawPull> for Pr {
    type Error = Report<Error>;

    fn try_from(raw: RawPull) -> Result<Self, Self::Error> {
        let updated_at = OffsetDateTime::parse(&raw.updated_at, &time::format_description::well_known::Rfc3339)
            .context(Error::Parse)
            .describe_lazy(|| format!("parse pull request timestamp '{}'", raw.updated_at))?;
        let state = if raw.state == "open" { PrState::Open } else { PrState::Closed };
        let head_owner = raw
            .head
            .repo
            .map(|r| r.owner.login)
            .unwrap_or_else(|| DELETED_REPO_OWNER.to_string());
        let base_owner = raw
            .base
            .repo
            .map(|r| r.owner.login)
            .unwrap_or_else(|| DELETED_REPO_OWNER.to_string());
        Ok(Pr::new(
            raw.number,
            state,
            raw.head.reference,
            raw.base.reference,
            raw.user.login,
            head_owner,
            base_owner,
            raw.title,
            raw.labels.into_iter().map(|l| l.name).collect(),
            updated_at,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    state: String,
    target_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCombinedStatus {
    state: String,
    #[serde(default)]
    statuses: Vec<RawStatus>,
}

#[derive(Debug, Deserialize)]
struct RawRateLimit {
    resources: RawRateLimitResources,
}

#[derive(Debug, Deserialize)]
struct RawRateLimitResources {
    core: RawRateLimitWindow,
}

#[derive(Debug, Deserialize)]
struct RawRateLimitWindow {
    remaining: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ssh_style_remote() {
        let repo = RepoId::parse("git@github.com:example/bpf-next.git").expect("parse");
        assert_eq!(repo.owner, "example");
        assert_eq!(repo.name, "bpf-next");
    }

    #[test]
    fn parses_https_style_remote() {
        let repo = RepoId::parse("https://github.com/example/bpf-next.git").expect("parse");
        assert_eq!(repo.owner, "example");
        assert_eq!(repo.name, "bpf-next");
    }

    #[test]
    fn parses_bare_owner_name() {
        let repo = RepoId::parse("example/bpf-next").expect("parse");
        assert_eq!(repo.owner, "example");
        assert_eq!(repo.name, "bpf-next");
    }
}
