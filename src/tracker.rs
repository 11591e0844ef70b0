//! HTTP client for the patch-tracker service: paginated search for recent
//! series, strongly-consistent single-series fetches, and posting per-patch
//! check results.

use std::{collections::HashMap, time::Duration};

use error_stack::{Report, ResultExt};
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};
use tracing::warn;

use crate::{
    config::file::PatchworkConfig,
    ext::error_stack::{DescribeContext, ErrorHelper, IntoContext},
    model::{Patch, Series, Subject},
};

/// Fixed retry budget for transient transport failures against the tracker.
pub const DEFAULT_HTTP_RETRIES: usize = 3;

/// Errors encountered talking to the tracker.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request itself could not be completed (DNS, TLS, connection reset, timeout).
    #[error("request tracker")]
    Request,

    /// The tracker responded, but not with a successful status.
    #[error("tracker responded with status {0}")]
    Status(StatusCode),

    /// The response body didn't match the shape this client expects.
    #[error("parse tracker response")]
    Parse,
}

/// A client scoped to one synchronization cycle. Per Design Note "Global
/// singletons", a fresh instance is constructed every supervisor iteration
/// rather than reused across cycles, so a poisoned connection cannot outlive
/// one cycle.
#[derive(Debug, Clone)]
pub struct Tracker {
    http: Client,
    config: PatchworkConfig,
}

impl Tracker {
    /// Construct a tracker client for the given configuration.
    pub fn new(config: PatchworkConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn base_url(&self) -> String {
        self.config.server().trim_end_matches('/').to_string()
    }

    fn authenticate(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.api_token() {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str, query: &[(&str, String)]) -> Result<T, Report<Error>> {
        let url = format!("{}{path}", self.base_url());
        let attempt = || async {
            let request = self.authenticate(self.http.get(&url).query(query));
            let response = request.send().await.map_err(|err| {
                warn!("attempt to reach tracker at {url} failed: {err:#}");
                err
            })?;
            if !response.status().is_success() {
                return Err(reqwest::Error::from(
                    response.error_for_status().unwrap_err(),
                ));
            }
            Ok(response)
        };

        let strategy = ExponentialBackoff::from_millis(250).map(jitter).take(DEFAULT_HTTP_RETRIES);
        let response = Retry::spawn(strategy, attempt)
            .await
            .context(Error::Request)
            .describe_lazy(|| format!("fetch {url}"))
            .help("this is usually a transient network issue; it is retried automatically up to the configured budget")?;

        response.json::<T>().await.context(Error::Parse).describe_lazy(|| format!("parse response from {url}"))
    }

    /// Search each configured pattern for series updated since `since`, deduplicating
    /// the combined result by series id.
    #[tracing::instrument(skip(self))]
    pub async fn search_recent_series(&self, since: OffsetDateTime) -> Result<Vec<Series>, Report<Error>> {
        let mut seen = HashMap::new();
        for pattern in self.config.search_patterns() {
            let page: Vec<RawSeries> = self
                .get_json(
                    "/api/1.3/series/",
                    &[
                        ("project", self.config.project().to_string()),
                        ("q", pattern.clone()),
                        ("since", since.format(&time::format_description::well_known::Rfc3339).unwrap_or_default()),
                    ],
                )
                .await?;
            for raw in page {
                seen.entry(raw.id).or_insert(raw);
            }
        }
        seen.into_values().map(Series::try_from).collect::<Result<Vec<_>, _>>()
    }

    /// Strongly-consistent fetch of a single series by id, following links to its
    /// patches and cover letter.
    #[tracing::instrument(skip(self))]
    pub async fn get_series_by_id(&self, id: u64) -> Result<Series, Report<Error>> {
        let raw: RawSeries = self.get_json(&format!("/api/1.3/series/{id}/"), &[]).await?;
        Series::try_from(raw)
    }

    /// The subject grouping for a series: every other series on the tracker sharing
    /// its normalized title.
    #[tracing::instrument(skip(self, series))]
    pub async fn get_subject_by_series(&self, series: &Series) -> Result<Subject, Report<Error>> {
        let title = series.normalized_title();
        let page: Vec<RawSeries> = self
            .get_json(
                "/api/1.3/series/",
                &[("project", self.config.project().to_string()), ("q", title)],
            )
            .await?;
        let series = page.into_iter().map(Series::try_from).collect::<Result<Vec<_>, _>>()?;
        Ok(Subject::new(series))
    }

    /// Download the mbox content for a series, to be handed directly to `git am`.
    #[tracing::instrument(skip(self, series))]
    pub async fn fetch_mbox(&self, series: &Series) -> Result<Vec<u8>, Report<Error>> {
        let url = series.mbox_url().to_string();
        let attempt = || async { self.http.get(&url).send().await };
        let strategy = ExponentialBackoff::from_millis(250).map(jitter).take(DEFAULT_HTTP_RETRIES);
        let response = Retry::spawn(strategy, attempt)
            .await
            .context(Error::Request)
            .describe_lazy(|| format!("fetch mbox {url}"))?;
        response.bytes().await.map(|b| b.to_vec()).context(Error::Request)
    }

    /// Post a check result for one patch. Idempotent per `(patch_id, context)`: the
    /// tracker keeps only the latest post.
    #[tracing::instrument(skip(self))]
    pub async fn post_check(&self, patch_id: &str, check: CheckResult) -> Result<(), Report<Error>> {
        let url = format!("{}/api/1.3/patches/{patch_id}/checks/", self.base_url());
        let attempt = || async { self.authenticate(self.http.post(&url).json(&check)).send().await };
        let strategy = ExponentialBackoff::from_millis(250).map(jitter).take(DEFAULT_HTTP_RETRIES);
        let response = Retry::spawn(strategy, attempt)
            .await
            .context(Error::Request)
            .describe_lazy(|| format!("post check to {url}"))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::Status(response.status())).map_err(Report::new)
        }
    }
}

/// The body of a `POST /patches/<id>/checks/` request.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// A URL the code host's check run can be found at, if any.
    pub target_url: Option<String>,
    /// The check's identifying context, e.g. `"<target>-PR"`.
    pub context: String,
    /// A short human-readable description of the check result.
    pub description: String,
    /// The aggregate state: one of `"success"`, `"warning"`, `"fail"`, `"pending"`.
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPatchRef {
    id: u64,
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSubmitter {
    #[serde(default)]
    email: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSeries {
    id: u64,
    name: String,
    version: u32,
    patches: Vec<RawPatchRef>,
    #[serde(default)]
    cover_letter: Option<RawPatchRef>,
    submitter: RawSubmitter,
    mbox: String,
    date: String,
}

impl TryFrom<RawSeries> for Series {
    type Error = Report<Error>;

    fn try_from(raw: RawSeries) -> Result<Self, Self::Error> {
        let last_updated = OffsetDateTime::parse(&raw.date, &time::format_description::well_known::Rfc3339)
            .context(Error::Parse)
            .describe_lazy(|| format!("parse series date '{}'", raw.date))?;

        let patches = raw
            .patches
            .into_iter()
            .map(|p| Patch::new(p.id.to_string(), p.name))
            .collect();

        Ok(Series::new(
            raw.id,
            raw.name,
            raw.version,
            patches,
            raw.cover_letter.map(|c| c.id.to_string()),
            raw.submitter.email,
            raw.mbox,
            last_updated,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_series_converts_to_domain_series() {
        let raw = RawSeries {
            id: 1,
            name: "[bpf-next] fix thing".to_string(),
            version: 2,
            patches: vec![RawPatchRef {
                id: 10,
                name: "[bpf-next] fix thing".to_string(),
            }],
            cover_letter: None,
            submitter: RawSubmitter {
                email: "dev@example.com".to_string(),
            },
            mbox: "https://example.com/series/1/mbox".to_string(),
            date: "2024-01-01T00:00:00Z".to_string(),
        };
        let series = Series::try_from(raw).expect("convert");
        assert_eq!(series.id(), &1);
        assert_eq!(series.patches().len(), 1);
        assert_eq!(series.submitter_email(), "dev@example.com");
    }
}
