//! One `Worker` owns the local checkout and code-host relationship for a single
//! `(downstream_repo, target_branch)` pair, and is the only component that touches
//! git or opens/edits pull requests directly.

use std::{collections::HashMap, time::Duration};

use error_stack::{Report, ResultExt};
use tracing::warn;

use crate::{
    code_host::{CiOutcome, CodeHost},
    config::file::BranchConfig,
    ext::{
        error_stack::{DescribeContext, IntoContext},
        io::spawn_blocking_stacked,
    },
    git::{self, Credentials, Repository},
    http::Auth,
    model::{self, Pr, Series, Subject},
    tracker::{CheckResult, Tracker},
};

/// How long a remote branch may survive, past its last open PR closing, before
/// `expire_branches` deletes it.
pub const BRANCH_TTL: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// How far back `try_apply_mailbox_series` scans target-branch commit summaries
/// when deciding whether a series is already applied upstream.
pub const ALREADY_MERGED_LOOKBACK: usize = 100;

/// The name of the remote a worker's CI checkout uses to pull content from the
/// downstream repository, mirroring [`git::UPSTREAM_REMOTE_NAME`]'s role in `do_sync`.
const DOWNSTREAM_REMOTE_NAME: &str = "downstream";

/// Errors encountered operating a worker.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Constructing the code-host client for this worker's branch failed.
    #[error("construct code host client")]
    CodeHost,

    /// A git operation against the downstream or CI checkout failed.
    #[error("git operation failed")]
    Git,

    /// Fetching a series' mbox from the tracker failed.
    #[error("fetch series mailbox")]
    Tracker,

    /// Writing a series' mbox to a scratch file failed.
    #[error("write mailbox to scratch file")]
    Io,
}

/// The outcome of attempting to apply a series' mbox on top of a worker's target branch.
#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    /// The series applied cleanly.
    Applied,
    /// The series did not apply; not an error, but a protocol outcome that drives routing
    /// to the next candidate branch (Design Note "Failure outcomes are protocol states").
    Conflict {
        /// A short description of the failure, suitable for a notification body.
        info: String,
    },
    /// Every patch in the series already matches a commit already on the target branch.
    AlreadyApplied,
}

/// The outcome of `checkout_and_patch`.
#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    /// The branch was pushed (or was already up to date) and this PR should be used.
    Pr(Box<Pr>),
    /// The branch already carried the same tree and there was no PR to return.
    NoPr,
    /// The post-apply tree is identical to the base; not an error, but counted as
    /// `empty_pr` by the caller and skipped (Design Note "Failure outcomes are protocol states").
    EmptyDiff,
}

/// One `(downstream_repo, target_branch)` worker.
#[derive(Debug)]
pub struct Worker {
    target: String,
    config: BranchConfig,
    downstream: Repository,
    ci: Repository,
    code_host: CodeHost,
    prs: HashMap<String, Pr>,
    branches: Vec<String>,
    closed_prs: Option<Vec<Pr>>,
}

impl Worker {
    /// Construct a worker for `target`, rooting its checkouts under
    /// `<base_directory>/<target>/` and `<base_directory>/<target>-ci/`.
    #[tracing::instrument(skip(config))]
    pub async fn new(target: &str, config: BranchConfig, base_directory: &std::path::Path) -> Result<Self, Report<Error>> {
        let code_host = CodeHost::new(config.repo(), config.auth())
            .await
            .change_context(Error::CodeHost)
            .describe_lazy(|| format!("authenticating worker '{target}' against its code host"))?;

        let downstream = Repository::new(
            base_directory.join(target),
            credentials_for(config.auth()),
        );
        let ci = Repository::new(
            base_directory.join(format!("{target}-ci")),
            Credentials::None,
        );

        Ok(Self {
            target: target.to_string(),
            config,
            downstream,
            ci,
            code_host,
            prs: HashMap::new(),
            branches: Vec::new(),
            closed_prs: None,
        })
    }

    /// The target branch this worker syncs onto.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// This worker's currently cached open, relevant PRs, keyed by subject title.
    pub fn prs(&self) -> &HashMap<String, Pr> {
        &self.prs
    }

    /// The downstream repository's configured remote URL, for building PR web links.
    pub fn repo_url(&self) -> &str {
        self.config.repo()
    }

    /// The code host's current aggregate CI outcome for `pr`'s head commit.
    #[tracing::instrument(skip(self, pr))]
    pub async fn check_status(&self, pr: &Pr) -> Result<CiOutcome, Report<Error>> {
        self.code_host.check_status(pr.head_ref()).await.change_context(Error::CodeHost)
    }

    /// The code host's remaining rate-limit budget for this worker's credentials.
    #[tracing::instrument(skip(self))]
    pub async fn rate_limit_remaining(&self) -> Result<u64, Report<Error>> {
        self.code_host.rate_limit_remaining().await.change_context(Error::CodeHost)
    }

    /// 1. Whether this worker is ready to participate in a cycle: its checkout root
    /// is reachable and its code-host credentials resolved at construction time.
    pub fn can_do_sync(&self) -> bool {
        self.downstream.directory().parent().is_some()
    }

    /// 2. Clone or fetch both the downstream and CI checkouts, falling back to a full
    /// re-clone if the local path is missing or the fetch fails.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_repo_branch(&self) -> Result<(), Report<Error>> {
        fetch_or_clone(&self.downstream, self.config.repo(), None).await?;
        fetch_or_clone(&self.ci, self.config.ci_repo(), Some(self.config.ci_branch())).await?;
        Ok(())
    }

    /// 3. Populate `prs` from the code host's currently open PRs against this worker's
    /// target branch, filtered by the PR-ownership invariant (§3).
    #[tracing::instrument(skip(self))]
    pub async fn get_pulls(&mut self) -> Result<(), Report<Error>> {
        let bot = self.code_host.bot_login().to_string();
        let target = self.target.clone();
        let pulls = self
            .code_host
            .list_open_pulls(&target)
            .await
            .change_context(Error::CodeHost)?;
        self.prs = pulls
            .into_iter()
            .filter(|pr| pr.is_relevant_open(&bot, &target))
            .map(|pr| (pr.title().clone(), pr))
            .collect();
        Ok(())
    }

    /// 4. Mirror the configured upstream into this worker's target branch on the
    /// downstream repo, then refresh the cached remote branch list.
    #[tracing::instrument(skip(self))]
    pub async fn do_sync(&mut self) -> Result<(), Report<Error>> {
        let downstream = self.downstream.clone();
        let upstream_url = self.config.upstream().clone();
        let upstream_branch = self.config.upstream_branch().clone();
        let target = self.target.clone();
        spawn_blocking_stacked(move || {
            downstream.ensure_remote(git::UPSTREAM_REMOTE_NAME, &upstream_url)?;
            downstream.fetch(git::UPSTREAM_REMOTE_NAME, &upstream_branch)?;
            let upstream_ref = format!("{}/{upstream_branch}", git::UPSTREAM_REMOTE_NAME);
            downstream.checkout(&upstream_ref, Some(&target))?;
            // `checkout -B` alone leaves a dirty working tree behind when the previous
            // cycle's last apply attempt on this same checkout failed to fully unwind
            // (a partial `git am`); reset explicitly so the mirror always starts clean.
            downstream.reset_hard(&upstream_ref)?;
            downstream.push_force("origin", &target, &format!("refs/heads/{target}"))
        })
        .await
        .change_context(Error::Git)?;

        let downstream = self.downstream.clone();
        let pattern = "refs/heads/*".to_string();
        let refs = spawn_blocking_stacked(move || downstream.ls_remote("origin", &pattern))
            .await
            .change_context(Error::Git)?;
        self.branches = refs
            .into_iter()
            .filter_map(|(_, reference)| reference.strip_prefix("refs/heads/").map(str::to_string))
            .collect();
        Ok(())
    }

    /// 5. Mirror the downstream repo's target branch into the CI repo's CI branch, so
    /// end-to-end tests run against the latest content, then refresh any PR whose base
    /// is that overlay branch.
    #[tracing::instrument(skip(self))]
    pub async fn update_e2e_test_branch_and_update_pr(&mut self) -> Result<(), Report<Error>> {
        let ci = self.ci.clone();
        let downstream_url = self.config.repo().clone();
        let target = self.target.clone();
        let ci_branch = self.config.ci_branch().clone();
        spawn_blocking_stacked(move || {
            ci.ensure_remote(DOWNSTREAM_REMOTE_NAME, &downstream_url)?;
            ci.fetch(DOWNSTREAM_REMOTE_NAME, &target)?;
            ci.push_force("origin", "FETCH_HEAD", &format!("refs/heads/{ci_branch}"))
        })
        .await
        .change_context(Error::Git)?;

        if let Some(pr) = self.prs.values().find(|pr| pr.base_ref() == self.config.ci_branch()).cloned() {
            self.code_host
                .edit_pull(*pr.number(), None, None, false)
                .await
                .change_context(Error::CodeHost)?;
        }
        Ok(())
    }

    /// 6. Attempt to apply `series`' mbox on a fresh branch rooted at this worker's
    /// target branch tip.
    #[tracing::instrument(skip(self, series, tracker))]
    pub async fn try_apply_mailbox_series(
        &self,
        pr_branch_name: &str,
        series: &Series,
        tracker: &Tracker,
    ) -> Result<ApplyOutcome, Report<Error>> {
        let mbox = tracker.fetch_mbox(series).await.change_context(Error::Tracker)?;

        let scratch = tempfile::NamedTempFile::new().context(Error::Io)?;
        std::fs::write(scratch.path(), &mbox).context(Error::Io)?;
        let mbox_path = scratch.path().to_path_buf();

        let downstream = self.downstream.clone();
        let target = self.target.clone();
        let branch = pr_branch_name.to_string();
        spawn_blocking_stacked(move || downstream.checkout(&target, Some(&branch)))
            .await
            .change_context(Error::Git)?;

        let downstream = self.downstream.clone();
        let am_result = spawn_blocking_stacked(move || downstream.am(&mbox_path)).await;
        if let Err(err) = am_result {
            return Ok(ApplyOutcome::Conflict { info: format!("{err:?}") });
        }

        let downstream = self.downstream.clone();
        let target = self.target.clone();
        let summaries = spawn_blocking_stacked(move || downstream.recent_commit_summaries(&target, ALREADY_MERGED_LOOKBACK))
            .await
            .change_context(Error::Git)?;
        let normalized: Vec<String> = summaries.iter().map(|s| model::strip_tag_prefixes(s).to_lowercase()).collect();

        let already_applied = series
            .patches()
            .iter()
            .all(|patch| normalized.contains(&patch.normalized_summary()));

        if already_applied {
            Ok(ApplyOutcome::AlreadyApplied)
        } else {
            Ok(ApplyOutcome::Applied)
        }
    }

    /// 7. Push `branch_name` if its tree changed, then create or update its PR.
    #[tracing::instrument(skip(self, series))]
    pub async fn checkout_and_patch(&mut self, branch_name: &str, series: &Series) -> Result<CheckoutOutcome, Report<Error>> {
        let downstream = self.downstream.clone();
        let target = self.target.clone();
        let branch = branch_name.to_string();
        let existing_remote = self.branches.contains(&branch_name.to_string());

        let changed = if existing_remote {
            let downstream = downstream.clone();
            let target = target.clone();
            let branch = branch.clone();
            spawn_blocking_stacked(move || downstream.is_branch_changed(&target, &branch, &format!("origin/{branch}")))
                .await
                .change_context(Error::Git)?
        } else {
            true
        };

        let existing_pr = self.prs.get(series.normalized_title().as_str()).cloned();

        if existing_remote && !changed {
            return Ok(match existing_pr {
                Some(pr) => CheckoutOutcome::Pr(Box::new(pr)),
                None => CheckoutOutcome::NoPr,
            });
        }

        let diff_empty = {
            let downstream = downstream.clone();
            let target = target.clone();
            let branch = branch.clone();
            let commits = spawn_blocking_stacked(move || downstream.commits_since(&target, &branch))
                .await
                .change_context(Error::Git)?;
            commits.is_empty()
        };
        if diff_empty {
            return Ok(CheckoutOutcome::EmptyDiff);
        }

        let downstream = downstream.clone();
        let branch = branch.clone();
        let remote_branch = format!("refs/heads/{branch}");
        spawn_blocking_stacked(move || downstream.push_force("origin", &branch, &remote_branch))
            .await
            .change_context(Error::Git)?;
        if !existing_remote {
            self.branches.push(branch_name.to_string());
        }

        let title = series.normalized_title();
        let body = format!("Automated pull request for series {}.", series.id());
        let labels: Vec<String> = series.tags().into_iter().collect();

        let pr = match existing_pr {
            Some(pr) => {
                self.code_host
                    .edit_pull(*pr.number(), Some(&title), Some(&body), false)
                    .await
                    .change_context(Error::CodeHost)?;
                self.code_host
                    .set_labels(*pr.number(), &labels)
                    .await
                    .change_context(Error::CodeHost)?;
                pr
            }
            None => {
                let pr = self
                    .code_host
                    .create_pull(&branch, &self.target, &title, &body)
                    .await
                    .change_context(Error::CodeHost)?;
                self.code_host
                    .set_labels(*pr.number(), &labels)
                    .await
                    .change_context(Error::CodeHost)?;
                pr
            }
        };
        self.prs.insert(title, pr.clone());
        Ok(CheckoutOutcome::Pr(Box::new(pr)))
    }

    /// Attach [`model::MERGE_CONFLICT_LABEL`] to `pr` and otherwise leave its labels
    /// alone, used when every candidate branch failed to apply.
    #[tracing::instrument(skip(self))]
    pub async fn mark_conflicted(&self, pr: &Pr) -> Result<(), Report<Error>> {
        let mut labels: Vec<String> = pr.labels().clone();
        if !labels.iter().any(|l| l == model::MERGE_CONFLICT_LABEL) {
            labels.push(model::MERGE_CONFLICT_LABEL.to_string());
        }
        self.code_host
            .set_labels(*pr.number(), &labels)
            .await
            .change_context(Error::CodeHost)
    }

    /// 8. Post a check result for every patch in `series` reflecting `pr`'s aggregate
    /// CI status, under context `"<target>-PR"`.
    #[tracing::instrument(skip(self, series, tracker))]
    pub async fn sync_checks(&self, pr: &Pr, series: &Series, tracker: &Tracker) -> Result<(), Report<Error>> {
        let outcome = self
            .code_host
            .check_status(pr.head_ref())
            .await
            .change_context(Error::CodeHost)?;
        let (state, description, target_url) = match outcome {
            CiOutcome::Success => ("success".to_string(), "CI passed".to_string(), None),
            CiOutcome::Pending => ("pending".to_string(), "CI is running".to_string(), None),
            CiOutcome::Failure { log_url } => ("fail".to_string(), "CI failed".to_string(), log_url),
        };
        let context = format!("{}-PR", self.target);
        for patch in series.patches() {
            let check = CheckResult {
                target_url: target_url.clone(),
                context: context.clone(),
                description: description.clone(),
                state: state.clone(),
            };
            tracker.post_check(patch.id(), check).await.change_context(Error::Tracker)?;
        }
        Ok(())
    }

    /// 9. Deterministic branch ref for a subject on this worker's target:
    /// `series/<first known series id>=><target>`, matching this worker's PR head-ref.
    pub fn subject_to_branch(&self, subject: &Subject) -> Option<String> {
        model::branch_ref_for_subject(subject, &self.target)
    }

    /// 10. Delete any local remote branch matching the `series/<id>=><target>` shape that
    /// is absent from `all_prs` and whose most recent closed PR is older than [`BRANCH_TTL`].
    #[tracing::instrument(skip(self, all_prs))]
    pub async fn expire_branches(&mut self, all_prs: &AllPrsView) -> Result<(), Report<Error>> {
        let candidates: Vec<String> = self
            .branches
            .iter()
            .filter(|branch| branch.as_str() != self.target)
            .filter(|branch| model::parse_branch_ref(branch).is_well_formed())
            .cloned()
            .collect();

        for branch in candidates {
            if all_prs.has_open_pr_on(&branch, &self.target) {
                continue;
            }
            let closed = self.filter_closed_pr(&branch).await?;
            let expired = match closed {
                Some(pr) => is_older_than(pr.updated_at(), BRANCH_TTL),
                None => true,
            };
            if expired {
                self.code_host
                    .delete_ref(&format!("heads/{branch}"))
                    .await
                    .change_context(Error::CodeHost)?;
                self.branches.retain(|b| b != &branch);
            }
        }
        Ok(())
    }

    /// 11. Close relevant open PRs whose subject is no longer observed and which have
    /// exceeded [`BRANCH_TTL`].
    #[tracing::instrument(skip(self, observed_subjects))]
    pub async fn expire_user_prs(&mut self, observed_subjects: &std::collections::BTreeSet<String>) -> Result<(), Report<Error>> {
        let stale: Vec<Pr> = self
            .prs
            .iter()
            .filter(|(title, _)| !observed_subjects.contains(title.as_str()))
            .filter(|(_, pr)| is_older_than(pr.updated_at(), BRANCH_TTL))
            .map(|(_, pr)| pr.clone())
            .collect();

        for pr in stale {
            self.code_host
                .edit_pull(*pr.number(), None, None, true)
                .await
                .change_context(Error::CodeHost)?;
            self.prs.retain(|_, v| v.number() != pr.number());
        }
        Ok(())
    }

    /// 12. The most recently updated closed PR whose head-ref equals `branch`, drawn
    /// from a lazily fetched and cached lookback window.
    #[tracing::instrument(skip(self))]
    pub async fn filter_closed_pr(&mut self, branch: &str) -> Result<Option<Pr>, Report<Error>> {
        if self.closed_prs.is_none() {
            let target = self.target.clone();
            let closed = self
                .code_host
                .list_closed_pulls(&target)
                .await
                .change_context(Error::CodeHost)?;
            self.closed_prs = Some(closed);
        }
        Ok(self
            .closed_prs
            .as_ref()
            .expect("populated above")
            .iter()
            .filter(|pr| pr.head_ref() == branch)
            .max_by_key(|pr| *pr.updated_at())
            .cloned())
    }

    /// Drop the cached closed-PR lookback window, forcing the next `filter_closed_pr`
    /// call to re-fetch it. Called once per cycle, before the orphan sweep.
    pub fn clear_closed_pr_cache(&mut self) {
        self.closed_prs = None;
    }

    /// Rename `pr`'s title on the code host and in this worker's cache, used during
    /// the orphan sweep when a cover-letter edit changes a subject's title.
    #[tracing::instrument(skip(self, pr))]
    pub async fn rename_pr(&mut self, pr: &Pr, new_title: &str) -> Result<(), Report<Error>> {
        self.code_host
            .edit_pull(*pr.number(), Some(new_title), None, false)
            .await
            .change_context(Error::CodeHost)?;
        if let Some(mut renamed) = self.prs.remove(pr.title()) {
            renamed = model::Pr::new(
                *renamed.number(),
                *renamed.state(),
                renamed.head_ref().clone(),
                renamed.base_ref().clone(),
                renamed.author().clone(),
                renamed.head_owner().clone(),
                renamed.base_owner().clone(),
                new_title,
                renamed.labels().clone(),
                *renamed.updated_at(),
            );
            self.prs.insert(new_title.to_string(), renamed);
        }
        Ok(())
    }

    /// Close PR `number` on the code host and drop it from this worker's cache, if
    /// it's one of this worker's own. Used by the reconciler to kill a duplicate.
    #[tracing::instrument(skip(self))]
    pub async fn close_pr(&mut self, number: u64) -> Result<(), Report<Error>> {
        self.code_host
            .edit_pull(number, None, None, true)
            .await
            .change_context(Error::CodeHost)?;
        self.prs.retain(|_, pr| *pr.number() != number);
        Ok(())
    }
}

async fn fetch_or_clone(repo: &Repository, url: &str, checkout_ref: Option<&str>) -> Result<(), Report<Error>> {
    let repo = repo.clone();
    let url = url.to_string();
    let checkout_ref = checkout_ref.map(str::to_string);
    spawn_blocking_stacked(move || {
        if !repo.exists() {
            return repo.clone_from(&url, checkout_ref.as_deref());
        }
        match repo.fetch("origin", "+refs/heads/*:refs/remotes/origin/*") {
            Ok(()) => {
                if let Some(branch) = &checkout_ref {
                    repo.checkout(&format!("origin/{branch}"), Some(branch))?;
                }
                Ok(())
            }
            Err(_) => {
                warn!("fetch failed for {}, falling back to re-clone", repo.directory().display());
                repo.clone_from(&url, checkout_ref.as_deref())
            }
        }
    })
    .await
    .change_context(Error::Git)
}

fn credentials_for(auth: &crate::config::file::CodeHostAuth) -> Credentials {
    use crate::config::file::CodeHostAuth;
    match auth {
        CodeHostAuth::OAuth(token) => Credentials::Http(Auth::Header(
            crate::ext::secrecy::ComparableSecretString::from(format!("Bearer {}", token.expose_secret())),
        )),
        // App installation tokens are short-lived and minted per-cycle by `CodeHost`;
        // git checkouts authenticate over SSH for app-backed branches instead.
        CodeHostAuth::App(_) => Credentials::None,
    }
}

fn is_older_than(timestamp: &time::OffsetDateTime, ttl: Duration) -> bool {
    let age = time::OffsetDateTime::now_utc() - *timestamp;
    age > ttl
        .try_into()
        .unwrap_or(time::Duration::MAX)
}

/// A shared, read-only view of every worker's open relevant PRs, keyed by branch
/// prefix then target branch, used to resolve stale references during expiry
/// without granting workers mutable access to one another.
#[derive(Debug, Clone, Default)]
pub struct AllPrsView {
    by_branch: HashMap<String, Vec<String>>,
}

impl AllPrsView {
    /// Build a view from every worker's currently cached PRs.
    pub fn build<'a>(workers: impl IntoIterator<Item = &'a Worker>) -> Self {
        let mut by_branch: HashMap<String, Vec<String>> = HashMap::new();
        for worker in workers {
            for pr in worker.prs.values() {
                by_branch.entry(pr.head_ref().clone()).or_default().push(pr.base_ref().clone());
            }
        }
        Self { by_branch }
    }

    /// Whether any worker has an open PR whose head-ref is `branch` and whose
    /// base-ref is `target`.
    pub fn has_open_pr_on(&self, branch: &str, target: &str) -> bool {
        self.by_branch
            .get(branch)
            .map(|targets| targets.iter().any(|t| t == target))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::model::{Patch, PrState};

    fn pr(number: u64, head_ref: &str, base_ref: &str, title: &str, updated_at: OffsetDateTime) -> Pr {
        Pr::new(
            number,
            PrState::Open,
            head_ref,
            base_ref,
            "bot",
            "bot",
            "bot",
            title,
            vec![],
            updated_at,
        )
    }

    #[test]
    fn all_prs_view_reports_open_pr_on_branch() {
        let view = AllPrsView {
            by_branch: HashMap::from([("series/1=>bpf-next".to_string(), vec!["bpf-next".to_string()])]),
        };
        assert!(view.has_open_pr_on("series/1=>bpf-next", "bpf-next"));
        assert!(!view.has_open_pr_on("series/1=>bpf-next", "bpf"));
        assert!(!view.has_open_pr_on("series/2=>bpf-next", "bpf-next"));
    }

    #[test]
    fn is_older_than_compares_against_ttl() {
        let old = OffsetDateTime::now_utc() - time::Duration::days(15);
        assert!(is_older_than(&old, BRANCH_TTL));
        let recent = OffsetDateTime::now_utc() - time::Duration::hours(1);
        assert!(!is_older_than(&recent, BRANCH_TTL));
    }

    #[test]
    fn subject_to_branch_includes_target_suffix() {
        let series = Series::new(
            7,
            "[bpf-next] fix thing",
            1,
            vec![Patch::new("1", "fix thing")],
            None,
            "dev@example.com",
            "https://example.com/mbox",
            OffsetDateTime::UNIX_EPOCH,
        );
        let subject = Subject::new(vec![series]);
        // `Worker::subject_to_branch` is a thin wrapper around this free function
        // passing its own target; constructing a full `Worker` needs network and
        // filesystem setup exercised in cycle.rs's integration-style tests instead.
        assert_eq!(
            model::branch_ref_for_subject(&subject, "bpf-next").as_deref(),
            Some("series/7=>bpf-next")
        );
    }

    #[test]
    fn subject_to_branch_none_for_subject_with_no_series() {
        let subject = Subject::new(vec![]);
        assert_eq!(model::branch_ref_for_subject(&subject, "bpf-next"), None);
    }

    #[test]
    fn unused_pr_helper_builds_expected_shape() {
        let record = pr(1, "series/1=>b", "b", "t", OffsetDateTime::UNIX_EPOCH);
        assert_eq!(record.number(), &1);
    }
}
