//! Drives one synchronization cycle end-to-end: mirrors every eligible
//! worker, fetches recently active subjects from the tracker, runs the
//! per-subject apply/reconcile algorithm, sweeps orphaned pull requests, and
//! expires stale branches and PRs. Ordering within a cycle is fixed: mirror
//! → fetch subjects → per-subject → orphan sweep → expiry.

use std::collections::{BTreeSet, HashMap, HashSet};

use error_stack::{Report, ResultExt};
use reqwest::Client;
use time::OffsetDateTime;
use tracing::warn;

use crate::{
    code_host::{self, CiOutcome},
    config::file::EmailConfig,
    logs,
    model::{self, Pr, Series},
    notify::{self, NotificationOutcome},
    reconciler,
    router::{self, RoutingTable},
    stats::Stats,
    tracker::Tracker,
    worker::{ApplyOutcome, CheckoutOutcome, Worker},
};

/// Errors that abort a cycle outright, as opposed to per-subject or per-worker
/// failures which are logged and routed around (§7: only configuration errors
/// and the initial subject fetch are cycle-fatal).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Fetching the set of recently active series from the tracker failed; with
    /// no subject list there is nothing left for the cycle to do.
    #[error("fetch recent series from tracker")]
    Tracker,
}

/// What a completed (or early-exited) cycle hands back to the supervisor.
#[derive(Debug, Clone, Copy)]
pub struct CycleOutcome {
    /// The `since` timestamp the next cycle's tracker search should use.
    pub next_since: OffsetDateTime,
}

/// Run one full cycle against `workers`.
///
/// `since` bounds the tracker search window; on success the returned
/// [`CycleOutcome::next_since`] advances to this cycle's start time, per
/// the tracker's "may advance to cycle start" allowance (§4.1).
#[tracing::instrument(skip_all)]
pub async fn run_cycle(
    workers: &mut [Worker],
    tracker: &Tracker,
    router: &RoutingTable,
    project: &str,
    email: Option<&EmailConfig>,
    stats: &mut Stats,
    since: OffsetDateTime,
) -> Result<CycleOutcome, Report<Error>> {
    let cycle_start = now();
    stats.drop_counters();

    let eligible: Vec<usize> = (0..workers.len()).filter(|&i| workers[i].can_do_sync()).collect();
    if eligible.is_empty() {
        warn!("no workers are ready to sync this cycle");
        return Ok(CycleOutcome { next_since: since });
    }
    let eligible: HashSet<usize> = eligible.into_iter().collect();

    // 3. Mirror every eligible worker and refresh its PR cache.
    for &idx in &eligible {
        let worker = &mut workers[idx];
        if let Err(err) = sync_one_worker(worker).await {
            warn!("worker '{}' failed to sync this cycle: {err:?}", worker.target());
        }
    }
    let mirror_done = now();
    stats.set_counter("mirror_duration_ms", elapsed_ms(cycle_start, mirror_done));

    // 5. Refresh each worker's end-to-end test overlay branch.
    for &idx in &eligible {
        let worker = &mut workers[idx];
        if let Err(err) = worker.update_e2e_test_branch_and_update_pr().await {
            warn!("worker '{}' failed to update its e2e branch: {err:?}", worker.target());
        }
    }

    // 6. Fetch recently active subjects.
    let pw_start = now();
    let recent = tracker
        .search_recent_series(since)
        .await
        .change_context(Error::Tracker)?;
    let mut subjects = Vec::new();
    for series in representative_series_by_title(recent) {
        match tracker.get_subject_by_series(&series).await {
            Ok(subject) => subjects.push(subject),
            Err(err) => warn!("fetch subject for series {}: {err:?}", series.id()),
        }
    }
    let pw_done = now();
    stats.set_counter("pw_fetch_duration_ms", elapsed_ms(pw_start, pw_done));

    let branch_index: HashMap<String, usize> = eligible
        .iter()
        .map(|&i| (workers[i].target().to_string(), i))
        .collect();

    let http = Client::new();
    let mut observed: BTreeSet<String> = BTreeSet::new();

    // 8. Per-subject loop.
    let patch_start = now();
    for subject in &subjects {
        let Some(title) = subject.name() else { continue };
        observed.insert(title.clone());
        let Some(series) = subject.latest_series() else { continue };

        let mapped = router.get_mapped_branches(&subject.all_tags());
        if mapped.is_empty() {
            continue;
        }
        let targets = router::select_target_branches_for_subject(&mapped, |branch| {
            branch_index.get(branch).and_then(|&i| workers[i].prs().get(&title))
        });
        let Some(last) = targets.last().cloned() else { continue };

        for branch in &targets {
            let Some(&idx) = branch_index.get(branch) else {
                warn!("routing table mapped subject '{title}' to unconfigured branch '{branch}'");
                continue;
            };
            let Some(pr_branch) = workers[idx].subject_to_branch(subject) else {
                continue;
            };

            let outcome = match workers[idx].try_apply_mailbox_series(&pr_branch, series, tracker).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!("apply series {} on '{branch}' failed: {err:?}", series.id());
                    continue;
                }
            };
            let applied = matches!(outcome, ApplyOutcome::Applied);
            if !applied && branch != &last {
                continue;
            }

            let pr = match workers[idx].checkout_and_patch(&pr_branch, series).await {
                Ok(CheckoutOutcome::EmptyDiff) => {
                    stats.increment_counter("empty_pr", true).ok();
                    break;
                }
                Ok(CheckoutOutcome::NoPr) => break,
                Ok(CheckoutOutcome::Pr(pr)) => *pr,
                Err(err) => {
                    warn!("checkout_and_patch for series {} on '{branch}' failed: {err:?}", series.id());
                    break;
                }
            };

            if !applied {
                if let Err(err) = workers[idx].mark_conflicted(&pr).await {
                    warn!("mark PR #{} conflicted: {err:?}", pr.number());
                }
                if let Some(email) = email {
                    notify_conflict(&workers[idx], &pr, series, branch, email).await;
                }
            }

            if let Err(err) = workers[idx].sync_checks(&pr, series, tracker).await {
                warn!("sync_checks for PR #{}: {err:?}", pr.number());
            }
            if let Some(email) = email {
                notify_ci_result(&workers[idx], &pr, series, branch, &http, project, email).await;
            }

            if let Err(err) = reconciler::close_existing_prs_for_series(workers, &pr).await {
                warn!("close duplicate PRs for series {}: {err:?}", series.id());
            }
            break;
        }
    }
    let patch_done = now();
    stats.set_counter("patch_and_update_duration_ms", elapsed_ms(patch_start, patch_done));

    // 9. Orphaned-PR sweep.
    for &idx in &eligible {
        let snapshot: Vec<(String, Pr)> = workers[idx].prs().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        for (subject_name, pr) in snapshot {
            if observed.contains(&subject_name) {
                continue;
            }
            let parsed = model::parse_branch_ref(pr.head_ref());
            if !parsed.is_well_formed() {
                warn!("orphaned PR #{} has an unparsable head-ref '{}'", pr.number(), pr.head_ref());
                continue;
            }
            let series_id = parsed.series_id.expect("well-formed ref carries a series id");

            let series = match tracker.get_series_by_id(series_id).await {
                Ok(series) => series,
                Err(err) => {
                    warn!("fetch series {series_id} for orphaned PR #{}: {err:?}", pr.number());
                    continue;
                }
            };
            let subject = match tracker.get_subject_by_series(&series).await {
                Ok(subject) => subject,
                Err(err) => {
                    warn!("fetch subject for series {series_id}: {err:?}");
                    continue;
                }
            };

            let fresh_title = subject.name().unwrap_or_else(|| series.normalized_title());
            if fresh_title != *pr.title() {
                if let Err(err) = workers[idx].rename_pr(&pr, &fresh_title).await {
                    warn!("rename orphaned PR #{}: {err:?}", pr.number());
                }
            }

            let Some(pr_branch) = workers[idx].subject_to_branch(&subject) else { continue };
            let latest = subject.latest_series().cloned().unwrap_or(series);

            match workers[idx].checkout_and_patch(&pr_branch, &latest).await {
                Ok(CheckoutOutcome::EmptyDiff) => {
                    stats.increment_counter("empty_pr", true).ok();
                }
                Ok(CheckoutOutcome::NoPr) => {}
                Ok(CheckoutOutcome::Pr(pr)) => {
                    if let Err(err) = workers[idx].sync_checks(&pr, &latest, tracker).await {
                        warn!("sync_checks for orphaned PR #{}: {err:?}", pr.number());
                    }
                }
                Err(err) => warn!("checkout_and_patch for orphaned PR #{}: {err:?}", pr.number()),
            }
        }
    }

    // 10. Expiry and rate-limit telemetry.
    let all_prs = crate::worker::AllPrsView::build(workers.iter());
    for &idx in &eligible {
        if let Err(err) = workers[idx].expire_branches(&all_prs).await {
            warn!("expire_branches for '{}': {err:?}", workers[idx].target());
        }
        if let Err(err) = workers[idx].expire_user_prs(&observed).await {
            warn!("expire_user_prs for '{}': {err:?}", workers[idx].target());
        }
    }
    for &idx in &eligible {
        match workers[idx].rate_limit_remaining().await {
            Ok(remaining) => {
                stats.set_counter("rate_limit_remaining", remaining as i64);
                break;
            }
            Err(err) => warn!("sample rate-limit remaining from '{}': {err:?}", workers[idx].target()),
        }
    }

    // 11. Terminal timings and counters.
    let cycle_done = now();
    stats.set_counter("full_cycle_duration_ms", elapsed_ms(cycle_start, cycle_done));
    let prs_total: i64 = eligible.iter().map(|&i| workers[i].prs().len() as i64).sum();
    stats.set_counter("prs_total", prs_total);

    Ok(CycleOutcome { next_since: cycle_start })
}

async fn sync_one_worker(worker: &mut Worker) -> Result<(), Report<crate::worker::Error>> {
    worker.fetch_repo_branch().await?;
    worker.get_pulls().await?;
    worker.do_sync().await?;
    worker.clear_closed_pr_cache();
    Ok(())
}

async fn notify_conflict(worker: &Worker, pr: &Pr, series: &Series, target: &str, email: &EmailConfig) {
    let Ok(repo) = code_host::RepoId::parse(worker.repo_url()) else { return };
    let pr_url = format!("https://github.com/{repo}/pull/{}", pr.number());
    let message = notify::compose_message(series, target, &pr_url, &NotificationOutcome::Conflict, email, notify::DEFAULT_MIME_BOUNDARY);
    if let Err(err) = notify::send(&message, series.submitter_email(), email).await {
        warn!("send conflict notification for PR #{}: {err:?}", pr.number());
    }
}

async fn notify_ci_result(worker: &Worker, pr: &Pr, series: &Series, target: &str, http: &Client, project: &str, email: &EmailConfig) {
    let outcome = match worker.check_status(pr).await {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!("fetch CI status for PR #{}: {err:?}", pr.number());
            return;
        }
    };
    let notification = match outcome {
        CiOutcome::Pending => return,
        CiOutcome::Success => NotificationOutcome::Success,
        CiOutcome::Failure { log_url } => {
            let raw_log = fetch_raw_log(http, log_url.as_deref()).await;
            let log_excerpt = logs::extractor_for_project(project).extract(&raw_log);
            NotificationOutcome::Failure { log_excerpt }
        }
    };

    let Ok(repo) = code_host::RepoId::parse(worker.repo_url()) else { return };
    let pr_url = format!("https://github.com/{repo}/pull/{}", pr.number());
    let message = notify::compose_message(series, target, &pr_url, &notification, email, notify::DEFAULT_MIME_BOUNDARY);
    if let Err(err) = notify::send(&message, series.submitter_email(), email).await {
        warn!("send CI-result notification for PR #{}: {err:?}", pr.number());
    }
}

async fn fetch_raw_log(http: &Client, url: Option<&str>) -> String {
    let Some(url) = url else { return String::new() };
    match http.get(url).send().await {
        Ok(response) => response.text().await.unwrap_or_default(),
        Err(err) => {
            warn!("fetch CI log from {url}: {err:?}");
            String::new()
        }
    }
}

/// Keep the first-observed series for each distinct subject title, preserving
/// the tracker's returned order. Used to avoid calling `get_subject_by_series`
/// once per series version when several versions of the same subject appear
/// in the same search window.
fn representative_series_by_title(series: Vec<Series>) -> Vec<Series> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for s in series {
        if seen.insert(s.normalized_title()) {
            result.push(s);
        }
    }
    result
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

fn elapsed_ms(start: OffsetDateTime, end: OffsetDateTime) -> i64 {
    (end - start).whole_milliseconds().try_into().unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Patch;

    fn series(id: u64, title: &str) -> Series {
        Series::new(id, title, 1, vec![Patch::new("1", title)], None, "dev@example.com", "https://example.com/mbox", OffsetDateTime::UNIX_EPOCH)
    }

    #[test]
    fn representative_series_keeps_first_per_title() {
        let input = vec![
            series(1, "[bpf-next] fix thing"),
            series(2, "[bpf-next,v2] fix thing"),
            series(3, "[net] other thing"),
        ];
        let result = representative_series_by_title(input);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].id(), &1);
        assert_eq!(result[1].id(), &3);
    }

    #[test]
    fn elapsed_ms_is_non_negative_for_ordered_timestamps() {
        let start = OffsetDateTime::UNIX_EPOCH;
        let end = start + time::Duration::milliseconds(150);
        assert_eq!(elapsed_ms(start, end), 150);
    }
}
