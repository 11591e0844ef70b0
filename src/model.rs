//! Core domain types shared by every component: series and subjects observed
//! from the tracker, the branch-reference grammar used to join a series to a
//! pull request, and the pull request record itself.

use std::collections::BTreeSet;

use getset::Getters;
use once_cell::sync::Lazy;
use regex::Regex;
use time::OffsetDateTime;

/// The literal token separating a series id from its bracketed prefix in a branch ref.
pub const SERIES_ID_SEPARATOR: &str = "/";

/// The literal token separating the series portion of a branch ref from its target branch.
pub const SERIES_TARGET_SEPARATOR: &str = "=>";

/// The distinguished tag-table entry used when no configured tag matches a series.
pub const DEFAULT_BRANCH_KEY: &str = "__DEFAULT__";

/// Label attached to a PR whose series failed to apply on every candidate branch.
pub const MERGE_CONFLICT_LABEL: &str = "merge-conflict";

/// A single patch within a series.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct Patch {
    /// The tracker's message-id for this patch.
    id: String,
    /// The patch's subject-line summary (tags not stripped).
    summary: String,
}

impl Patch {
    /// Construct a new patch record.
    pub fn new(id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            summary: summary.into(),
        }
    }

    /// The summary with any leading bracket-tag prefixes (e.g. `[bpf-next,v2]`) stripped,
    /// lowercased for case-insensitive comparison.
    pub fn normalized_summary(&self) -> String {
        strip_tag_prefixes(&self.summary).to_lowercase()
    }
}

/// Strip any number of leading `[...]` bracket groups (and surrounding whitespace) from a title.
pub fn strip_tag_prefixes(title: &str) -> String {
    static PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\[[^\]]*\]\s*").expect("valid regex"));
    let mut remaining = title;
    loop {
        match PREFIX.find(remaining) {
            Some(m) if m.start() == 0 => remaining = &remaining[m.end()..],
            _ => break,
        }
    }
    remaining.trim().to_string()
}

/// Extract the set of bracket-tag prefixes from a title, e.g. `"[bpf-next,v2] foo"` yields
/// `{"bpf-next", "v2"}`.
pub fn extract_tags(title: &str) -> BTreeSet<String> {
    static PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\[([^\]]*)\]\s*").expect("valid regex"));
    let mut remaining = title;
    let mut tags = BTreeSet::new();
    while let Some(caps) = PREFIX.captures(remaining) {
        let inner = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        for tag in inner.split(',') {
            let tag = tag.trim();
            if !tag.is_empty() {
                tags.insert(tag.to_string());
            }
        }
        let whole = caps.get(0).expect("capture 0 always matches");
        remaining = &remaining[whole.end()..];
    }
    tags
}

/// A versioned, ordered bundle of patches posted to the tracker.
///
/// Immutable once observed: a series is never mutated in place, only superseded
/// by a later version with a new [`Series::id`].
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct Series {
    /// The tracker's stable numeric id for this series.
    id: u64,
    /// The human title ("name") of the series, as posted (tags not stripped).
    title: String,
    /// The version of this series within its subject, e.g. `2` for a `v2` resend.
    version: u32,
    /// The ordered patches making up this series.
    patches: Vec<Patch>,
    /// The optional cover-letter message-id.
    cover_letter: Option<String>,
    /// The submitter's email address.
    submitter_email: String,
    /// The mailbox URL the worker fetches to obtain a `git am`-able mbox.
    mbox_url: String,
    /// When the tracker last considered this series updated.
    last_updated: OffsetDateTime,
}

impl Series {
    /// Construct a new series record.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        title: impl Into<String>,
        version: u32,
        patches: Vec<Patch>,
        cover_letter: Option<String>,
        submitter_email: impl Into<String>,
        mbox_url: impl Into<String>,
        last_updated: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            version,
            patches,
            cover_letter,
            submitter_email: submitter_email.into(),
            mbox_url: mbox_url.into(),
            last_updated,
        }
    }

    /// The normalized title of this series' subject: tags stripped.
    pub fn normalized_title(&self) -> String {
        strip_tag_prefixes(&self.title)
    }

    /// The tags carried by this series' title.
    pub fn tags(&self) -> BTreeSet<String> {
        extract_tags(&self.title)
    }
}

/// The equivalence class of all observed series sharing a normalized title.
///
/// Built fresh from the tracker each cycle; never persisted across cycles.
#[derive(Debug, Clone, Default)]
pub struct Subject {
    series: Vec<Series>,
}

impl Subject {
    /// Construct a subject from a non-empty set of series sharing a normalized title.
    pub fn new(series: Vec<Series>) -> Self {
        Self { series }
    }

    /// The identity key of this subject: the normalized title shared by all its series.
    pub fn name(&self) -> Option<String> {
        self.series.first().map(Series::normalized_title)
    }

    /// The newest series by version, ties broken by last-updated then id.
    pub fn latest_series(&self) -> Option<&Series> {
        self.series.iter().max_by(|a, b| {
            a.version()
                .cmp(b.version())
                .then_with(|| a.last_updated().cmp(b.last_updated()))
                .then_with(|| a.id().cmp(b.id()))
        })
    }

    /// The union of tags across all versions of this subject.
    pub fn all_tags(&self) -> BTreeSet<String> {
        self.series.iter().flat_map(Series::tags).collect()
    }

    /// All observed series for this subject, oldest first by the order they were added.
    pub fn series(&self) -> &[Series] {
        &self.series
    }
}

/// A parsed branch reference of the form `series/<id>=><target>`.
///
/// Parsing is total (see [`parse_branch_ref`]): every input string yields a record,
/// never an error. Malformed or target-less refs are "unknown format" and carry
/// `target: None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRef {
    /// Everything before the target separator, or the whole string if the separator is absent.
    pub series: String,
    /// Everything after the target separator, if present. May itself contain further
    /// occurrences of the separator.
    pub target: Option<String>,
    /// The integer series id, parsed from the segment following the last id separator in
    /// `series`, only when that segment is a pure non-negative integer.
    pub series_id: Option<u64>,
}

impl BranchRef {
    /// Whether this ref is in the recognized `series/<id>=><target>` shape: it has both
    /// a target and a parsed series id.
    pub fn is_well_formed(&self) -> bool {
        self.target.is_some() && self.series_id.is_some()
    }
}

/// Parse a branch reference string. Total: never fails, per invariant I3.
pub fn parse_branch_ref(input: &str) -> BranchRef {
    let (series, target) = match input.split_once(SERIES_TARGET_SEPARATOR) {
        Some((series, target)) => (series.to_string(), Some(target.to_string())),
        None => (input.to_string(), None),
    };

    let series_id = series
        .rsplit_once(SERIES_ID_SEPARATOR)
        .and_then(|(_, tail)| tail.parse::<u64>().ok());

    BranchRef {
        series,
        target,
        series_id,
    }
}

/// Build the canonical branch ref string for a series id and target branch.
pub fn format_branch_ref(series_id: u64, target: &str) -> String {
    format!("series{SERIES_ID_SEPARATOR}{series_id}{SERIES_TARGET_SEPARATOR}{target}")
}

/// The deterministic branch ref a subject maps to on a given target: the first known
/// series id of `subject`, formatted as `series/<id>=><target>`. `None` if the subject
/// carries no series at all.
pub fn branch_ref_for_subject(subject: &Subject, target: &str) -> Option<String> {
    subject.series().first().map(|series| format_branch_ref(*series.id(), target))
}

/// Whether two branch refs name the same series but different target branches.
///
/// Per I4: `same_series_different_target(a, b)` holds iff their parsed `series`
/// components are equal and their parsed `target` components differ.
pub fn same_series_different_target(a: &str, b: &str) -> bool {
    let a = parse_branch_ref(a);
    let b = parse_branch_ref(b);
    a.series == b.series && a.target != b.target
}

/// Whether a pull request is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrState {
    /// The PR is currently open.
    Open,
    /// The PR has been closed (merged or not).
    Closed,
}

/// A pull request on the code host, as observed by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct Pr {
    /// The code host's PR number.
    number: u64,
    /// The PR's state.
    state: PrState,
    /// The head-ref: a branch reference of the form `series/<id>=><target>`.
    head_ref: String,
    /// The base-ref: the name of the target branch this PR is opened against.
    base_ref: String,
    /// The login that authored the PR.
    author: String,
    /// The account owning the head-ref's repository.
    head_owner: String,
    /// The account owning the base-ref's repository.
    base_owner: String,
    /// The PR's title, which the core keeps in sync with the subject's name.
    title: String,
    /// Labels currently applied to the PR.
    labels: Vec<String>,
    /// When the PR was last updated, used by expiry and closed-PR lookups.
    updated_at: OffsetDateTime,
}

impl Pr {
    /// Construct a new PR record.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        number: u64,
        state: PrState,
        head_ref: impl Into<String>,
        base_ref: impl Into<String>,
        author: impl Into<String>,
        head_owner: impl Into<String>,
        base_owner: impl Into<String>,
        title: impl Into<String>,
        labels: Vec<String>,
        updated_at: OffsetDateTime,
    ) -> Self {
        Self {
            number,
            state,
            head_ref: head_ref.into(),
            base_ref: base_ref.into(),
            author: author.into(),
            head_owner: head_owner.into(),
            base_owner: base_owner.into(),
            title: title.into(),
            labels,
            updated_at,
        }
    }

    /// Whether this PR carries the given label.
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Whether this PR is owned entirely by `bot` (author, head-owner, base-owner) and
    /// opened against `target`, per §3's PR ownership invariant. Does not constrain state.
    pub fn is_owned_by(&self, bot: &str, target: &str) -> bool {
        self.author == bot && self.head_owner == bot && self.base_owner == bot && self.base_ref == target
    }

    /// [`Pr::is_owned_by`], additionally requiring the PR be open.
    pub fn is_relevant_open(&self, bot: &str, target: &str) -> bool {
        self.state == PrState::Open && self.is_owned_by(bot, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_strategy::proptest;

    #[test]
    fn strips_single_tag_prefix() {
        assert_eq!(strip_tag_prefixes("[bpf-next] foo bar"), "foo bar");
    }

    #[test]
    fn strips_multiple_tag_prefixes() {
        assert_eq!(strip_tag_prefixes("[bpf-next][RFC] foo bar"), "foo bar");
    }

    #[test]
    fn leaves_untagged_title_unchanged() {
        assert_eq!(strip_tag_prefixes("foo bar"), "foo bar");
    }

    #[test]
    fn extracts_comma_separated_tags() {
        let tags = extract_tags("[bpf-next,v2] foo bar");
        assert!(tags.contains("bpf-next"));
        assert!(tags.contains("v2"));
    }

    #[test]
    fn parse_branch_ref_is_total_on_empty_string() {
        let parsed = parse_branch_ref("");
        assert_eq!(parsed.series, "");
        assert_eq!(parsed.target, None);
        assert_eq!(parsed.series_id, None);
    }

    #[test]
    fn parse_branch_ref_without_target_is_unknown_format() {
        let parsed = parse_branch_ref("not-a-branch-ref");
        assert_eq!(parsed.target, None);
        assert!(!parsed.is_well_formed());
    }

    #[test]
    fn parse_branch_ref_extracts_series_id() {
        let parsed = parse_branch_ref("series/42=>bpf-next");
        assert_eq!(parsed.series, "series/42");
        assert_eq!(parsed.series_id, Some(42));
        assert_eq!(parsed.target.as_deref(), Some("bpf-next"));
        assert!(parsed.is_well_formed());
    }

    #[test]
    fn parse_branch_ref_target_may_contain_further_separators() {
        let parsed = parse_branch_ref("series/1=>a=>b");
        assert_eq!(parsed.target.as_deref(), Some("a=>b"));
    }

    #[test]
    fn same_series_different_target_true_for_matching_series() {
        assert!(same_series_different_target(
            "series/1=>b1",
            "series/1=>b2"
        ));
    }

    #[test]
    fn same_series_different_target_false_for_same_target() {
        assert!(!same_series_different_target(
            "series/1=>b1",
            "series/1=>b1"
        ));
    }

    #[test]
    fn same_series_different_target_false_for_different_series() {
        assert!(!same_series_different_target(
            "series/1=>b1",
            "series/2=>b1"
        ));
    }

    #[proptest]
    fn round_trips_for_any_id_and_target(#[strategy(0u64..1_000_000)] id: u64, target: String) {
        let target = target.replace("=>", "");
        if target.is_empty() {
            return;
        }
        let input = format!("series/{id}=>{target}");
        let parsed = parse_branch_ref(&input);
        assert_eq!(parsed.series, format!("series/{id}"));
        assert_eq!(parsed.series_id, Some(id));
        assert_eq!(parsed.target.as_deref(), Some(target.as_str()));
    }
}
