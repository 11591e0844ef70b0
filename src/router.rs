//! Maps patch series to candidate target branches via the tag→branch routing
//! table, and resolves a "sticky" preference when a subject already has an
//! open, non-conflicting pull request on one of its candidates.

use std::collections::BTreeSet;

use crate::model::{self, Pr, PrState};

/// The tag→branch table: an ordered list of `(tag, branches)` entries, plus the
/// distinguished `__DEFAULT__` fallback list. Entry order expresses tag priority,
/// so this preserves the order the config file declared them in.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    entries: Vec<(String, Vec<String>)>,
    default: Vec<String>,
}

impl RoutingTable {
    /// Build a routing table from ordered tag entries and the default list.
    pub fn new(entries: Vec<(String, Vec<String>)>, default: Vec<String>) -> Self {
        Self { entries, default }
    }

    /// The tag entries, in declared priority order.
    pub fn entries(&self) -> &[(String, Vec<String>)] {
        &self.entries
    }

    /// The `__DEFAULT__` fallback branch list.
    pub fn default_branches(&self) -> &[String] {
        &self.default
    }

    /// Every branch name referenced anywhere in the table, for validating that each
    /// one names a configured branch.
    pub fn all_referenced_branches(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .flat_map(|(_, branches)| branches.iter())
            .chain(self.default.iter())
            .map(String::as_str)
    }

    /// `get_mapped_branches`: the first tag entry whose tag is present in `tags` wins;
    /// otherwise the default list (which may be empty, per B3).
    pub fn get_mapped_branches(&self, tags: &BTreeSet<String>) -> Vec<String> {
        for (tag, branches) in &self.entries {
            if tags.contains(tag) {
                return branches.clone();
            }
        }
        self.default.clone()
    }
}

/// `select_target_branches_for_subject`: narrows `mapped` to a single sticky branch
/// when exactly one of them already carries a non-conflicting open PR for this
/// subject; otherwise returns `mapped` unchanged (including when `|mapped| == 1`, per B4).
///
/// `pr_for_branch` looks up the subject's currently-open relevant PR on a candidate
/// branch, mirroring a worker's `prs` cache keyed by subject title.
pub fn select_target_branches_for_subject<'a>(
    mapped: &[String],
    pr_for_branch: impl Fn(&str) -> Option<&'a Pr>,
) -> Vec<String> {
    if mapped.len() == 1 {
        return mapped.to_vec();
    }

    let sticky: Vec<&String> = mapped
        .iter()
        .filter(|branch| {
            pr_for_branch(branch)
                .map(|pr| *pr.state() == PrState::Open && !pr.has_label(model::MERGE_CONFLICT_LABEL))
                .unwrap_or(false)
        })
        .collect();

    match sticky.as_slice() {
        [only] => vec![(*only).clone()],
        _ => mapped.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::model::Pr;

    fn open_pr(head_ref: &str, labels: Vec<&str>) -> Pr {
        Pr::new(
            1,
            PrState::Open,
            head_ref,
            "b1",
            "bot",
            "bot",
            "bot",
            "title",
            labels.into_iter().map(str::to_string).collect(),
            OffsetDateTime::UNIX_EPOCH,
        )
    }

    #[test]
    fn get_mapped_branches_uses_first_matching_tag_in_order() {
        let table = RoutingTable::new(
            vec![
                ("bpf-next".into(), vec!["bpf-next".into()]),
                ("net".into(), vec!["net".into()]),
            ],
            vec!["default".into()],
        );
        let tags: BTreeSet<String> = ["net".to_string(), "bpf-next".to_string()].into();
        assert_eq!(table.get_mapped_branches(&tags), vec!["bpf-next".to_string()]);
    }

    #[test]
    fn get_mapped_branches_falls_back_to_default() {
        let table = RoutingTable::new(vec![("net".into(), vec!["net".into()])], vec!["default".into()]);
        let tags: BTreeSet<String> = ["other".to_string()].into();
        assert_eq!(table.get_mapped_branches(&tags), vec!["default".to_string()]);
    }

    #[test]
    fn get_mapped_branches_returns_empty_when_no_default_configured() {
        let table = RoutingTable::new(vec![("net".into(), vec!["net".into()])], vec![]);
        let tags: BTreeSet<String> = ["other".to_string()].into();
        assert!(table.get_mapped_branches(&tags).is_empty());
    }

    #[test]
    fn select_target_branches_returns_input_unchanged_for_single_candidate() {
        let mapped = vec!["b1".to_string()];
        let result = select_target_branches_for_subject(&mapped, |_| None);
        assert_eq!(result, mapped);
    }

    #[test]
    fn select_target_branches_prefers_sticky_non_conflicting_pr() {
        let mapped = vec!["b1".to_string(), "b2".to_string()];
        let pr = open_pr("series/1=>b2", vec![]);
        let result = select_target_branches_for_subject(&mapped, |b| (b == "b2").then_some(&pr));
        assert_eq!(result, vec!["b2".to_string()]);
    }

    #[test]
    fn select_target_branches_ignores_conflicting_sticky_pr() {
        let mapped = vec!["b1".to_string(), "b2".to_string()];
        let pr = open_pr("series/1=>b2", vec![model::MERGE_CONFLICT_LABEL]);
        let result = select_target_branches_for_subject(&mapped, |b| (b == "b2").then_some(&pr));
        assert_eq!(result, mapped);
    }

    #[test]
    fn select_target_branches_returns_full_list_with_no_sticky_match() {
        let mapped = vec!["b1".to_string(), "b2".to_string()];
        let result = select_target_branches_for_subject(&mapped, |_| None);
        assert_eq!(result, mapped);
    }
}
