//! Enforces the "at most one open PR per series" invariant once a subject's
//! winning target branch has been decided for a cycle.

use error_stack::{Report, ResultExt};

use crate::{model, worker::Worker};

/// Errors closing a duplicate pull request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Closing a duplicate PR on the code host failed.
    #[error("close duplicate pull request")]
    CodeHost,
}

/// For every worker, close any open PR whose head-ref names the same series as
/// `winning`'s but a different target branch, and drop it from that worker's
/// cache. Leaves `winning` itself untouched, even if one of the workers happens
/// to hold it.
#[tracing::instrument(skip(workers, winning))]
pub async fn close_existing_prs_for_series(workers: &mut [Worker], winning: &model::Pr) -> Result<(), Report<Error>> {
    for worker in workers.iter_mut() {
        let duplicates: Vec<model::Pr> = worker
            .prs()
            .values()
            .filter(|candidate| candidate.number() != winning.number())
            .filter(|candidate| model::same_series_different_target(winning.head_ref(), candidate.head_ref()))
            .cloned()
            .collect();

        for duplicate in duplicates {
            worker
                .close_pr(*duplicate.number())
                .await
                .change_context(Error::CodeHost)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::model::PrState;

    fn pr(number: u64, head_ref: &str, base_ref: &str) -> model::Pr {
        model::Pr::new(
            number,
            PrState::Open,
            head_ref,
            base_ref,
            "bot",
            "bot",
            "bot",
            "t",
            vec![],
            OffsetDateTime::UNIX_EPOCH,
        )
    }

    #[test]
    fn duplicate_detection_matches_same_series_different_target() {
        let winning = pr(1, "series/1=>bpf-next", "bpf-next");
        let duplicate = pr(2, "series/1=>bpf", "bpf");
        let unrelated = pr(3, "series/2=>bpf", "bpf");
        assert!(model::same_series_different_target(winning.head_ref(), duplicate.head_ref()));
        assert!(!model::same_series_different_target(winning.head_ref(), unrelated.head_ref()));
    }
}
