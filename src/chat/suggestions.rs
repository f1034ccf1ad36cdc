//! Suggested follow-up questions.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::config::MAX_SUGGESTIONS;
use crate::workflow::WorkflowRole;

/// Suggestions to show when a thread is opened.
pub fn initial(stored: &[String], workflow: WorkflowRole, limit: usize) -> Vec<String> {
    let limit = limit.min(MAX_SUGGESTIONS);
    if stored.is_empty() {
        workflow
            .default_suggestions()
            .iter()
            .take(limit)
            .map(|s| s.to_string())
            .collect()
    } else {
        stored.iter().take(limit).cloned().collect()
    }
}

/// Suggestions after a reply: the reply's own, or a random draw from the
/// workflow's fallback pool.
pub fn after_reply<R: Rng + ?Sized>(
    from_reply: Vec<String>,
    workflow: WorkflowRole,
    limit: usize,
    rng: &mut R,
) -> Vec<String> {
    let limit = limit.min(MAX_SUGGESTIONS);
    let mut from_reply: Vec<String> = from_reply
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if from_reply.is_empty() {
        return fallback_sample(workflow.fallback_suggestions(), limit, rng);
    }
    from_reply.truncate(limit);
    from_reply
}

/// Up to `limit` distinct entries of `pool`, in random order.
pub fn fallback_sample<R: Rng + ?Sized>(pool: &[&str], limit: usize, rng: &mut R) -> Vec<String> {
    pool.choose_multiple(rng, limit.min(MAX_SUGGESTIONS))
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn fallback_is_bounded_distinct_and_from_pool() {
        let pool = WorkflowRole::Client.fallback_suggestions();
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let picked = fallback_sample(pool, 5, &mut rng);
            assert_eq!(picked.len(), 5);
            let unique: HashSet<&String> = picked.iter().collect();
            assert_eq!(unique.len(), picked.len());
            assert!(picked.iter().all(|s| pool.contains(&s.as_str())));
        }
    }

    #[test]
    fn fallback_never_exceeds_hard_cap() {
        let mut rng = StdRng::seed_from_u64(7);
        let picked = fallback_sample(WorkflowRole::Lawyer.fallback_suggestions(), 50, &mut rng);
        assert_eq!(picked.len(), MAX_SUGGESTIONS);
    }

    #[test]
    fn reply_suggestions_win_over_fallback() {
        let mut rng = StdRng::seed_from_u64(1);
        let picked = after_reply(
            vec!["  ".to_string(), "Et ensuite ?".to_string()],
            WorkflowRole::Client,
            5,
            &mut rng,
        );
        assert_eq!(picked, vec!["Et ensuite ?".to_string()]);

        let empty = after_reply(Vec::new(), WorkflowRole::Client, 3, &mut rng);
        assert_eq!(empty.len(), 3);
    }

    #[test]
    fn initial_prefers_stored_questions() {
        let stored = vec!["Q1".to_string(), "Q2".to_string()];
        assert_eq!(initial(&stored, WorkflowRole::Lawyer, 5), stored);

        let defaults = initial(&[], WorkflowRole::Lawyer, 5);
        assert_eq!(
            defaults.first().map(String::as_str),
            WorkflowRole::Lawyer.default_suggestions().first().copied()
        );
    }
}
