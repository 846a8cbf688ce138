//! Program-level score aggregation.
//!
//! Recomputation is total: every call rebuilds domain, rubric, and overall
//! scores from the complete set of scored tasks, and the caller replaces the
//! previous aggregate wholesale. Nothing here reads or writes storage.

use crate::entity::{Evaluation, Task};
use std::collections::BTreeMap;

/// One completed task paired with its recorded evaluation.
pub struct ScoredTask<'a> {
    pub task: &'a Task,
    pub evaluation: &'a Evaluation,
}

/// The recomputed program-level totals.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    /// Sum of task scores; divide by `max_score` for the weighted mean.
    pub score: f64,
    pub max_score: f64,
    pub domain_scores: BTreeMap<String, f64>,
    pub rubric_scores: BTreeMap<String, f64>,
}

/// Recompute program totals from scored tasks.
///
/// Each domain score is the simple mean over the tasks that declare that
/// domain; the overall score is the mean of task scores weighted by each
/// task's declared max score (carried as score/max sums). Rubric criteria are
/// averaged over the evaluations that carry them.
pub fn aggregate(scored: &[ScoredTask<'_>]) -> Aggregate {
    let mut score = 0.0;
    let mut max_score = 0.0;
    let mut domain_sums: BTreeMap<String, (f64, u32)> = BTreeMap::new();
    let mut rubric_sums: BTreeMap<String, (f64, u32)> = BTreeMap::new();

    for entry in scored {
        score += entry.evaluation.score;
        max_score += entry.evaluation.max_score;

        for domain in &entry.task.domains {
            if let Some(value) = entry.evaluation.domain_scores.get(domain) {
                let slot = domain_sums.entry(domain.clone()).or_insert((0.0, 0));
                slot.0 += value;
                slot.1 += 1;
            }
        }
        for (criterion, value) in &entry.evaluation.rubric_scores {
            let slot = rubric_sums.entry(criterion.clone()).or_insert((0.0, 0));
            slot.0 += value;
            slot.1 += 1;
        }
    }

    Aggregate {
        score,
        max_score,
        domain_scores: mean_map(domain_sums),
        rubric_scores: mean_map(rubric_sums),
    }
}

fn mean_map(sums: BTreeMap<String, (f64, u32)>) -> BTreeMap<String, f64> {
    sums.into_iter()
        .map(|(key, (sum, count))| (key, sum / count as f64))
        .collect()
}
