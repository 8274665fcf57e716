//! Standard-curve Auto-QC: greedy search for replicate exclusions and level
//! drops that improve the fit.
//!
//! Each step enumerates candidate moves from the current exclusion set:
//!
//! - exclude one replicate of a level that still has more than one included
//!   replicate (while fewer than `max_excluded_wells` wells are excluded)
//! - drop one whole level (while fewer than `max_dropped_levels` are dropped)
//!
//! Every candidate is refitted and scored as
//!
//! ```text
//! score = r2 - excluded·replicate_penalty - dropped·level_penalty
//! ```
//!
//! and the best one is accepted only if it beats the current score by more
//! than `min_score_improve`. The search is greedy: interacting exclusions are
//! not explored exhaustively.
//!
//! Candidates are pure functions of an immutable exclusion snapshot, so each
//! batch is evaluated in parallel.

use std::collections::BTreeSet;

use rayon::prelude::*;
use tracing::debug;

use crate::domain::{
    AutoQcOptions, AutoQcSuggestion, CurveKind, FitSummary, QcAction, StandardLevelInput, WellId,
};
use crate::fit::fit_standard_curve;

#[derive(Debug, Clone, Default)]
struct Exclusions {
    wells: BTreeSet<WellId>,
    levels: BTreeSet<String>,
}

#[derive(Debug, Clone)]
enum Move {
    ExcludeReplicate { level: String, well_id: WellId },
    DropLevel { level: String },
}

#[derive(Debug, Clone)]
struct Candidate {
    idx: usize,
    mv: Move,
    exclusions: Exclusions,
    summary: FitSummary,
    score: f64,
}

impl Exclusions {
    fn with(&self, mv: &Move) -> Exclusions {
        let mut next = self.clone();
        match mv {
            Move::ExcludeReplicate { well_id, .. } => {
                next.wells.insert(*well_id);
            }
            Move::DropLevel { level } => {
                next.levels.insert(level.clone());
            }
        }
        next
    }

    fn apply(&self, levels: &[StandardLevelInput]) -> Vec<StandardLevelInput> {
        levels
            .iter()
            .filter(|l| !self.levels.contains(l.level.trim()))
            .map(|l| StandardLevelInput {
                level: l.level.clone(),
                conc: l.conc,
                replicates: l
                    .replicates
                    .iter()
                    .filter(|r| !self.wells.contains(&r.well_id))
                    .cloned()
                    .collect(),
            })
            .collect()
    }
}

impl AutoQcSuggestion {
    /// Filter level inputs by this suggestion: dropped levels disappear,
    /// excluded replicates are removed from their level.
    pub fn apply(&self, levels: &[StandardLevelInput]) -> Vec<StandardLevelInput> {
        let exclusions = Exclusions {
            wells: self.excluded_well_ids.iter().copied().collect(),
            levels: self.dropped_levels.iter().map(|l| l.trim().to_string()).collect(),
        };
        exclusions.apply(levels)
    }
}

/// Suggest exclusions that improve the standard curve.
///
/// Returns an empty suggestion with `baseline: None` when no baseline fit is
/// possible.
pub fn suggest_standard_curve_exclusions(
    levels: &[StandardLevelInput],
    curve: CurveKind,
    opts: &AutoQcOptions,
) -> AutoQcSuggestion {
    let levels = normalize_levels(levels);
    let mut exclusions = Exclusions::default();

    let Some(baseline) = evaluate(&levels, &exclusions, curve, opts) else {
        debug!(levels = levels.len(), "auto-qc: no baseline fit");
        return AutoQcSuggestion::default();
    };

    let mut current = baseline;
    let mut current_score = score(&baseline, &exclusions, opts);
    let mut actions = Vec::new();

    for _ in 0..opts.max_actions {
        let moves = enumerate_moves(&levels, &exclusions, opts);
        if moves.is_empty() {
            break;
        }

        let candidates: Vec<Candidate> = moves
            .into_par_iter()
            .enumerate()
            .filter_map(|(idx, mv)| {
                let next = exclusions.with(&mv);
                let summary = evaluate(&levels, &next, curve, opts)?;
                let s = score(&summary, &next, opts);
                s.is_finite().then_some(Candidate {
                    idx,
                    mv,
                    exclusions: next,
                    summary,
                    score: s,
                })
            })
            .collect();

        // Deterministic selection: highest score; break ties by enumeration order.
        let Some(best) = candidates
            .into_iter()
            .reduce(|best, c| if c.score > best.score || (c.score == best.score && c.idx < best.idx) { c } else { best })
        else {
            break;
        };

        if !(best.score > current_score + opts.min_score_improve) {
            break;
        }

        let action = describe(&best.mv, current.r2, best.summary.r2);
        debug!(reason = action.reason(), score = best.score, "auto-qc: accepted");
        actions.push(action);

        exclusions = best.exclusions;
        current = best.summary;
        current_score = best.score;
    }

    let dropped_levels = levels
        .iter()
        .filter(|l| exclusions.levels.contains(&l.level))
        .map(|l| l.level.clone())
        .collect();

    AutoQcSuggestion {
        excluded_well_ids: exclusions.wells.into_iter().collect(),
        dropped_levels,
        actions,
        baseline: Some(baseline),
        suggested: Some(current),
    }
}

/// Trim labels, drop non-finite replicate values and unusable levels.
fn normalize_levels(levels: &[StandardLevelInput]) -> Vec<StandardLevelInput> {
    levels
        .iter()
        .map(|l| StandardLevelInput {
            level: l.level.trim().to_string(),
            conc: l.conc,
            replicates: l.replicates.iter().filter(|r| r.y.is_finite()).cloned().collect(),
        })
        .filter(StandardLevelInput::is_usable)
        .collect()
}

fn evaluate(
    levels: &[StandardLevelInput],
    exclusions: &Exclusions,
    curve: CurveKind,
    opts: &AutoQcOptions,
) -> Option<FitSummary> {
    fit_standard_curve(&exclusions.apply(levels), curve, &opts.fit).map(|f| f.summary())
}

fn score(summary: &FitSummary, exclusions: &Exclusions, opts: &AutoQcOptions) -> f64 {
    summary.r2
        - exclusions.wells.len() as f64 * opts.replicate_penalty
        - exclusions.levels.len() as f64 * opts.level_penalty
}

fn enumerate_moves(levels: &[StandardLevelInput], exclusions: &Exclusions, opts: &AutoQcOptions) -> Vec<Move> {
    let mut moves = Vec::new();

    if exclusions.wells.len() < opts.max_excluded_wells {
        for l in levels.iter().filter(|l| !exclusions.levels.contains(&l.level)) {
            let included: Vec<WellId> = l
                .replicates
                .iter()
                .map(|r| r.well_id)
                .filter(|w| !exclusions.wells.contains(w))
                .collect();
            if included.len() <= 1 {
                continue;
            }
            moves.extend(included.into_iter().map(|well_id| Move::ExcludeReplicate {
                level: l.level.clone(),
                well_id,
            }));
        }
    }

    if exclusions.levels.len() < opts.max_dropped_levels {
        moves.extend(
            levels
                .iter()
                .filter(|l| !exclusions.levels.contains(&l.level))
                .map(|l| Move::DropLevel { level: l.level.clone() }),
        );
    }

    moves
}

fn describe(mv: &Move, r2_before: f64, r2_after: f64) -> QcAction {
    let delta = r2_after - r2_before;
    match mv {
        Move::ExcludeReplicate { level, well_id } => QcAction::ExcludeReplicate {
            level: level.clone(),
            well_id: *well_id,
            reason: format!(
                "Excluding replicate {well_id} of {level} changes R² from {r2_before:.4} to {r2_after:.4} (Δ {delta:+.4})."
            ),
        },
        Move::DropLevel { level } => QcAction::DropLevel {
            level: level.clone(),
            reason: format!(
                "Dropping level {level} changes R² from {r2_before:.4} to {r2_after:.4} (Δ {delta:+.4})."
            ),
        },
    }
}
