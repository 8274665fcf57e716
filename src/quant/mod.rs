//! Plate quantification.
//!
//! Pipeline over one plate:
//!
//! 1. blank offset (median of kept blanks)
//! 2. standard levels from the layout, blank-corrected
//! 3. optional Auto-QC exclusions
//! 4. standard-curve fit over level means
//! 5. per-sample back-calculation within the standards' range, times dilution
//! 6. per-animal summaries, level diagnostics and outlier flags
//!
//! Everything here is a pure function of its inputs; failures surface as
//! `None` fields rather than errors.

pub mod levels;
pub mod outliers;

pub use levels::*;
pub use outliers::*;

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::domain::{
    AnimalSummary, AutoQcSuggestion, CurveFit, LevelDiagnostics, OutlierFlag, PlateLayout, QuantifyOptions,
    SampleQuantification, StandardLevelInput, WellId, WellReading, WellRole,
};
use crate::fit::{fit_standard_curve, standard_range};
use crate::math::{mean, sample_sd};

/// Everything computed for one plate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quantification {
    pub blank_offset: f64,
    /// Standard levels actually fitted (after any applied exclusions).
    pub levels: Vec<StandardLevelInput>,
    pub fit: Option<CurveFit>,
    /// `[min, max]` concentration of the usable standards.
    pub conc_range: Option<(f64, f64)>,
    pub samples: Vec<SampleQuantification>,
    pub animals: Vec<AnimalSummary>,
    pub diagnostics: Vec<LevelDiagnostics>,
    pub outliers: Vec<OutlierFlag>,
}

/// Quantify a plate.
///
/// `applied_qc` filters the standard levels before fitting; pass `None` to
/// fit every kept standard.
pub fn quantify_plate(
    readings: &BTreeMap<WellId, WellReading>,
    layout: &PlateLayout,
    opts: &QuantifyOptions,
    applied_qc: Option<&AutoQcSuggestion>,
) -> Quantification {
    let blank = blank_offset(readings, layout, opts.blank_subtraction);
    let all_levels = aggregate_standard_levels(readings, layout, blank);
    let levels = match applied_qc {
        Some(qc) => qc.apply(&all_levels),
        None => all_levels,
    };

    let fit = fit_standard_curve(&levels, opts.curve, &opts.fit);
    let conc_range = standard_range(&levels);
    debug!(
        blank,
        levels = levels.len(),
        fitted = fit.is_some(),
        "standard curve evaluated"
    );

    let samples = quantify_samples(readings, layout, blank, fit.as_ref(), conc_range);
    let animals = summarize_animals(&samples);
    let diagnostics = level_diagnostics(&levels, fit.as_ref());
    let outliers = flag_outliers(readings, layout, blank, opts.outlier_threshold);

    Quantification {
        blank_offset: blank,
        levels,
        fit,
        conc_range,
        samples,
        animals,
        diagnostics,
        outliers,
    }
}

/// Dilution factor applied to a sample: `1` when unset, non-finite or
/// non-positive.
pub fn effective_dilution(dilution_factor: Option<f64>) -> f64 {
    dilution_factor.filter(|d| d.is_finite() && *d > 0.0).unwrap_or(1.0)
}

fn quantify_samples(
    readings: &BTreeMap<WellId, WellReading>,
    layout: &PlateLayout,
    blank: f64,
    fit: Option<&CurveFit>,
    conc_range: Option<(f64, f64)>,
) -> Vec<SampleQuantification> {
    layout
        .wells
        .iter()
        .filter(|(_, a)| a.keep)
        .filter_map(|(well_id, a)| {
            let WellRole::Sample {
                animal_id,
                group,
                dilution_factor,
            } = &a.role
            else {
                return None;
            };
            let net = readings.get(well_id).and_then(WellReading::finite_net)?;
            let net_blank = net - blank;
            let dilution_factor = effective_dilution(*dilution_factor);
            let conc = match (fit, conc_range) {
                (Some(fit), Some((lo, hi))) => fit.invert(net_blank, lo, hi),
                _ => None,
            };
            Some(SampleQuantification {
                well_id: *well_id,
                animal_id: animal_id.trim().to_string(),
                group: group.as_deref().map(str::trim).filter(|g| !g.is_empty()).map(String::from),
                dilution_factor,
                net_blank,
                conc,
                conc_adjusted: conc.map(|c| c * dilution_factor),
            })
        })
        .collect()
}

/// Mean and sample SD of `conc_adjusted` per (animal, group).
///
/// Every animal appears, with `n = 0` when none of its wells could be
/// back-calculated.
pub fn summarize_animals(samples: &[SampleQuantification]) -> Vec<AnimalSummary> {
    let mut by_animal: BTreeMap<(String, Option<String>), Vec<f64>> = BTreeMap::new();
    for s in samples {
        let values = by_animal.entry((s.animal_id.clone(), s.group.clone())).or_default();
        if let Some(c) = s.conc_adjusted.filter(|c| c.is_finite()) {
            values.push(c);
        }
    }

    by_animal
        .into_iter()
        .map(|((animal_id, group), values)| AnimalSummary {
            animal_id,
            group,
            n: values.len(),
            mean: mean(&values),
            sd: sample_sd(&values),
        })
        .collect()
}
