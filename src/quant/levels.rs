//! Standard levels: blank offset, aggregation from the layout, serial-dilution
//! fill and per-level diagnostics.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::domain::{
    CurveFit, LevelDiagnostics, PlateLayout, Replicate, StandardLevelInput, WellId, WellReading, WellRole,
};
use crate::error::AppError;
use crate::fit::standard_range;
use crate::math::{mean, median, sample_sd};

/// Median net absorbance of kept blank wells, or `0.0` when subtraction is
/// disabled or no blank has a finite net.
pub fn blank_offset(readings: &BTreeMap<WellId, WellReading>, layout: &PlateLayout, enabled: bool) -> f64 {
    if !enabled {
        return 0.0;
    }
    let nets: Vec<f64> = layout
        .wells
        .iter()
        .filter(|(_, a)| a.keep && a.role == WellRole::Blank)
        .filter_map(|(w, _)| readings.get(w).and_then(WellReading::finite_net))
        .collect();
    median(&nets).unwrap_or(0.0)
}

/// Group kept standard wells by their (trimmed) level label.
///
/// `y` is the blank-corrected net absorbance. Levels come out in natural label
/// order, replicates in row-major well order. A label without a concentration
/// in `layout.standards` gets `conc = NaN` and is therefore unusable.
pub fn aggregate_standard_levels(
    readings: &BTreeMap<WellId, WellReading>,
    layout: &PlateLayout,
    blank_offset: f64,
) -> Vec<StandardLevelInput> {
    let mut by_label: BTreeMap<String, Vec<Replicate>> = BTreeMap::new();

    for (well_id, assignment) in &layout.wells {
        let WellRole::Standard { standard_level } = &assignment.role else {
            continue;
        };
        let label = standard_level.trim();
        if !assignment.keep || label.is_empty() {
            continue;
        }
        let Some(net) = readings.get(well_id).and_then(WellReading::finite_net) else {
            continue;
        };
        by_label.entry(label.to_string()).or_default().push(Replicate {
            well_id: *well_id,
            y: net - blank_offset,
        });
    }

    let mut levels: Vec<StandardLevelInput> = by_label
        .into_iter()
        .map(|(level, replicates)| StandardLevelInput {
            conc: standard_conc(layout, &level).unwrap_or(f64::NAN),
            level,
            replicates,
        })
        .collect();
    levels.sort_by(|a, b| natural_cmp(&a.level, &b.level));
    levels
}

fn standard_conc(layout: &PlateLayout, label: &str) -> Option<f64> {
    layout
        .standards
        .get(label)
        .or_else(|| layout.standards.iter().find(|(k, _)| k.trim() == label).map(|(_, v)| v))
        .copied()
}

/// Assign concentrations to standard labels by serial dilution.
///
/// Labels are ordered naturally (`Std2` before `Std10`); the first receives
/// `top_conc` and each following label the previous value divided by
/// `factor`. Labels that differ only in case share a concentration.
pub fn fill_serial_dilution(labels: &[String], top_conc: f64, factor: f64) -> Result<BTreeMap<String, f64>, AppError> {
    if !(top_conc.is_finite() && top_conc > 0.0) {
        return Err(AppError::new(
            2,
            format!("Top concentration must be a positive number (got {top_conc})."),
        ));
    }
    if !(factor.is_finite() && factor > 1.0) {
        return Err(AppError::new(
            2,
            format!("Dilution factor must be greater than 1 (got {factor})."),
        ));
    }

    let mut sorted: Vec<&str> = labels.iter().map(|l| l.trim()).filter(|l| !l.is_empty()).collect();
    sorted.sort_by(|a, b| natural_cmp(a, b));
    sorted.dedup();

    // Spellings that compare equal (`Std1`, `std1`) share one dilution step.
    let mut conc = top_conc;
    let mut prev: Option<&str> = None;
    let mut out = BTreeMap::new();
    for label in sorted {
        if prev.is_some_and(|p| natural_cmp(p, label) != Ordering::Equal) {
            conc /= factor;
        }
        out.insert(label.to_string(), conc);
        prev = Some(label);
    }
    Ok(out)
}

/// Replicate statistics and back-calculation for every level.
///
/// Back-calculation inverts the level mean within the range of the usable
/// standards; recovery is `back / conc × 100`.
pub fn level_diagnostics(levels: &[StandardLevelInput], fit: Option<&CurveFit>) -> Vec<LevelDiagnostics> {
    let range = standard_range(levels);

    levels
        .iter()
        .map(|l| {
            let ys: Vec<f64> = l.replicates.iter().map(|r| r.y).filter(|y| y.is_finite()).collect();
            let m = mean(&ys);
            let sd = sample_sd(&ys);
            let cv_pct = match (m, sd) {
                (Some(m), Some(sd)) if m != 0.0 => Some(sd / m.abs() * 100.0),
                _ => None,
            };
            let back_calculated = match (fit, range, m) {
                (Some(fit), Some((lo, hi)), Some(m)) => fit.invert(m, lo, hi),
                _ => None,
            };
            let recovery_pct = back_calculated
                .filter(|_| l.conc.is_finite() && l.conc > 0.0)
                .map(|b| b / l.conc * 100.0);

            LevelDiagnostics {
                level: l.level.clone(),
                conc: l.conc,
                n: ys.len(),
                mean: m,
                sd,
                cv_pct,
                back_calculated,
                recovery_pct,
            }
        })
        .collect()
}

/// Natural ordering: digit runs compare numerically (`Std2 < Std10`).
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ra = a;
    let mut rb = b;
    loop {
        match (ra.is_empty(), rb.is_empty()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }
        let (ca, rest_a) = next_chunk(ra);
        let (cb, rest_b) = next_chunk(rb);
        let a_num = ca.starts_with(|c: char| c.is_ascii_digit());
        let b_num = cb.starts_with(|c: char| c.is_ascii_digit());
        let ord = if a_num && b_num {
            let ta = ca.trim_start_matches('0');
            let tb = cb.trim_start_matches('0');
            ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb))
        } else {
            ca.to_lowercase().cmp(&cb.to_lowercase())
        };
        if ord != Ordering::Equal {
            return ord;
        }
        ra = rest_a;
        rb = rest_b;
    }
}

fn next_chunk(s: &str) -> (&str, &str) {
    let digit = s.starts_with(|c: char| c.is_ascii_digit());
    let end = s
        .find(|c: char| c.is_ascii_digit() != digit)
        .unwrap_or(s.len());
    s.split_at(end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WellAssignment;
    use approx::assert_relative_eq;

    fn w(s: &str) -> WellId {
        s.parse().unwrap()
    }

    fn plate() -> (BTreeMap<WellId, WellReading>, PlateLayout) {
        let mut readings = BTreeMap::new();
        let mut layout = PlateLayout::default();
        let mut put = |id: &str, net: f64, role: WellRole| {
            readings.insert(
                w(id),
                WellReading {
                    a450: Some(net),
                    a570: Some(0.0),
                    net: Some(net),
                },
            );
            layout.wells.insert(w(id), WellAssignment::new(role));
        };
        put("H11", 0.05, WellRole::Blank);
        put("H12", 0.07, WellRole::Blank);
        let std = |l: &str| WellRole::Standard {
            standard_level: l.to_string(),
        };
        put("A1", 2.06, std("Std1"));
        put("A2", 2.10, std(" Std1"));
        put("B1", 1.06, std("Std2"));
        put("C1", 0.56, std("Std10"));
        put("D1", 0.40, std("Orphan"));
        layout.standards.insert("Std1".into(), 100.0);
        layout.standards.insert("Std2".into(), 50.0);
        layout.standards.insert("Std10".into(), 25.0);
        (readings, layout)
    }

    #[test]
    fn blank_offset_is_median_of_kept_blanks() {
        let (readings, mut layout) = plate();
        assert_relative_eq!(blank_offset(&readings, &layout, true), 0.06, epsilon = 1e-12);
        assert_eq!(blank_offset(&readings, &layout, false), 0.0);

        for a in layout.wells.values_mut() {
            if a.role == WellRole::Blank {
                a.keep = false;
            }
        }
        assert_eq!(blank_offset(&readings, &layout, true), 0.0);
    }

    #[test]
    fn standards_are_grouped_and_naturally_ordered() {
        let (readings, layout) = plate();
        let levels = aggregate_standard_levels(&readings, &layout, 0.06);
        let names: Vec<&str> = levels.iter().map(|l| l.level.as_str()).collect();
        assert_eq!(names, vec!["Orphan", "Std1", "Std2", "Std10"]);

        let std1 = &levels[1];
        assert_eq!(std1.conc, 100.0);
        assert_eq!(std1.replicates.len(), 2);
        assert_relative_eq!(std1.replicates[0].y, 2.0, epsilon = 1e-12);

        assert!(levels[0].conc.is_nan());
        assert!(!levels[0].is_usable());
    }

    #[test]
    fn serial_dilution_uses_natural_order() {
        let labels: Vec<String> = ["Std10", "Std2", "Std1", " Std3 "].iter().map(|s| s.to_string()).collect();
        let conc = fill_serial_dilution(&labels, 1000.0, 2.0).unwrap();
        assert_eq!(conc["Std1"], 1000.0);
        assert_eq!(conc["Std2"], 500.0);
        assert_eq!(conc["Std3"], 250.0);
        assert_eq!(conc["Std10"], 125.0);

        assert_eq!(fill_serial_dilution(&labels, 0.0, 2.0).unwrap_err().exit_code(), 2);
        assert_eq!(fill_serial_dilution(&labels, 100.0, 1.0).unwrap_err().exit_code(), 2);
        assert!(fill_serial_dilution(&labels, f64::NAN, 2.0).is_err());
    }

    #[test]
    fn serial_dilution_merges_case_variants() {
        let labels: Vec<String> = ["Std1", "std1", "Std2", "STD2", "Std3"].iter().map(|s| s.to_string()).collect();
        let conc = fill_serial_dilution(&labels, 900.0, 3.0).unwrap();
        assert_eq!(conc.len(), 5);
        assert_eq!(conc["Std1"], 900.0);
        assert_eq!(conc["std1"], 900.0);
        assert_eq!(conc["Std2"], 300.0);
        assert_eq!(conc["STD2"], 300.0);
        assert_eq!(conc["Std3"], 100.0);
    }

    #[test]
    fn natural_ordering() {
        assert_eq!(natural_cmp("Std2", "Std10"), Ordering::Less);
        assert_eq!(natural_cmp("std1", "Std1"), Ordering::Equal);
        assert_eq!(natural_cmp("A", "A1"), Ordering::Less);
        assert_eq!(natural_cmp("Std02", "Std1"), Ordering::Greater);
    }

    #[test]
    fn diagnostics_without_fit_still_report_replicates() {
        let (readings, layout) = plate();
        let levels = aggregate_standard_levels(&readings, &layout, 0.06);
        let diag = level_diagnostics(&levels, None);
        let std1 = &diag[1];
        assert_eq!(std1.n, 2);
        assert_relative_eq!(std1.mean.unwrap(), 2.02, epsilon = 1e-12);
        assert!(std1.cv_pct.unwrap() > 0.0);
        assert_eq!(std1.back_calculated, None);
        assert_eq!(diag[2].sd, None);
    }
}
