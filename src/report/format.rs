//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the fitting and quantification code stays clean and testable
//! - output changes are localized

use crate::domain::{AutoQcSuggestion, CurveFile, CurveFit, FitSummary, WellId, PLATE_COLS, PLATE_ROWS};
use crate::io::ReaderParse;
use crate::quant::Quantification;

fn opt(v: Option<f64>, decimals: usize) -> String {
    v.filter(|x| x.is_finite())
        .map(|x| format!("{x:.decimals$}"))
        .unwrap_or_else(|| "-".to_string())
}

/// Parsed reader text: format, temperature, warnings and the net grid.
pub fn format_reader_summary(parse: &ReaderParse) -> String {
    let mut out = String::new();

    out.push_str("=== elisa - reader output ===\n");
    match parse.format {
        Some(f) => out.push_str(&format!("Format: {f}\n")),
        None => out.push_str("Format: not recognised\n"),
    }
    if let Some(t) = parse.temperature_c {
        out.push_str(&format!("Temperature: {t:.1} C\n"));
    }
    let with_net = parse.wells.values().filter(|r| r.finite_net().is_some()).count();
    out.push_str(&format!("Wells: {} ({} with net)\n", parse.wells.len(), with_net));

    if !parse.wells.is_empty() {
        out.push_str("\nNet absorbance (450 - 570):\n");
        out.push_str("    ");
        for c in 1..=PLATE_COLS {
            out.push_str(&format!("{c:>8}"));
        }
        out.push('\n');
        for r in 0..PLATE_ROWS {
            out.push_str(&format!("{:<4}", char::from(b'A' + r)));
            for c in 0..PLATE_COLS {
                let v = WellId::new(r, c)
                    .and_then(|w| parse.wells.get(&w))
                    .and_then(|reading| reading.finite_net());
                out.push_str(&format!("{:>8}", opt(v, 4)));
            }
            out.push('\n');
        }
    }

    push_warnings(&mut out, &parse.warnings);
    out
}

fn push_warnings(out: &mut String, warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    out.push_str("\nWarnings:\n");
    for w in warnings {
        out.push_str(&format!("- {w}\n"));
    }
}

/// One-line description of a fitted curve.
pub fn format_curve(fit: &CurveFit) -> String {
    match fit {
        CurveFit::Polynomial(p) => {
            let terms: Vec<String> = p.coeff.iter().enumerate().map(|(i, c)| format!("c{i}={c:.6}")).collect();
            format!("{} | {}", fit.kind().display_name(), terms.join(" "))
        }
        CurveFit::FourPl(l) => format!(
            "4PL | A={:.4} D={:.4} EC50={:.4} B={:.4}",
            l.params.a,
            l.params.d,
            10f64.powf(l.params.c),
            l.params.b
        ),
    }
}

fn format_summary(label: &str, s: &FitSummary) -> String {
    format!("{label}: R²={:.4} SSE={:.6} levels={}\n", s.r2, s.sse, s.n_levels)
}

/// Auto-QC suggestion: baseline vs suggested fit and each accepted action.
pub fn format_auto_qc(qc: &AutoQcSuggestion, applied: bool) -> String {
    let mut out = String::new();
    out.push_str(if applied {
        "\nAuto-QC (applied):\n"
    } else {
        "\nAuto-QC (suggestion only; pass --apply-qc to use it):\n"
    });

    let Some(baseline) = &qc.baseline else {
        out.push_str("  no baseline fit; nothing to suggest\n");
        return out;
    };
    out.push_str(&format!("  {}", format_summary("Baseline", baseline)));
    if let Some(s) = &qc.suggested {
        out.push_str(&format!("  {}", format_summary("Suggested", s)));
    }
    if qc.actions.is_empty() {
        out.push_str("  no exclusions improve the fit enough\n");
    }
    for (i, a) in qc.actions.iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", i + 1, a.reason()));
    }
    out
}

/// Full quantification report.
pub fn format_run_summary(q: &Quantification, qc: Option<(&AutoQcSuggestion, bool)>) -> String {
    let mut out = String::new();

    out.push_str("=== elisa - plate quantification ===\n");
    out.push_str(&format!("Blank offset: {:.4}\n", q.blank_offset));
    if let Some((lo, hi)) = q.conc_range {
        out.push_str(&format!("Standard range: [{lo:.4}, {hi:.4}]\n"));
    }

    match &q.fit {
        Some(fit) => {
            out.push_str(&format!("Curve: {}\n", format_curve(fit)));
            out.push_str(&format!("Fit: R²={:.4} SSE={:.6} n={}\n", fit.r2(), fit.sse(), fit.n()));
        }
        None => out.push_str("Curve: no fit (too few usable standard levels or fit failed)\n"),
    }

    if let Some((suggestion, applied)) = qc {
        out.push_str(&format_auto_qc(suggestion, applied));
    }

    out.push_str("\nStandards:\n");
    out.push_str(&format!(
        "  {:<10} {:>12} {:>3} {:>9} {:>9} {:>7} {:>12} {:>9}\n",
        "Level", "Conc", "n", "Mean", "SD", "CV%", "Back-calc", "Recov%"
    ));
    for d in &q.diagnostics {
        out.push_str(&format!(
            "  {:<10} {:>12.4} {:>3} {:>9} {:>9} {:>7} {:>12} {:>9}\n",
            d.level,
            d.conc,
            d.n,
            opt(d.mean, 4),
            opt(d.sd, 4),
            opt(d.cv_pct, 1),
            opt(d.back_calculated, 4),
            opt(d.recovery_pct, 1),
        ));
    }

    out.push_str("\nSamples:\n");
    out.push_str(&format!(
        "  {:<5} {:<10} {:<10} {:>6} {:>9} {:>12} {:>14}\n",
        "Well", "Animal", "Group", "Dil", "Net", "Conc", "Conc(adj)"
    ));
    for s in &q.samples {
        out.push_str(&format!(
            "  {:<5} {:<10} {:<10} {:>6} {:>9.4} {:>12} {:>14}\n",
            s.well_id.to_string(),
            s.animal_id,
            s.group.as_deref().unwrap_or("-"),
            s.dilution_factor,
            s.net_blank,
            opt(s.conc, 4),
            opt(s.conc_adjusted, 4),
        ));
    }
    let missing = q.samples.iter().filter(|s| s.conc.is_none()).count();
    if missing > 0 {
        out.push_str(&format!("  ({missing} sample well(s) outside the standard range or without a fit)\n"));
    }

    out.push_str("\nAnimals:\n");
    for a in &q.animals {
        out.push_str(&format!(
            "  {:<10} {:<10} n={} mean={} sd={}\n",
            a.animal_id,
            a.group.as_deref().unwrap_or("-"),
            a.n,
            opt(a.mean, 4),
            opt(a.sd, 4),
        ));
    }

    if !q.outliers.is_empty() {
        out.push_str("\nReplicate outliers:\n");
        for f in &q.outliers {
            out.push_str(&format!(
                "  {} in {}: {:.4} vs median {:.4} ({:+.4})\n",
                f.well_id, f.group, f.value, f.median, f.deviation
            ));
        }
    }

    out
}

/// Back-calculation table for `elisa invert`.
pub fn format_inversions(curve: &CurveFile, rows: &[(f64, Option<f64>)]) -> String {
    let (lo, hi) = curve.conc_range;
    let mut out = String::new();
    out.push_str(&format!("Curve: {}\n", format_curve(&curve.curve)));
    out.push_str(&format!("Range: [{lo:.4}, {hi:.4}]\n"));
    out.push_str(&format!("{:>10} {:>14}\n", "Abs", "Conc"));
    for (y, conc) in rows {
        out.push_str(&format!("{y:>10.4} {:>14}\n", opt(*conc, 6)));
    }
    out
}
