//! Shared quantification pipeline.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! reader text -> parse -> layout -> (Auto-QC) -> quantify
//!
//! The app layer and the integration tests can then focus on presentation
//! and assertions.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::domain::{AutoQcOptions, AutoQcSuggestion, PlateLayout, QuantConfig, WellRole};
use crate::error::AppError;
use crate::fit::suggest_standard_curve_exclusions;
use crate::io::{ReaderParse, parse_reader_output, read_layout_json};
use crate::quant::{Quantification, aggregate_standard_levels, blank_offset, fill_serial_dilution, quantify_plate};

/// All computed outputs of a single `elisa quantify` run.
#[derive(Debug, Clone)]
pub struct QuantifyRun {
    pub parse: ReaderParse,
    pub layout: PlateLayout,
    pub qc: Option<AutoQcSuggestion>,
    pub quant: Quantification,
}

/// Read a reader file and parse it. Unrecognised text is not an error here:
/// the result carries an empty map and a warning.
pub fn read_readings(path: &Path) -> Result<ReaderParse, AppError> {
    let text = fs::read_to_string(path)
        .map_err(|e| AppError::new(2, format!("Failed to read reader output '{}': {e}", path.display())))?;
    let parse = parse_reader_output(&text);
    for w in &parse.warnings {
        warn!("{w}");
    }
    match parse.format {
        Some(format) => {
            info!(%format, wells = parse.wells.len(), temperature_c = ?parse.temperature_c, "reader output parsed");
        }
        None => info!("reader output not recognised"),
    }
    Ok(parse)
}

/// Like [`read_readings`], but unrecognised text is a "no usable data" error.
pub fn load_readings(path: &Path) -> Result<ReaderParse, AppError> {
    let parse = read_readings(path)?;
    if parse.format.is_none() {
        return Err(AppError::new(3, parse.warnings.join("\n")));
    }
    Ok(parse)
}

/// Execute the full quantification pipeline and return the computed outputs.
pub fn run_quantify(config: &QuantConfig) -> Result<QuantifyRun, AppError> {
    // 1) Readings.
    let parse = load_readings(&config.reader_path)?;

    // 2) Layout, optionally with serially diluted standards.
    let mut layout = read_layout_json(&config.layout_path)?;
    if let Some((top, factor)) = config.serial_dilution {
        layout.standards = fill_serial_dilution(&standard_labels(&layout), top, factor)?;
        info!(levels = layout.standards.len(), top, factor, "standards filled by serial dilution");
    }

    // 3) Auto-QC over the same blank-corrected levels the fit will see.
    let qc = (config.auto_qc || config.apply_qc).then(|| {
        let blank = blank_offset(&parse.wells, &layout, config.quantify.blank_subtraction);
        let levels = aggregate_standard_levels(&parse.wells, &layout, blank);
        let opts = AutoQcOptions {
            fit: config.quantify.fit,
            ..config.auto_qc_options
        };
        let suggestion = suggest_standard_curve_exclusions(&levels, config.quantify.curve, &opts);
        info!(
            actions = suggestion.actions.len(),
            excluded = suggestion.excluded_well_ids.len(),
            dropped = suggestion.dropped_levels.len(),
            "auto-qc finished"
        );
        suggestion
    });

    // 4) Quantify.
    let applied = if config.apply_qc { qc.as_ref() } else { None };
    let quant = quantify_plate(&parse.wells, &layout, &config.quantify, applied);

    let Some(fit) = &quant.fit else {
        return Err(AppError::new(
            3,
            format!(
                "No standard curve could be fitted ({} needs at least {} usable standard levels; found {}).",
                config.quantify.curve.display_name(),
                config.quantify.curve.min_points(),
                quant.levels.iter().filter(|l| l.is_usable()).count()
            ),
        ));
    };
    info!(
        curve = config.quantify.curve.display_name(),
        r2 = fit.r2(),
        samples = quant.samples.len(),
        outliers = quant.outliers.len(),
        "plate quantified"
    );

    Ok(QuantifyRun {
        parse,
        layout,
        qc,
        quant,
    })
}

fn standard_labels(layout: &PlateLayout) -> Vec<String> {
    layout
        .wells
        .values()
        .filter_map(|a| match &a.role {
            WellRole::Standard { standard_level } => Some(standard_level.trim().to_string()),
            _ => None,
        })
        .collect()
}
