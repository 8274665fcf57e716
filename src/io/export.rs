//! Export per-sample results and per-animal summaries as TSV.
//!
//! The exports are meant to be pasted into spreadsheets: tab-separated, a
//! header row, fixed decimals (absorbance 4, concentrations 6) and empty cells
//! for values that could not be computed.

use std::fs;
use std::path::Path;

use crate::domain::{AnimalSummary, SampleQuantification};
use crate::error::AppError;

pub const SAMPLE_HEADER: [&str; 7] = [
    "Well",
    "AnimalId",
    "Group",
    "DilutionFactor",
    "Net(blank)",
    "Conc",
    "ConcAdjusted",
];

pub const ANIMAL_HEADER: [&str; 5] = ["AnimalId", "Group", "N", "Mean", "SD"];

fn fixed(v: Option<f64>, decimals: usize) -> String {
    v.filter(|x| x.is_finite())
        .map(|x| format!("{x:.decimals$}"))
        .unwrap_or_default()
}

fn tsv_from_rows(header: &[&str], rows: Vec<Vec<String>>) -> Result<String, AppError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());

    writer
        .write_record(header)
        .map_err(|e| AppError::new(4, format!("Failed to write TSV header: {e}")))?;
    for row in rows {
        writer
            .write_record(&row)
            .map_err(|e| AppError::new(4, format!("Failed to write TSV row: {e}")))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::new(4, format!("Failed to finish TSV: {e}")))?;
    String::from_utf8(bytes).map_err(|e| AppError::new(4, format!("TSV is not UTF-8: {e}")))
}

/// Per-sample TSV.
pub fn samples_tsv(samples: &[SampleQuantification]) -> Result<String, AppError> {
    let rows = samples
        .iter()
        .map(|s| {
            vec![
                s.well_id.to_string(),
                s.animal_id.clone(),
                s.group.clone().unwrap_or_default(),
                s.dilution_factor.to_string(),
                fixed(Some(s.net_blank), 4),
                fixed(s.conc, 6),
                fixed(s.conc_adjusted, 6),
            ]
        })
        .collect();
    tsv_from_rows(&SAMPLE_HEADER, rows)
}

/// Per-(animal, group) TSV.
pub fn animal_summary_tsv(animals: &[AnimalSummary]) -> Result<String, AppError> {
    let rows = animals
        .iter()
        .map(|a| {
            vec![
                a.animal_id.clone(),
                a.group.clone().unwrap_or_default(),
                a.n.to_string(),
                fixed(a.mean, 6),
                fixed(a.sd, 6),
            ]
        })
        .collect();
    tsv_from_rows(&ANIMAL_HEADER, rows)
}

pub fn write_samples_tsv(path: &Path, samples: &[SampleQuantification]) -> Result<(), AppError> {
    write_text(path, &samples_tsv(samples)?)
}

pub fn write_animal_summary_tsv(path: &Path, animals: &[AnimalSummary]) -> Result<(), AppError> {
    write_text(path, &animal_summary_tsv(animals)?)
}

fn write_text(path: &Path, text: &str) -> Result<(), AppError> {
    fs::write(path, text).map_err(|e| AppError::new(2, format!("Failed to write export '{}': {e}", path.display())))
}
