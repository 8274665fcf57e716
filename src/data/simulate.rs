//! Synthetic plate generation from a known 4PL.
//!
//! Produces reader text in the plate-block format plus the matching layout,
//! so the whole pipeline can be exercised without an instrument:
//!
//! - columns 1–2, rows A–G: duplicate standards `Std1`..`Std7`, serially
//!   diluted from `top_conc`
//! - columns 1–2, row H: blanks
//! - columns 3–12: duplicate samples, one animal per adjacent column pair,
//!   first half `ctrl`, second half `treated`

use std::collections::BTreeMap;

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{LogisticParams, PlateLayout, WellAssignment, WellId, WellRole, PLATE_COLS, PLATE_ROWS};
use crate::error::AppError;
use crate::models::eval_4pl;
use crate::quant::fill_serial_dilution;

const STANDARD_LEVELS: u8 = 7;
const FIRST_SAMPLE_COL: u8 = 2;
/// Mean 570 nm reference absorbance.
const REFERENCE_MEAN: f64 = 0.045;
const REFERENCE_SD: f64 = 0.003;
const TEMPERATURE_C: f64 = 23.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationOptions {
    pub seed: u64,
    /// SD of additive Gaussian noise on the net absorbance.
    pub noise_sd: f64,
    pub truth: LogisticParams,
    /// Net absorbance of a blank well.
    pub blank: f64,
    pub top_conc: f64,
    pub serial_factor: f64,
    pub sample_dilution: f64,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            seed: 42,
            noise_sd: 0.01,
            truth: LogisticParams {
                a: 0.02,
                d: 2.6,
                c: 120f64.log10(),
                b: 1.1,
            },
            blank: 0.04,
            top_conc: 1000.0,
            serial_factor: 2.0,
            sample_dilution: 2.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedPlate {
    pub reader_text: String,
    pub layout: PlateLayout,
    /// True dilution-adjusted concentration per animal.
    pub animal_conc: BTreeMap<String, f64>,
}

pub fn simulate_plate(opts: &SimulationOptions) -> Result<SimulatedPlate, AppError> {
    if !(opts.sample_dilution.is_finite() && opts.sample_dilution > 0.0) {
        return Err(AppError::new(2, "Sample dilution must be a positive number."));
    }
    let noise = Normal::new(0.0, opts.noise_sd)
        .map_err(|e| AppError::new(2, format!("Invalid noise SD {}: {e}", opts.noise_sd)))?;
    let reference = Normal::new(REFERENCE_MEAN, REFERENCE_SD)
        .map_err(|e| AppError::new(4, format!("Reference distribution error: {e}")))?;

    let labels: Vec<String> = (1..=STANDARD_LEVELS).map(|i| format!("Std{i}")).collect();
    let standards = fill_serial_dilution(&labels, opts.top_conc, opts.serial_factor)?;

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut layout = PlateLayout {
        standards: standards.clone(),
        ..PlateLayout::default()
    };
    let mut net = BTreeMap::new();

    // Keep true sample concentrations a little inside the standard range.
    let lo = (opts.top_conc / opts.serial_factor.powi(i32::from(STANDARD_LEVELS) - 1)).log10() + 0.2;
    let hi = opts.top_conc.log10() - 0.2;
    if !(lo < hi) {
        return Err(AppError::new(
            2,
            format!(
                "Serial factor {} leaves no room for samples inside the standard range.",
                opts.serial_factor
            ),
        ));
    }

    let mut animal_conc = BTreeMap::new();
    let n_pairs = (PLATE_COLS - FIRST_SAMPLE_COL) / 2;
    let n_animals = usize::from(PLATE_ROWS) * usize::from(n_pairs);

    for well_id in WellId::all() {
        let (row, col) = (well_id.row(), well_id.col());
        let (role, signal) = if col < FIRST_SAMPLE_COL {
            if row < STANDARD_LEVELS {
                let label = &labels[usize::from(row)];
                let conc = standards.get(label).copied().unwrap_or(f64::NAN);
                (
                    WellRole::Standard {
                        standard_level: label.clone(),
                    },
                    eval_4pl(&opts.truth, conc),
                )
            } else {
                (WellRole::Blank, 0.0)
            }
        } else {
            let index = usize::from(row) * usize::from(n_pairs) + usize::from((col - FIRST_SAMPLE_COL) / 2);
            let animal_id = format!("M{:02}", index + 1);
            let conc = *animal_conc
                .entry(animal_id.clone())
                .or_insert_with(|| 10f64.powf(rng.gen_range(lo..hi)) * opts.sample_dilution);
            (
                WellRole::Sample {
                    animal_id,
                    group: Some(if index < n_animals / 2 { "ctrl" } else { "treated" }.to_string()),
                    dilution_factor: Some(opts.sample_dilution),
                },
                eval_4pl(&opts.truth, conc / opts.sample_dilution),
            )
        };
        layout.wells.insert(well_id, WellAssignment::new(role));
        net.insert(well_id, opts.blank + signal + noise.sample(&mut rng));
    }

    let mut readings = BTreeMap::new();
    for (well_id, v) in net {
        let a570: f64 = reference.sample(&mut rng).max(0.0);
        readings.insert(well_id, (v + a570, a570));
    }

    Ok(SimulatedPlate {
        reader_text: plate_block_text(&readings, TEMPERATURE_C),
        layout,
        animal_conc,
    })
}

/// Render `(a450, a570)` pairs as tab-separated plate blocks with a
/// temperature column and a spacer column between the blocks.
pub fn plate_block_text(readings: &BTreeMap<WellId, (f64, f64)>, temperature_c: f64) -> String {
    let labels: Vec<String> = (1..=PLATE_COLS).map(|c| c.to_string()).collect();
    let mut out = format!("Temperature(C)\t{}\t\t{}\n", labels.join("\t"), labels.join("\t"));

    for row in 0..PLATE_ROWS {
        let cell = |col: u8, pick: fn(&(f64, f64)) -> f64| {
            WellId::new(row, col)
                .and_then(|w| readings.get(&w))
                .map(|r| format!("{:.4}", pick(r)))
                .unwrap_or_default()
        };
        let a450: Vec<String> = (0..PLATE_COLS).map(|c| cell(c, |r| r.0)).collect();
        let a570: Vec<String> = (0..PLATE_COLS).map(|c| cell(c, |r| r.1)).collect();
        let temp = if row == 0 { format!("{temperature_c:.1}") } else { String::new() };
        out.push_str(&format!("{temp}\t{}\t\t{}\n", a450.join("\t"), a570.join("\t")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{parse_reader_output, ReaderFormat};

    #[test]
    fn same_seed_same_plate() {
        let opts = SimulationOptions::default();
        let a = simulate_plate(&opts).unwrap();
        let b = simulate_plate(&opts).unwrap();
        assert_eq!(a.reader_text, b.reader_text);
        assert_eq!(a.layout, b.layout);

        let c = simulate_plate(&SimulationOptions { seed: 7, ..opts }).unwrap();
        assert_ne!(a.reader_text, c.reader_text);
    }

    #[test]
    fn layout_covers_the_plate() {
        let plate = simulate_plate(&SimulationOptions::default()).unwrap();
        assert_eq!(plate.layout.wells.len(), 96);
        assert_eq!(plate.layout.standards.len(), 7);
        assert_eq!(plate.layout.standards["Std1"], 1000.0);
        assert_eq!(plate.layout.standards["Std7"], 1000.0 / 64.0);
        assert_eq!(plate.animal_conc.len(), 40);

        let blanks = plate
            .layout
            .wells
            .values()
            .filter(|a| a.role == WellRole::Blank)
            .count();
        assert_eq!(blanks, 2);
    }

    #[test]
    fn simulated_text_parses_as_plate_blocks() {
        let plate = simulate_plate(&SimulationOptions::default()).unwrap();
        let parsed = parse_reader_output(&plate.reader_text);
        assert_eq!(parsed.format, Some(ReaderFormat::PlateBlocks));
        assert_eq!(parsed.temperature_c, Some(TEMPERATURE_C));
        assert_eq!(parsed.wells.len(), 96);
        assert!(parsed.wells.values().all(|r| r.net.is_some()));
    }

    #[test]
    fn narrow_standard_range_is_rejected() {
        let opts = SimulationOptions {
            serial_factor: 1.1,
            ..SimulationOptions::default()
        };
        let err = simulate_plate(&opts).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("Serial factor"));
    }

    #[test]
    fn negative_noise_is_rejected() {
        let opts = SimulationOptions {
            noise_sd: -1.0,
            ..SimulationOptions::default()
        };
        assert_eq!(simulate_plate(&opts).unwrap_err().exit_code(), 2);
    }
}
