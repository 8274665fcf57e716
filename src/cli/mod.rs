//! Command-line parsing for the ELISA quantifier.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the parsing/fitting code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::CurveKind;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "elisa", version, about = "ELISA plate quantification (450/570 nm, 96-well)")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse plate-reader output and print the per-well readings.
    Parse(ParseArgs),
    /// Fit the standard curve and back-calculate sample concentrations.
    Quantify(QuantifyArgs),
    /// Back-calculate absorbances with a saved curve JSON.
    Invert(InvertArgs),
    /// Write a synthetic plate (reader text + layout JSON) from a known 4PL.
    Simulate(SimulateArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct ParseArgs {
    /// Reader output (plate blocks or list format).
    #[arg(long, value_name = "FILE")]
    pub reader: PathBuf,

    /// Print the parse result as JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser, Clone)]
pub struct QuantifyArgs {
    /// Reader output (plate blocks or list format).
    #[arg(long, value_name = "FILE")]
    pub reader: PathBuf,

    /// Plate layout JSON (well roles + standard concentrations).
    #[arg(long, value_name = "JSON")]
    pub layout: PathBuf,

    /// Standard-curve model.
    #[arg(long, value_enum, default_value_t = CurveKind::FourPl)]
    pub curve: CurveKind,

    /// Do not subtract the blank median.
    #[arg(long)]
    pub no_blank: bool,

    /// Run the Auto-QC search and report its suggestion.
    #[arg(long)]
    pub auto_qc: bool,

    /// Fit with the Auto-QC suggestion applied (implies --auto-qc).
    #[arg(long)]
    pub apply_qc: bool,

    /// Replicate outlier threshold (absolute net absorbance).
    #[arg(long, default_value_t = 0.15)]
    pub outlier_threshold: f64,

    /// Maximum Levenberg–Marquardt iterations per 4PL seed.
    #[arg(long, default_value_t = 90)]
    pub max_iter: usize,

    /// Additional Hill-slope seeds tried by the 4PL fitter.
    #[arg(long, default_value_t = 3)]
    pub restarts: usize,

    /// Fill standard concentrations by serial dilution from this top concentration.
    #[arg(long, requires = "serial_factor")]
    pub serial_top: Option<f64>,

    /// Serial dilution factor (> 1).
    #[arg(long, requires = "serial_top")]
    pub serial_factor: Option<f64>,

    /// Export per-sample results to TSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export per-animal summaries to TSV.
    #[arg(long = "export-summary")]
    pub export_summary: Option<PathBuf>,

    /// Export the fitted curve (model + params + grid) to JSON.
    #[arg(long = "export-curve")]
    pub export_curve: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct InvertArgs {
    /// Curve JSON file produced by `elisa quantify --export-curve`.
    #[arg(long, value_name = "JSON")]
    pub curve: PathBuf,

    /// Blank-corrected absorbances to back-calculate.
    #[arg(required = true, allow_negative_numbers = true, value_name = "ABS")]
    pub values: Vec<f64>,
}

#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Where to write the reader text.
    #[arg(long, value_name = "FILE")]
    pub reader_out: PathBuf,

    /// Where to write the layout JSON.
    #[arg(long, value_name = "JSON")]
    pub layout_out: PathBuf,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// SD of Gaussian noise added to each well's net absorbance.
    #[arg(long, default_value_t = 0.01)]
    pub noise: f64,

    /// Concentration of the top standard.
    #[arg(long, default_value_t = 1000.0)]
    pub top_conc: f64,

    /// Serial dilution factor between standards.
    #[arg(long, default_value_t = 2.0)]
    pub serial_factor: f64,
}
