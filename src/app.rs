//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - reads reader text and layouts
//! - runs Auto-QC and quantification
//! - prints reports
//! - writes optional exports

use std::fs;

use clap::Parser;
use tracing::info;

use crate::cli::{Command, InvertArgs, ParseArgs, QuantifyArgs, SimulateArgs};
use crate::data::{SimulationOptions, simulate_plate};
use crate::domain::{AutoQcOptions, LogisticOptions, QuantConfig, QuantifyOptions};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `elisa` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Parse(args) => handle_parse(args),
        Command::Quantify(args) => handle_quantify(args),
        Command::Invert(args) => handle_invert(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn handle_parse(args: ParseArgs) -> Result<(), AppError> {
    let parse = pipeline::read_readings(&args.reader)?;

    if args.json {
        let json = serde_json::to_string_pretty(&parse)
            .map_err(|e| AppError::new(4, format!("Failed to serialize parse result: {e}")))?;
        println!("{json}");
    } else {
        println!("{}", crate::report::format_reader_summary(&parse));
    }
    Ok(())
}

fn handle_quantify(args: QuantifyArgs) -> Result<(), AppError> {
    let config = quant_config_from_args(&args)?;
    let run = pipeline::run_quantify(&config)?;

    let qc = run.qc.as_ref().map(|s| (s, config.apply_qc));
    println!("{}", crate::report::format_run_summary(&run.quant, qc));

    // Optional exports.
    if let Some(path) = &config.export_samples {
        crate::io::export::write_samples_tsv(path, &run.quant.samples)?;
        info!(path = %path.display(), "sample TSV written");
    }
    if let Some(path) = &config.export_summary {
        crate::io::export::write_animal_summary_tsv(path, &run.quant.animals)?;
        info!(path = %path.display(), "animal summary TSV written");
    }
    if let Some(path) = &config.export_curve {
        let curve = run
            .quant
            .fit
            .as_ref()
            .and_then(|fit| crate::io::curve::build_curve_file(fit, &run.quant.levels))
            .ok_or_else(|| AppError::new(3, "No fitted curve to export."))?;
        crate::io::curve::write_curve_json(path, &curve)?;
        info!(path = %path.display(), "curve JSON written");
    }

    Ok(())
}

fn handle_invert(args: InvertArgs) -> Result<(), AppError> {
    let curve = crate::io::curve::read_curve_json(&args.curve)?;
    let (lo, hi) = curve.conc_range;

    let rows: Vec<(f64, Option<f64>)> = args
        .values
        .iter()
        .map(|&y| (y, curve.curve.invert(y, lo, hi)))
        .collect();

    println!("{}", crate::report::format_inversions(&curve, &rows));
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let opts = SimulationOptions {
        seed: args.seed,
        noise_sd: args.noise,
        top_conc: args.top_conc,
        serial_factor: args.serial_factor,
        ..SimulationOptions::default()
    };
    let plate = simulate_plate(&opts)?;

    fs::write(&args.reader_out, &plate.reader_text).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to write reader text '{}': {e}", args.reader_out.display()),
        )
    })?;
    crate::io::layout::write_layout_json(&args.layout_out, &plate.layout)?;

    info!(
        reader = %args.reader_out.display(),
        layout = %args.layout_out.display(),
        seed = args.seed,
        "synthetic plate written"
    );
    Ok(())
}

/// Resolve `quantify` flags into a validated run configuration.
pub fn quant_config_from_args(args: &QuantifyArgs) -> Result<QuantConfig, AppError> {
    if !(args.outlier_threshold.is_finite() && args.outlier_threshold >= 0.0) {
        return Err(AppError::new(2, "--outlier-threshold must be a non-negative number."));
    }
    if args.max_iter == 0 {
        return Err(AppError::new(2, "--max-iter must be > 0."));
    }

    let fit = LogisticOptions {
        max_iter: args.max_iter,
        restarts: args.restarts,
        ..LogisticOptions::default()
    };

    Ok(QuantConfig {
        reader_path: args.reader.clone(),
        layout_path: args.layout.clone(),
        quantify: QuantifyOptions {
            blank_subtraction: !args.no_blank,
            curve: args.curve,
            fit,
            outlier_threshold: args.outlier_threshold,
        },
        auto_qc: args.auto_qc || args.apply_qc,
        apply_qc: args.apply_qc,
        auto_qc_options: AutoQcOptions {
            fit,
            ..AutoQcOptions::default()
        },
        serial_dilution: args.serial_top.zip(args.serial_factor),
        export_samples: args.export.clone(),
        export_summary: args.export_summary.clone(),
        export_curve: args.export_curve.clone(),
    })
}
