use std::fs;
use std::path::{Path, PathBuf};

use elisa_quant::app::pipeline::{load_readings, read_readings, run_quantify};
use elisa_quant::report::format_reader_summary;
use elisa_quant::data::{SimulationOptions, simulate_plate};
use elisa_quant::domain::{AutoQcOptions, CurveKind, QuantConfig, QuantifyOptions, WellRole};
use elisa_quant::io::{build_curve_file, read_curve_json, write_curve_json, write_layout_json, write_samples_tsv};

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("elisa-e2e-{}-{name}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_plate(dir: &Path, opts: &SimulationOptions) -> (PathBuf, PathBuf, elisa_quant::data::SimulatedPlate) {
    let plate = simulate_plate(opts).unwrap();
    let reader = dir.join("plate.txt");
    let layout = dir.join("layout.json");
    fs::write(&reader, &plate.reader_text).unwrap();
    write_layout_json(&layout, &plate.layout).unwrap();
    (reader, layout, plate)
}

fn config(reader: PathBuf, layout: PathBuf, curve: CurveKind) -> QuantConfig {
    QuantConfig {
        reader_path: reader,
        layout_path: layout,
        quantify: QuantifyOptions {
            curve,
            ..QuantifyOptions::default()
        },
        auto_qc: false,
        apply_qc: false,
        auto_qc_options: AutoQcOptions::default(),
        serial_dilution: None,
        export_samples: None,
        export_summary: None,
        export_curve: None,
    }
}

#[test]
fn simulated_plate_recovers_animal_concentrations() {
    let dir = scratch("recover");
    let (reader, layout, plate) = write_plate(&dir, &SimulationOptions::default());

    let run = run_quantify(&config(reader, layout, CurveKind::FourPl)).unwrap();
    let fit = run.quant.fit.as_ref().unwrap();
    assert!(fit.r2() > 0.99, "r2 = {}", fit.r2());
    assert_eq!(run.quant.levels.len(), 7);

    let mut checked = 0;
    for animal in &run.quant.animals {
        let truth = plate.animal_conc[&animal.animal_id];
        if let Some(mean) = animal.mean {
            let rel = (mean - truth).abs() / truth;
            assert!(rel < 0.2, "{}: got {mean}, truth {truth}", animal.animal_id);
            checked += 1;
        }
    }
    assert!(checked >= 36, "only {checked} animals quantified");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn corrupted_standard_is_caught_by_auto_qc() {
    let dir = scratch("autoqc");
    let (reader, layout_path, mut plate) = write_plate(
        &dir,
        &SimulationOptions {
            noise_sd: 0.002,
            ..SimulationOptions::default()
        },
    );

    // Relabel one Std4 replicate as Std1: its response now sits far below
    // the other Std1 wells.
    let bad = plate
        .layout
        .wells
        .iter()
        .find(|(_, a)| matches!(&a.role, WellRole::Standard { standard_level } if standard_level == "Std4"))
        .map(|(w, _)| *w)
        .unwrap();
    plate.layout.wells.get_mut(&bad).unwrap().role = WellRole::Standard {
        standard_level: "Std1".into(),
    };
    write_layout_json(&layout_path, &plate.layout).unwrap();

    let mut cfg = config(reader, layout_path, CurveKind::FourPl);
    cfg.auto_qc = true;
    cfg.apply_qc = true;
    let run = run_quantify(&cfg).unwrap();

    let qc = run.qc.as_ref().unwrap();
    assert!(!qc.actions.is_empty());
    assert!(qc.excluded_well_ids.contains(&bad), "suggestion: {qc:?}");
    assert!(qc.suggested.unwrap().r2 >= qc.baseline.unwrap().r2);
    assert!(run.quant.levels.iter().all(|l| l.replicates.iter().all(|r| r.well_id != bad)));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn exports_and_curve_file_roundtrip() {
    let dir = scratch("exports");
    let (reader, layout, _) = write_plate(&dir, &SimulationOptions::default());
    let run = run_quantify(&config(reader, layout, CurveKind::FourPl)).unwrap();

    let tsv = dir.join("samples.tsv");
    write_samples_tsv(&tsv, &run.quant.samples).unwrap();
    let text = fs::read_to_string(&tsv).unwrap();
    assert!(text.starts_with("Well\tAnimalId\tGroup\tDilutionFactor\tNet(blank)\tConc\tConcAdjusted\n"));
    assert_eq!(text.lines().count(), run.quant.samples.len() + 1);

    let fit = run.quant.fit.as_ref().unwrap();
    let curve = build_curve_file(fit, &run.quant.levels).unwrap();
    let path = dir.join("curve.json");
    write_curve_json(&path, &curve).unwrap();
    let back = read_curve_json(&path).unwrap();
    let (lo, hi) = back.conc_range;

    // A saved curve back-calculates the same as the live fit.
    let s = run.quant.samples.iter().find(|s| s.conc.is_some()).unwrap();
    let again = back.curve.invert(s.net_blank, lo, hi).unwrap();
    assert!((again - s.conc.unwrap()).abs() / s.conc.unwrap() < 1e-6);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn garbage_reader_text_is_no_usable_data() {
    let dir = scratch("garbage");
    let reader = dir.join("plate.txt");
    fs::write(&reader, "this is not a plate\n").unwrap();

    let err = load_readings(&reader).unwrap_err();
    assert_eq!(err.exit_code(), 3);
    assert!(err.message().contains("Could not parse the reader output."));

    // `elisa parse` still reports the warning instead of failing.
    let parse = read_readings(&reader).unwrap();
    assert!(parse.wells.is_empty());
    assert_eq!(parse.format, None);
    assert!(format_reader_summary(&parse).contains("Could not parse the reader output."));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn too_few_standards_is_no_usable_data() {
    let dir = scratch("few");
    let (reader, layout_path, mut plate) = write_plate(&dir, &SimulationOptions::default());
    plate.layout.standards.retain(|k, _| k == "Std1" || k == "Std2");
    write_layout_json(&layout_path, &plate.layout).unwrap();

    let err = run_quantify(&config(reader, layout_path, CurveKind::FourPl)).unwrap_err();
    assert_eq!(err.exit_code(), 3);
    assert!(err.message().contains("No standard curve"));

    let _ = fs::remove_dir_all(&dir);
}
