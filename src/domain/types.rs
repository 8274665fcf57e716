//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting and quantification
//! - loaded from layout JSON / written to curve JSON
//! - printed by the report module or exported as TSV

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};

/// Number of plate rows (`A`..=`H`).
pub const PLATE_ROWS: u8 = 8;
/// Number of plate columns (`1`..=`12`).
pub const PLATE_COLS: u8 = 12;

/// A well position on a 96-well plate.
///
/// Ordered row-major: `A1 < A2 < … < A12 < B1 < … < H12`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WellId {
    row: u8,
    col: u8,
}

impl WellId {
    /// Build from zero-based row/column indices.
    pub fn new(row: u8, col: u8) -> Option<Self> {
        (row < PLATE_ROWS && col < PLATE_COLS).then_some(Self { row, col })
    }

    /// Well at a zero-based row-major position (`0 → A1`, `12 → B1`).
    pub fn from_index(index: usize) -> Option<Self> {
        let cols = PLATE_COLS as usize;
        let row = u8::try_from(index / cols).ok()?;
        Self::new(row, (index % cols) as u8)
    }

    pub fn row(self) -> u8 {
        self.row
    }

    pub fn col(self) -> u8 {
        self.col
    }

    pub fn row_letter(self) -> char {
        char::from(b'A' + self.row)
    }

    /// All 96 wells in row-major order.
    pub fn all() -> impl Iterator<Item = WellId> {
        (0..PLATE_ROWS).flat_map(|row| (0..PLATE_COLS).map(move |col| WellId { row, col }))
    }
}

impl fmt::Display for WellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row_letter(), self.col + 1)
    }
}

impl FromStr for WellId {
    type Err = String;

    /// Accepts `A1`, `h12`, `B07` (surrounding whitespace ignored).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let letter = chars
            .next()
            .map(|c| c.to_ascii_uppercase())
            .ok_or_else(|| "Empty well id.".to_string())?;
        if !('A'..='H').contains(&letter) {
            return Err(format!("Invalid well row in '{s}' (expected A-H)."));
        }
        let digits = chars.as_str();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("Invalid well column in '{s}' (expected 1-12)."));
        }
        let col: u8 = digits
            .parse()
            .map_err(|_| format!("Invalid well column in '{s}' (expected 1-12)."))?;
        if !(1..=PLATE_COLS).contains(&col) {
            return Err(format!("Invalid well column in '{s}' (expected 1-12)."));
        }
        Ok(WellId {
            row: letter as u8 - b'A',
            col: col - 1,
        })
    }
}

impl TryFrom<String> for WellId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WellId> for String {
    fn from(value: WellId) -> Self {
        value.to_string()
    }
}

/// Dual-wavelength reading of one well.
///
/// `net = a450 - a570` when both wavelengths are present.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WellReading {
    pub a450: Option<f64>,
    pub a570: Option<f64>,
    pub net: Option<f64>,
}

impl WellReading {
    /// Net absorbance if finite.
    pub fn finite_net(&self) -> Option<f64> {
        self.net.filter(|v| v.is_finite())
    }
}

/// The role a well plays on the plate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum WellRole {
    #[default]
    Empty,
    Sample {
        animal_id: String,
        #[serde(default)]
        group: Option<String>,
        #[serde(default)]
        dilution_factor: Option<f64>,
    },
    Standard {
        standard_level: String,
    },
    Blank,
}

/// Role assignment plus the user-controlled inclusion flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellAssignment {
    #[serde(flatten)]
    pub role: WellRole,
    #[serde(default = "default_keep")]
    pub keep: bool,
}

fn default_keep() -> bool {
    true
}

impl WellAssignment {
    pub fn new(role: WellRole) -> Self {
        Self { role, keep: true }
    }
}

/// Plate layout as supplied by the layout editor: per-well roles and the
/// nominal concentration of each standard label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlateLayout {
    #[serde(default)]
    pub wells: BTreeMap<WellId, WellAssignment>,
    #[serde(default)]
    pub standards: BTreeMap<String, f64>,
}

/// One observed standard replicate (blank-corrected net absorbance).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replicate {
    pub well_id: WellId,
    pub y: f64,
}

/// Aggregated standard level: nominal concentration plus its replicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardLevelInput {
    pub level: String,
    pub conc: f64,
    pub replicates: Vec<Replicate>,
}

impl StandardLevelInput {
    /// A level is usable for fitting when its concentration is finite and
    /// positive and it has at least one replicate.
    pub fn is_usable(&self) -> bool {
        self.conc.is_finite() && self.conc > 0.0 && !self.replicates.is_empty()
    }
}

/// Standard-curve model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Default)]
pub enum CurveKind {
    /// 4-parameter logistic.
    #[default]
    #[serde(rename = "4pl")]
    #[value(name = "4pl")]
    FourPl,
    /// Quadratic polynomial.
    #[serde(rename = "poly2")]
    #[value(name = "poly2")]
    Poly2,
    /// Cubic polynomial.
    #[serde(rename = "poly3")]
    #[value(name = "poly3")]
    Poly3,
}

impl CurveKind {
    /// Polynomial degree, or `None` for 4PL.
    pub fn degree(self) -> Option<usize> {
        match self {
            CurveKind::FourPl => None,
            CurveKind::Poly2 => Some(2),
            CurveKind::Poly3 => Some(3),
        }
    }

    /// Minimum number of usable points for a fit.
    pub fn min_points(self) -> usize {
        match self.degree() {
            Some(d) => d + 1,
            None => 4,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            CurveKind::FourPl => "4PL",
            CurveKind::Poly2 => "Polynomial (deg 2)",
            CurveKind::Poly3 => "Polynomial (deg 3)",
        }
    }
}

/// Least-squares polynomial, `y = Σ coeff[i]·x^i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolynomialFit {
    pub degree: usize,
    pub coeff: Vec<f64>,
    #[serde(deserialize_with = "nan_if_null")]
    pub r2: f64,
    pub sse: f64,
    pub n: usize,
}

/// 4PL parameters: `y = A + (D-A) / (1 + 10^((C - log10 x)·B))`.
///
/// `a` is the response at zero concentration, `d` at infinite concentration,
/// `c` is log10(EC50) and `b` the (positive) Hill slope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogisticParams {
    pub a: f64,
    pub d: f64,
    pub c: f64,
    pub b: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticFit {
    pub params: LogisticParams,
    #[serde(deserialize_with = "nan_if_null")]
    pub r2: f64,
    pub sse: f64,
    pub n: usize,
}

/// r² is NaN when the responses have no spread; JSON stores that as `null`.
fn nan_if_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// A fitted standard curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CurveFit {
    Polynomial(PolynomialFit),
    #[serde(rename = "4pl")]
    FourPl(LogisticFit),
}

/// Compact fit quality used by Auto-QC.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    #[serde(deserialize_with = "nan_if_null")]
    pub r2: f64,
    pub sse: f64,
    pub n_levels: usize,
}

/// One accepted Auto-QC step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum QcAction {
    ExcludeReplicate {
        level: String,
        well_id: WellId,
        reason: String,
    },
    DropLevel {
        level: String,
        reason: String,
    },
}

impl QcAction {
    pub fn reason(&self) -> &str {
        match self {
            QcAction::ExcludeReplicate { reason, .. } | QcAction::DropLevel { reason, .. } => reason,
        }
    }
}

/// Recommended exclusions. Never applied implicitly.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AutoQcSuggestion {
    pub excluded_well_ids: Vec<WellId>,
    pub dropped_levels: Vec<String>,
    pub actions: Vec<QcAction>,
    pub baseline: Option<FitSummary>,
    pub suggested: Option<FitSummary>,
}

/// Back-calculated concentration of one sample well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleQuantification {
    pub well_id: WellId,
    pub animal_id: String,
    pub group: Option<String>,
    pub dilution_factor: f64,
    pub net_blank: f64,
    pub conc: Option<f64>,
    pub conc_adjusted: Option<f64>,
}

/// Replicate statistics of `conc_adjusted` per (animal, group).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimalSummary {
    pub animal_id: String,
    pub group: Option<String>,
    pub n: usize,
    pub mean: Option<f64>,
    pub sd: Option<f64>,
}

/// Per-level standard QC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelDiagnostics {
    pub level: String,
    pub conc: f64,
    pub n: usize,
    pub mean: Option<f64>,
    pub sd: Option<f64>,
    pub cv_pct: Option<f64>,
    pub back_calculated: Option<f64>,
    pub recovery_pct: Option<f64>,
}

/// Grouping used for replicate outlier flags.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OutlierGroup {
    Standard { level: String },
    Sample { animal_id: String, dilution_factor: String },
    Blank,
}

impl fmt::Display for OutlierGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutlierGroup::Standard { level } => write!(f, "standard {level}"),
            OutlierGroup::Sample {
                animal_id,
                dilution_factor,
            } => write!(f, "sample {animal_id} (x{dilution_factor})"),
            OutlierGroup::Blank => write!(f, "blank"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierFlag {
    pub well_id: WellId,
    pub group: OutlierGroup,
    pub value: f64,
    pub median: f64,
    pub deviation: f64,
}

/// One fitted standard level as recorded in a curve file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardPoint {
    pub level: String,
    pub conc: f64,
    pub mean: f64,
}

/// Predicted curve on a log-spaced concentration grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveGrid {
    pub conc: Vec<f64>,
    pub absorbance: Vec<f64>,
}

/// Portable fitted-curve file.
///
/// Written by `elisa quantify --export-curve`, read back by `elisa invert`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveFile {
    pub tool: String,
    pub curve: CurveFit,
    /// `[min, max]` concentration of the standards; inversions stay inside it.
    pub conc_range: (f64, f64),
    pub standards: Vec<StandardPoint>,
    pub grid: CurveGrid,
}

/// Levenberg–Marquardt settings for the 4PL fitter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogisticOptions {
    pub max_iter: usize,
    pub lambda0: f64,
    pub tol: f64,
    /// Additional Hill-slope seeds tried after the first (capped by the seed list).
    pub restarts: usize,
}

impl Default for LogisticOptions {
    fn default() -> Self {
        Self {
            max_iter: 90,
            lambda0: 1e-2,
            tol: 1e-10,
            restarts: 3,
        }
    }
}

/// Caps and penalties for the Auto-QC greedy search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoQcOptions {
    pub max_actions: usize,
    pub max_excluded_wells: usize,
    pub max_dropped_levels: usize,
    pub replicate_penalty: f64,
    pub level_penalty: f64,
    pub min_score_improve: f64,
    pub fit: LogisticOptions,
}

impl Default for AutoQcOptions {
    fn default() -> Self {
        Self {
            max_actions: 3,
            max_excluded_wells: 3,
            max_dropped_levels: 1,
            replicate_penalty: 0.005,
            level_penalty: 0.01,
            min_score_improve: 0.001,
            fit: LogisticOptions::default(),
        }
    }
}

/// Options for a full plate quantification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantifyOptions {
    pub blank_subtraction: bool,
    pub curve: CurveKind,
    pub fit: LogisticOptions,
    pub outlier_threshold: f64,
}

impl Default for QuantifyOptions {
    fn default() -> Self {
        Self {
            blank_subtraction: true,
            curve: CurveKind::FourPl,
            fit: LogisticOptions::default(),
            outlier_threshold: 0.15,
        }
    }
}

/// A full `elisa quantify` run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct QuantConfig {
    pub reader_path: PathBuf,
    pub layout_path: PathBuf,
    pub quantify: QuantifyOptions,
    /// Run the Auto-QC search and report its suggestion.
    pub auto_qc: bool,
    /// Honour the Auto-QC suggestion for the final fit.
    pub apply_qc: bool,
    pub auto_qc_options: AutoQcOptions,
    /// `(top_conc, factor)`: replace the layout's standard concentrations
    /// with a serial dilution over its standard labels.
    pub serial_dilution: Option<(f64, f64)>,
    pub export_samples: Option<PathBuf>,
    pub export_summary: Option<PathBuf>,
    pub export_curve: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_id_parses_and_prints() {
        let w: WellId = "b07".parse().unwrap();
        assert_eq!(w.to_string(), "B7");
        assert_eq!(w.row(), 1);
        assert_eq!(w.col(), 6);
        assert!("I1".parse::<WellId>().is_err());
        assert!("A13".parse::<WellId>().is_err());
        assert!("A0".parse::<WellId>().is_err());
        assert!("A".parse::<WellId>().is_err());
    }

    #[test]
    fn well_ids_are_row_major() {
        let all: Vec<WellId> = WellId::all().collect();
        assert_eq!(all.len(), 96);
        assert_eq!(all[0].to_string(), "A1");
        assert_eq!(all[12].to_string(), "B1");
        assert_eq!(all[95].to_string(), "H12");
        assert_eq!(WellId::from_index(13), Some(all[13]));
        assert_eq!(WellId::from_index(96), None);
        assert!(all.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn layout_json_roundtrips_roles() {
        let json = r#"{
            "wells": {
                "A1": {"role": "standard", "standard_level": "Std1"},
                "B1": {"role": "sample", "animal_id": "M1", "dilution_factor": 2.0, "keep": false},
                "C1": {"role": "blank"}
            },
            "standards": {"Std1": 100.0}
        }"#;
        let layout: PlateLayout = serde_json::from_str(json).unwrap();
        let b1 = &layout.wells[&"B1".parse::<WellId>().unwrap()];
        assert!(!b1.keep);
        assert!(matches!(
            &b1.role,
            WellRole::Sample { animal_id, dilution_factor: Some(df), group: None }
                if animal_id == "M1" && *df == 2.0
        ));
        assert!(layout.wells[&"A1".parse::<WellId>().unwrap()].keep);
        assert_eq!(layout.standards["Std1"], 100.0);
    }
}
