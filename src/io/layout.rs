//! Plate layout JSON.
//!
//! Layout files are the serialized `PlateLayout`:
//!
//! ```json
//! {
//!   "wells": {
//!     "A1": {"role": "standard", "standard_level": "Std1"},
//!     "E1": {"role": "sample", "animal_id": "M1", "group": "ctrl", "dilution_factor": 2},
//!     "H12": {"role": "blank", "keep": false}
//!   },
//!   "standards": {"Std1": 1000.0}
//! }
//! ```
//!
//! Well keys must be valid ids (`A1`..`H12`); unlisted wells are empty.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::domain::PlateLayout;
use crate::error::AppError;

/// Read a layout file.
pub fn read_layout_json(path: &Path) -> Result<PlateLayout, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open layout JSON '{}': {e}", path.display())))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::new(2, format!("Invalid layout JSON '{}': {e}", path.display())))
}

/// Write a layout file (pretty-printed).
pub fn write_layout_json(path: &Path, layout: &PlateLayout) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create layout JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, layout)
        .map_err(|e| AppError::new(2, format!("Failed to write layout JSON: {e}")))
}
