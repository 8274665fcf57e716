//! Plate-reader text parsing.
//!
//! This module turns text pasted or exported from a plate reader into
//! per-well dual-wavelength readings. Two shapes are recognised, tried in
//! order:
//!
//! - **plate blocks**: a header row with two `1` labels marking two 12-column
//!   blocks (450 nm then 570 nm), followed by 8 rows A–H
//! - **list**: a header row with `450` and `570` columns, optionally a well
//!   column and a temperature column
//!
//! Design goals:
//! - **Missing is not zero**: sentinels (`NA`, `#DIV/0!`, …), blanks and
//!   garbage become `None`; only cells past the end of a short plate-block
//!   row are padded with `0`
//! - **Row-level tolerance** in the list format (skip bad rows, report why)
//! - **Exact nets**: `net` is rounded to the pasted precision so
//!   `0.9768 - 0.1063` is `0.8705`
//! - **Pure**: no I/O, no panics; failure is an empty map plus a warning

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::domain::{WellId, WellReading, PLATE_ROWS};

/// Warning emitted when neither format matches.
pub const UNPARSEABLE_WARNING: &str =
    "Could not parse the reader output. Try pasting the 450/570 plate blocks as tab-separated text.";

const BLOCK_WIDTH: usize = 12;
const DETECT_LINES: usize = 5;
const SENTINELS: [&str; 5] = ["NA", "NAN", "INF", "#DIV/0!", "UNDETERMINED"];
/// Cap on decimals used to round nets (beyond this, float noise dominates).
const MAX_DECIMALS: u32 = 10;
/// Fill for cells a short plate-block row does not reach.
const ZERO_PAD: Cell = Cell {
    value: 0.0,
    decimals: Some(0),
};

/// Which input shape was recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReaderFormat {
    PlateBlocks,
    List,
}

impl fmt::Display for ReaderFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderFormat::PlateBlocks => write!(f, "plate blocks"),
            ReaderFormat::List => write!(f, "list"),
        }
    }
}

/// Parser output.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ReaderParse {
    pub wells: BTreeMap<WellId, WellReading>,
    pub temperature_c: Option<f64>,
    pub warnings: Vec<String>,
    pub format: Option<ReaderFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Split {
    Delimiter(u8),
    Whitespace,
}

impl Split {
    fn allows_decimal_comma(self) -> bool {
        self != Split::Delimiter(b',')
    }
}

/// A parsed numeric cell and the number of decimals it was written with.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Cell {
    value: f64,
    decimals: Option<u32>,
}

/// Parse reader text. Never fails: unrecognised input yields an empty map and
/// [`UNPARSEABLE_WARNING`].
pub fn parse_reader_output(text: &str) -> ReaderParse {
    let text = text.trim_start_matches('\u{feff}');
    let split = detect_split(text);
    let rows = tokenize(text, split);
    debug!(?split, rows = rows.len(), "reader text tokenized");

    if let Some(parsed) = parse_plate_blocks(&rows, split) {
        debug!(wells = parsed.wells.len(), "reader format: plate blocks");
        return parsed;
    }
    if let Some(parsed) = parse_list(&rows, split) {
        debug!(wells = parsed.wells.len(), "reader format: list");
        return parsed;
    }

    debug!("reader format not recognised");
    ReaderParse {
        warnings: vec![UNPARSEABLE_WARNING.to_string()],
        ..ReaderParse::default()
    }
}

/// Count tab, comma, semicolon and pipe over the first non-blank lines; the
/// highest count wins and ties keep that order.
fn detect_split(text: &str) -> Split {
    let sample: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(DETECT_LINES)
        .collect();

    let mut best: Option<(u8, usize)> = None;
    for d in [b'\t', b',', b';', b'|'] {
        let count: usize = sample.iter().map(|l| l.bytes().filter(|b| *b == d).count()).sum();
        if count > 0 && best.is_none_or(|(_, c)| count > c) {
            best = Some((d, count));
        }
    }
    best.map_or(Split::Whitespace, |(d, _)| Split::Delimiter(d))
}

/// Split into trimmed cells, dropping rows with no content.
fn tokenize(text: &str, split: Split) -> Vec<Vec<String>> {
    let rows: Vec<Vec<String>> = match split {
        Split::Whitespace => text
            .lines()
            .map(|l| l.split_whitespace().map(String::from).collect())
            .collect(),
        Split::Delimiter(d) => {
            let mut reader = csv::ReaderBuilder::new()
                .delimiter(d)
                .has_headers(false)
                .flexible(true)
                .trim(csv::Trim::All)
                .from_reader(text.as_bytes());
            reader
                .records()
                .filter_map(Result::ok)
                .map(|r| r.iter().map(String::from).collect())
                .collect()
        }
    };
    rows.into_iter()
        .filter(|r: &Vec<String>| r.iter().any(|c| !c.is_empty()))
        .collect()
}

fn parse_cell(token: &str, split: Split) -> Option<Cell> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    let upper = token.to_ascii_uppercase();
    if SENTINELS.contains(&upper.as_str()) {
        return None;
    }

    let normalized = if split.allows_decimal_comma() && is_decimal_comma(token) {
        token.replacen(',', ".", 1)
    } else {
        token.to_string()
    };

    let value: f64 = normalized.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    let decimals = if normalized.contains(['e', 'E']) {
        None
    } else {
        Some(normalized.split_once('.').map_or(0, |(_, frac)| frac.len() as u32))
    };
    Some(Cell { value, decimals })
}

/// `-?digits,digits` with exactly one comma and no dot.
fn is_decimal_comma(token: &str) -> bool {
    let body = token.strip_prefix('-').unwrap_or(token);
    match body.split_once(',') {
        Some((int, frac)) => {
            !int.is_empty()
                && !frac.is_empty()
                && int.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// Build a reading; the net is rounded to the finer of the two inputs'
/// decimal places.
fn reading(a450: Option<Cell>, a570: Option<Cell>) -> WellReading {
    let net = match (a450, a570) {
        (Some(a), Some(b)) => {
            let raw = a.value - b.value;
            match (a.decimals, b.decimals) {
                (Some(da), Some(db)) => Some(round_to(raw, da.max(db).min(MAX_DECIMALS))),
                _ => Some(raw),
            }
        }
        _ => None,
    };
    WellReading {
        a450: a450.map(|c| c.value),
        a570: a570.map(|c| c.value),
        net,
    }
}

fn round_to(v: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (v * scale).round() / scale
}

fn parse_plate_blocks(rows: &[Vec<String>], split: Split) -> Option<ReaderParse> {
    let (header_idx, s1, s2) = rows.iter().enumerate().find_map(|(i, row)| {
        let mut ones = row.iter().enumerate().filter(|(_, c)| c.as_str() == "1").map(|(j, _)| j);
        let first = ones.next()?;
        let second = ones.next()?;
        Some((i, first, second))
    })?;

    let data: Vec<Vec<String>> = rows
        .iter()
        .skip(header_idx + 1)
        .take(PLATE_ROWS as usize)
        .map(|row| align_row(row, s1, s2, split))
        .collect();

    // Cells past the end of a short row are zero; cells inside it that do
    // not parse stay missing.
    let block = |row: &[String], start: usize| -> Vec<Option<Cell>> {
        (0..BLOCK_WIDTH)
            .map(|k| match row.get(start + k) {
                Some(t) => parse_cell(t, split),
                None => Some(ZERO_PAD),
            })
            .collect()
    };
    let b450: Vec<Vec<Option<Cell>>> = data.iter().map(|r| block(r, s1)).collect();
    let b570: Vec<Vec<Option<Cell>>> = data.iter().map(|r| block(r, s2)).collect();

    // A row counts as populated only if it actually supplies a value.
    let populated = |start: usize| {
        data.iter()
            .filter(|r| (start..start + BLOCK_WIDTH).any(|j| r.get(j).and_then(|t| parse_cell(t, split)).is_some()))
            .count()
    };
    if populated(s1) < PLATE_ROWS as usize || populated(s2) < PLATE_ROWS as usize {
        debug!(
            rows = data.len(),
            populated_450 = populated(s1),
            populated_570 = populated(s2),
            "plate-block header found but blocks are incomplete"
        );
        return None;
    }

    let temperature_c = if s1 > 0 {
        data.first()
            .and_then(|r| r.first())
            .and_then(|t| parse_cell(t, split))
            .map(|c| c.value)
    } else {
        None
    };

    let mut wells = BTreeMap::new();
    for (r, (row450, row570)) in b450.iter().zip(&b570).enumerate() {
        for c in 0..BLOCK_WIDTH {
            if let Some(id) = WellId::new(r as u8, c as u8) {
                wells.insert(id, reading(row450[c], row570[c]));
            }
        }
    }

    Some(ReaderParse {
        wells,
        temperature_c,
        warnings: Vec::new(),
        format: Some(ReaderFormat::PlateBlocks),
    })
}

/// Whitespace splitting drops empty leading cells; re-align rows that are
/// missing exactly the cells before the first block.
fn align_row(row: &[String], s1: usize, s2: usize, split: Split) -> Vec<String> {
    if split == Split::Whitespace && s1 > 0 && row.len() + s1 == s2 + BLOCK_WIDTH {
        let mut padded = vec![String::new(); s1];
        padded.extend(row.iter().cloned());
        padded
    } else {
        row.to_vec()
    }
}

fn parse_list(rows: &[Vec<String>], split: Split) -> Option<ReaderParse> {
    let (header, body) = rows.split_first()?;
    let lower: Vec<String> = header.iter().map(|h| h.to_lowercase()).collect();
    let find = |pred: &dyn Fn(&str) -> bool| lower.iter().position(|h| pred(h.as_str()));

    let col450 = find(&|h| h.contains("450"))?;
    let col570 = find(&|h| h.contains("570"))?;
    let col_well = find(&|h| h.contains("well") || h.contains("position") || h == "pos");
    let col_temp = find(&|h| h.contains("temp"));

    let mut wells = BTreeMap::new();
    let mut warnings = Vec::new();
    let mut temperature_c = None;

    for (i, row) in body.iter().enumerate() {
        // 1-based data row number, header excluded.
        let n = i + 1;
        if i == 0 {
            temperature_c = col_temp
                .and_then(|c| row.get(c))
                .and_then(|t| parse_cell(t, split))
                .map(|c| c.value);
        }

        let well_id = match col_well {
            Some(c) => {
                let raw = row.get(c).map(String::as_str).unwrap_or("");
                match raw.parse::<WellId>() {
                    Ok(id) => id,
                    Err(_) => {
                        warnings.push(format!("Row {n}: unreadable well id '{raw}', skipped."));
                        continue;
                    }
                }
            }
            None => match WellId::from_index(i) {
                Some(id) => id,
                None => {
                    warnings.push(format!("Row {n}: more rows than wells on a 96-well plate, skipped."));
                    continue;
                }
            },
        };

        let a450 = row.get(col450).and_then(|t| parse_cell(t, split));
        let a570 = row.get(col570).and_then(|t| parse_cell(t, split));
        if wells.insert(well_id, reading(a450, a570)).is_some() {
            warnings.push(format!("Row {n}: duplicate well {well_id}, later row kept."));
        }
    }

    if wells.is_empty() {
        debug!(rows = body.len(), "list header found but no usable rows");
        return None;
    }

    Some(ReaderParse {
        wells,
        temperature_c,
        warnings,
        format: Some(ReaderFormat::List),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(s: &str) -> WellId {
        s.parse().unwrap()
    }

    /// Tab-separated plate blocks with a temperature column and a spacer
    /// column between the blocks. Well (r, c) reads `base + r·0.1 + c·0.01`.
    fn plate_text(sep: &str) -> String {
        let labels: Vec<String> = (1..=12).map(|c| c.to_string()).collect();
        let mut out = format!(
            "Temperature(C){sep}{}{sep}{sep}{}\n",
            labels.join(sep),
            labels.join(sep)
        );
        for r in 0..8 {
            let temp = if r == 0 { "23.8" } else { "" };
            let a450: Vec<String> = (0..12).map(|c| format!("{:.4}", 0.9768 + r as f64 * 0.1 + c as f64 * 0.01)).collect();
            let a570: Vec<String> = (0..12).map(|_| "0.1063".to_string()).collect();
            out.push_str(&format!("{temp}{sep}{}{sep}{sep}{}\n", a450.join(sep), a570.join(sep)));
        }
        out
    }

    #[test]
    fn plate_blocks_give_exact_net() {
        let p = parse_reader_output(&plate_text("\t"));
        assert_eq!(p.format, Some(ReaderFormat::PlateBlocks));
        assert!(p.warnings.is_empty());
        assert_eq!(p.temperature_c, Some(23.8));
        assert_eq!(p.wells.len(), 96);
        assert_eq!(
            p.wells[&w("A1")],
            WellReading {
                a450: Some(0.9768),
                a570: Some(0.1063),
                net: Some(0.8705),
            }
        );
        assert_eq!(p.wells[&w("H12")].a450, Some(1.7868));
    }

    #[test]
    fn semicolon_separator_with_decimal_commas() {
        let text = plate_text(";").replace('.', ",");
        let p = parse_reader_output(&text);
        assert_eq!(p.format, Some(ReaderFormat::PlateBlocks));
        assert_eq!(p.wells[&w("A1")].net, Some(0.8705));
        assert_eq!(p.temperature_c, Some(23.8));
    }

    #[test]
    fn sentinels_and_garbage_are_missing_not_zero() {
        let text = plate_text("\t")
            .replacen("0.9768", "#DIV/0!", 1)
            .replacen("0.9868", "OVRFLW", 1)
            .replacen("0.9968", "na", 1);
        let p = parse_reader_output(&text);
        for id in ["A1", "A2", "A3"] {
            let r = p.wells[&w(id)];
            assert_eq!(r.a450, None);
            assert_eq!(r.net, None);
            assert_eq!(r.a570, Some(0.1063));
        }
    }

    #[test]
    fn incomplete_blocks_are_rejected() {
        let text: String = plate_text("\t").lines().take(6).map(|l| format!("{l}\n")).collect();
        let p = parse_reader_output(&text);
        assert!(p.wells.is_empty());
        assert_eq!(p.format, None);
        assert_eq!(p.warnings, vec![UNPARSEABLE_WARNING.to_string()]);
    }

    #[test]
    fn short_block_rows_are_zero_padded() {
        let mut lines: Vec<String> = plate_text("\t").lines().map(String::from).collect();
        // Row H loses its last 570 nm cell.
        let (kept, _) = lines[8].rsplit_once('\t').unwrap();
        lines[8] = kept.to_string();
        let text = lines.join("\n");

        let p = parse_reader_output(&text);
        assert_eq!(p.format, Some(ReaderFormat::PlateBlocks));
        assert_eq!(
            p.wells[&w("H12")],
            WellReading {
                a450: Some(1.7868),
                a570: Some(0.0),
                net: Some(1.7868),
            }
        );
        assert_eq!(p.wells[&w("H11")].a570, Some(0.1063));
    }

    #[test]
    fn unparseable_text_warns() {
        let p = parse_reader_output("hello world\nnothing to see");
        assert!(p.wells.is_empty());
        assert!(p.warnings[0].contains("Could not parse the reader output."));
    }

    #[test]
    fn whitespace_plate_blocks_realign_rows() {
        let text = plate_text("\t").replace("\t\t", "\t").replace('\t', "   ");
        let p = parse_reader_output(&text);
        assert_eq!(p.format, Some(ReaderFormat::PlateBlocks));
        assert_eq!(p.wells[&w("B1")].a450, Some(1.0768));
        assert_eq!(p.wells[&w("B1")].net, Some(0.9705));
    }

    #[test]
    fn list_with_well_column() {
        let text = "Well,Temp,A450,A570\nA1,24.1,1.2000,0.1000\nB3,,0.5,0.05\nZ9,,1,1\n";
        let p = parse_reader_output(text);
        assert_eq!(p.format, Some(ReaderFormat::List));
        assert_eq!(p.temperature_c, Some(24.1));
        assert_eq!(p.wells.len(), 2);
        assert_eq!(p.wells[&w("A1")].net, Some(1.1));
        assert_eq!(p.wells[&w("B3")].net, Some(0.45));
        assert_eq!(p.warnings.len(), 1);
        assert!(p.warnings[0].contains("Z9"));
    }

    #[test]
    fn list_without_well_column_is_row_major() {
        let mut text = String::from("OD450\tOD570\n");
        for i in 0..98 {
            text.push_str(&format!("{:.2}\t0.1\n", 1.0 + i as f64 / 100.0));
        }
        let p = parse_reader_output(&text);
        assert_eq!(p.format, Some(ReaderFormat::List));
        assert_eq!(p.wells.len(), 96);
        assert_eq!(p.wells[&w("B1")].a450, Some(1.12));
        assert_eq!(p.warnings.len(), 2);
    }

    #[test]
    fn list_without_wavelength_columns_is_rejected() {
        let p = parse_reader_output("Well,Value\nA1,1.0\n");
        assert_eq!(p.format, None);
        assert_eq!(p.warnings, vec![UNPARSEABLE_WARNING.to_string()]);
    }

    #[test]
    fn delimiter_detection_prefers_tab_on_ties() {
        assert_eq!(detect_split("a\tb,c\n"), Split::Delimiter(b'\t'));
        assert_eq!(detect_split("a;b;c\nd|e\n"), Split::Delimiter(b';'));
        assert_eq!(detect_split("a b c\n"), Split::Whitespace);
    }
}
