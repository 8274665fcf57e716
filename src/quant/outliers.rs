//! Replicate outlier flags.

use std::collections::BTreeMap;

use crate::domain::{OutlierFlag, OutlierGroup, PlateLayout, WellId, WellReading, WellRole};
use crate::math::median;

/// Flag wells whose blank-corrected net deviates from their group median by
/// more than `threshold`.
///
/// Groups: standards by level, samples by (animal, dilution factor), all
/// blanks together. Only kept wells with a finite net take part; groups with
/// fewer than two members never flag. Flags are returned in well order.
pub fn flag_outliers(
    readings: &BTreeMap<WellId, WellReading>,
    layout: &PlateLayout,
    blank_offset: f64,
    threshold: f64,
) -> Vec<OutlierFlag> {
    let mut groups: BTreeMap<OutlierGroup, Vec<(WellId, f64)>> = BTreeMap::new();

    for (well_id, assignment) in layout.wells.iter().filter(|(_, a)| a.keep) {
        let Some(group) = group_of(&assignment.role) else {
            continue;
        };
        let Some(net) = readings.get(well_id).and_then(WellReading::finite_net) else {
            continue;
        };
        groups.entry(group).or_default().push((*well_id, net - blank_offset));
    }

    let mut flags = Vec::new();
    for (group, members) in groups {
        if members.len() < 2 {
            continue;
        }
        let values: Vec<f64> = members.iter().map(|(_, v)| *v).collect();
        let Some(m) = median(&values) else {
            continue;
        };
        for (well_id, value) in members {
            let deviation = value - m;
            if deviation.abs() > threshold {
                flags.push(OutlierFlag {
                    well_id,
                    group: group.clone(),
                    value,
                    median: m,
                    deviation,
                });
            }
        }
    }

    flags.sort_by_key(|f| f.well_id);
    flags
}

fn group_of(role: &WellRole) -> Option<OutlierGroup> {
    match role {
        WellRole::Empty => None,
        WellRole::Blank => Some(OutlierGroup::Blank),
        WellRole::Standard { standard_level } => Some(OutlierGroup::Standard {
            level: standard_level.trim().to_string(),
        }),
        WellRole::Sample {
            animal_id,
            dilution_factor,
            ..
        } => Some(OutlierGroup::Sample {
            animal_id: animal_id.trim().to_string(),
            dilution_factor: super::effective_dilution(*dilution_factor).to_string(),
        }),
    }
}
