//! Derived dataset builders — aggregates layered on top of the canonical table.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::model::{BedCounts, CanonicalRecord, DepartmentDay, DerivedOutputs, RawReading};
use crate::spread::SpreadFix;

/// Build every derived output. `merged` are the readings that fed the grid.
pub fn build_derived(
    records: &[CanonicalRecord],
    merged: &[RawReading],
    spread_fixes: Vec<SpreadFix>,
) -> DerivedOutputs {
    let (department_rollup, units_without_department) = build_department_rollup(records);
    DerivedOutputs {
        department_rollup,
        inputs_per_day: inputs_per_day(merged),
        units_without_department,
        spread_fixes,
    }
}

/// Sum every counter per (date, department), sorted by (date, department).
///
/// Units without a department cannot be placed and are returned separately.
pub fn build_department_rollup(records: &[CanonicalRecord]) -> (Vec<DepartmentDay>, Vec<String>) {
    let mut groups: BTreeMap<(NaiveDate, &str), (usize, BedCounts)> = BTreeMap::new();
    let mut orphans: BTreeSet<&str> = BTreeSet::new();

    for r in records {
        let Some(ref department) = r.department else {
            orphans.insert(r.icu_name.as_str());
            continue;
        };
        let entry = groups
            .entry((r.date, department.as_str()))
            .or_insert_with(|| (0, BedCounts::default()));
        entry.0 += 1;
        entry.1.accumulate(&r.counts);
    }

    let rollup = groups
        .into_iter()
        .map(|((date, department), (unit_count, counts))| DepartmentDay {
            date,
            department: department.to_string(),
            unit_count,
            counts,
        })
        .collect();
    (rollup, orphans.into_iter().map(str::to_string).collect())
}

/// Histogram of raw inputs per (date, unit) cell: inputs → number of cells.
/// Cells with no input are not counted.
pub fn inputs_per_day(readings: &[RawReading]) -> BTreeMap<usize, usize> {
    let mut cells: BTreeMap<(NaiveDate, &str), usize> = BTreeMap::new();
    for r in readings {
        *cells.entry((r.date(), r.unit.as_str())).or_insert(0) += 1;
    }
    let mut histogram = BTreeMap::new();
    for n in cells.into_values() {
        *histogram.entry(n).or_insert(0) += 1;
    }
    histogram
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CumulativeCounter, GaugeCounter};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 3, day).unwrap()
    }

    fn record(day: u32, unit: &str, department: Option<&str>, deaths: i64, free: i64) -> CanonicalRecord {
        let mut counts = BedCounts::default();
        *counts.cumulative_mut(CumulativeCounter::Deaths) = deaths;
        *counts.gauge_mut(GaugeCounter::CovidFree) = free;
        CanonicalRecord {
            date: d(day),
            icu_name: unit.into(),
            department: department.map(str::to_string),
            counts,
        }
    }

    #[test]
    fn rollup_sums_per_department_and_date() {
        let records = vec![
            record(20, "A", Some("Moselle"), 3, 1),
            record(20, "B", Some("Moselle"), 4, 2),
            record(20, "C", Some("Bas-Rhin"), 1, 0),
            record(20, "X", None, 9, 9),
            record(21, "A", Some("Moselle"), 5, 0),
        ];
        let (rollup, orphans) = build_department_rollup(&records);
        assert_eq!(orphans, vec!["X"]);
        assert_eq!(rollup.len(), 3);
        assert_eq!(rollup[0].department, "Bas-Rhin");
        assert_eq!(rollup[1].department, "Moselle");
        assert_eq!(rollup[1].unit_count, 2);
        assert_eq!(rollup[1].counts.cumulative(CumulativeCounter::Deaths), 7);
        assert_eq!(rollup[1].counts.gauge(GaugeCounter::CovidFree), 3);
        assert_eq!(rollup[2].date, d(21));
    }

    #[test]
    fn rollup_saturates_instead_of_overflowing() {
        let records = vec![
            record(20, "A", Some("Moselle"), i64::MAX, 0),
            record(20, "B", Some("Moselle"), 5, 0),
        ];
        let (rollup, _) = build_department_rollup(&records);
        assert_eq!(rollup[0].counts.cumulative(CumulativeCounter::Deaths), i64::MAX);
    }

    #[test]
    fn histogram_of_inputs() {
        let at = |day: u32, h: u32| d(day).and_hms_opt(h, 0, 0).unwrap();
        let reading = |unit: &str, ts| RawReading {
            unit: unit.into(),
            timestamp: ts,
            counts: BedCounts::default(),
        };
        let readings = vec![
            reading("A", at(20, 8)),
            reading("A", at(20, 12)),
            reading("A", at(21, 8)),
            reading("B", at(20, 9)),
        ];
        let hist = inputs_per_day(&readings);
        assert_eq!(hist, BTreeMap::from([(1, 2), (2, 1)]));
    }
}
