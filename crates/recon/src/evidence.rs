use std::collections::{BTreeMap, BTreeSet};

use crate::model::{CanonicalRecord, CensusSummary, CumulativeCounter};

/// Stage counters gathered by the engine while it runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageCounts {
    pub readings_in: usize,
    pub readings_collapsed: usize,
    pub legacy_rows_superseded: usize,
    pub unvalidated_days: usize,
    pub jumps_spread: usize,
}

/// Compute summary statistics over the final table.
pub fn compute_summary(records: &[CanonicalRecord], stages: StageCounts, check_monotonic: bool) -> CensusSummary {
    let dates: BTreeSet<_> = records.iter().map(|r| r.date).collect();
    let units: BTreeSet<&str> = records.iter().map(|r| r.icu_name.as_str()).collect();
    let without_department: BTreeSet<&str> = records
        .iter()
        .filter(|r| r.department.is_none())
        .map(|r| r.icu_name.as_str())
        .collect();

    CensusSummary {
        dates: dates.len(),
        units: units.len(),
        rows: records.len(),
        units_without_department: without_department.len(),
        readings_in: stages.readings_in,
        readings_collapsed: stages.readings_collapsed,
        legacy_rows_superseded: stages.legacy_rows_superseded,
        unvalidated_days: stages.unvalidated_days,
        jumps_spread: stages.jumps_spread,
        monotonicity_violations: if check_monotonic {
            count_monotonicity_violations(records)
        } else {
            0
        },
    }
}

/// Number of (unit, counter, consecutive date pair) where a cumulative counter decreased.
pub fn count_monotonicity_violations(records: &[CanonicalRecord]) -> usize {
    let mut by_unit: BTreeMap<&str, Vec<&CanonicalRecord>> = BTreeMap::new();
    for r in records {
        by_unit.entry(r.icu_name.as_str()).or_default().push(r);
    }
    let mut violations = 0;
    for rows in by_unit.values_mut() {
        rows.sort_by_key(|r| r.date);
        for pair in rows.windows(2) {
            for c in CumulativeCounter::ALL {
                if pair[1].counts.cumulative(c) < pair[0].counts.cumulative(c) {
                    violations += 1;
                }
            }
        }
    }
    violations
}
