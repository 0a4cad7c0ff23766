//! Source merger: legacy + primary history into one reading stream.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::info;

use crate::daily::{canonicalize, DailyPolicy, DailyStats};
use crate::model::{CanonicalRecord, RawReading};
use crate::registry::UnitRegistry;

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Surviving legacy readings followed by every primary reading.
    pub readings: Vec<RawReading>,
    /// Dates reported by both sources; legacy rows on these dates were dropped.
    pub overlap_dates: BTreeSet<NaiveDate>,
    pub legacy_superseded: usize,
}

/// Drop every legacy reading whose date the primary source also covers, then
/// concatenate. The primary source wins whole dates; fields are never blended.
pub fn merge_sources(legacy: Vec<RawReading>, primary: Vec<RawReading>) -> MergeOutcome {
    let primary_dates: BTreeSet<NaiveDate> = primary.iter().map(RawReading::date).collect();
    let legacy_dates: BTreeSet<NaiveDate> = legacy.iter().map(RawReading::date).collect();
    let overlap_dates: BTreeSet<NaiveDate> =
        legacy_dates.intersection(&primary_dates).copied().collect();

    let legacy_in = legacy.len();
    let mut readings: Vec<RawReading> = legacy
        .into_iter()
        .filter(|r| !overlap_dates.contains(&r.date()))
        .collect();
    let legacy_superseded = legacy_in - readings.len();
    readings.extend(primary);

    info!(
        overlap_dates = overlap_dates.len(),
        legacy_superseded,
        merged = readings.len(),
        "merged legacy and primary sources"
    );

    MergeOutcome { readings, overlap_dates, legacy_superseded }
}

/// Merge, then canonicalize the union into the dense daily grid.
pub fn merge_and_canonicalize(
    legacy: Vec<RawReading>,
    primary: Vec<RawReading>,
    policy: &DailyPolicy,
    registry: &UnitRegistry,
    include_registry_units: bool,
) -> (Vec<CanonicalRecord>, DailyStats, MergeOutcome) {
    let outcome = merge_sources(legacy, primary);
    let (records, stats) = canonicalize(&outcome.readings, policy, registry, include_registry_units);
    (records, stats, outcome)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;
    use crate::model::{BedCounts, CumulativeCounter};

    fn at(day: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 3, day).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    fn reading(unit: &str, ts: NaiveDateTime, deaths: i64) -> RawReading {
        let mut counts = BedCounts::default();
        *counts.cumulative_mut(CumulativeCounter::Deaths) = deaths;
        RawReading { unit: unit.into(), timestamp: ts, counts }
    }

    #[test]
    fn primary_wins_overlapping_date() {
        let legacy = vec![reading("B", at(19, 0), 2), reading("B", at(20, 0), 3)];
        let primary = vec![reading("B", at(20, 9), 7)];
        let outcome = merge_sources(legacy, primary);
        assert_eq!(outcome.legacy_superseded, 1);
        assert_eq!(outcome.overlap_dates.len(), 1);
        assert!(outcome
            .readings
            .iter()
            .all(|r| !(r.date() == at(20, 0).date() && r.counts.cumulative(CumulativeCounter::Deaths) == 3)));

        let (records, _, _) = merge_and_canonicalize(
            vec![reading("B", at(19, 0), 2), reading("B", at(20, 23), 3)],
            vec![reading("B", at(20, 9), 7)],
            &DailyPolicy::LastOfDay,
            &UnitRegistry::default(),
            false,
        );
        let on_20 = records.iter().find(|r| r.date == at(20, 0).date()).unwrap();
        assert_eq!(on_20.counts.cumulative(CumulativeCounter::Deaths), 7);
    }

    #[test]
    fn primary_wins_even_below_prior_legacy_value() {
        let (records, _, _) = merge_and_canonicalize(
            vec![reading("B", at(19, 0), 10), reading("B", at(20, 0), 3)],
            vec![reading("B", at(20, 9), 7)],
            &DailyPolicy::LastOfDay,
            &UnitRegistry::default(),
            false,
        );
        let deaths: Vec<i64> = records.iter().map(|r| r.counts.cumulative(CumulativeCounter::Deaths)).collect();
        assert_eq!(deaths, vec![10, 7]);
        assert_eq!(crate::evidence::count_monotonicity_violations(&records), 1);
    }

    #[test]
    fn overlap_is_by_date_across_units() {
        // Primary covers the 20th for unit P only; legacy rows of unit L on the 20th still go.
        let legacy = vec![reading("L", at(20, 0), 1), reading("L", at(18, 0), 1)];
        let primary = vec![reading("P", at(20, 9), 4)];
        let outcome = merge_sources(legacy, primary);
        assert_eq!(outcome.legacy_superseded, 1);
        let units: Vec<&str> = outcome.readings.iter().map(|r| r.unit.as_str()).collect();
        assert_eq!(units, vec!["L", "P"]);
    }

    #[test]
    fn disjoint_sources_concatenate() {
        let legacy = vec![reading("A", at(10, 0), 1)];
        let primary = vec![reading("A", at(12, 8), 2)];
        let outcome = merge_sources(legacy, primary);
        assert!(outcome.overlap_dates.is_empty());
        assert_eq!(outcome.readings.len(), 2);
    }
}
