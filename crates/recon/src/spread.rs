//! Jump spreader: replace a reporting-start step in a cumulative counter
//! with a linear ramp from the start of the series.
//!
//! Only runs over the configured switch dates and counters. A jump below the
//! counter's threshold is the normal case and leaves the series untouched.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Days, NaiveDate};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::DEFAULT_JUMP_THRESHOLD;
use crate::model::{BedCounts, CanonicalRecord, CumulativeCounter};

/// A known date at which some counters changed reporting regime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchPoint {
    pub date: NaiveDate,
    pub counters: Vec<CumulativeCounter>,
}

#[derive(Debug, Clone)]
pub struct SpreadPlan {
    /// Half-width of the detection window around a switch date.
    pub window_days: i64,
    /// Use each unit's first input date as a switch point for every counter.
    pub from_first_input: bool,
    pub thresholds: BTreeMap<CumulativeCounter, i64>,
    pub switch_points: Vec<SwitchPoint>,
}

impl SpreadPlan {
    fn threshold(&self, counter: CumulativeCounter) -> i64 {
        self.thresholds.get(&counter).copied().unwrap_or(DEFAULT_JUMP_THRESHOLD)
    }
}

/// One applied correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpreadFix {
    pub unit: String,
    pub counter: CumulativeCounter,
    pub switch_date: NaiveDate,
    pub diff: i64,
    pub spread_from: NaiveDate,
    pub spread_to: NaiveDate,
}

/// Spread qualifying jumps in place. `first_input` maps each unit to the
/// earliest date it reported anything.
pub fn spread_jumps(
    records: &mut [CanonicalRecord],
    plan: &SpreadPlan,
    first_input: &BTreeMap<String, NaiveDate>,
) -> Vec<SpreadFix> {
    // unit → indices into `records`, in date order
    let mut by_unit: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, r) in records.iter().enumerate() {
        by_unit.entry(r.icu_name.clone()).or_default().push(i);
    }
    for idx in by_unit.values_mut() {
        idx.sort_by_key(|i| records[*i].date);
    }

    let snapshot: &[CanonicalRecord] = records;
    let results: Vec<(Vec<usize>, Vec<BedCounts>, Vec<SpreadFix>)> = by_unit
        .into_par_iter()
        .map(|(unit, idx)| {
            let dates: Vec<NaiveDate> = idx.iter().map(|i| snapshot[*i].date).collect();
            let mut series: Vec<BedCounts> = idx.iter().map(|i| snapshot[*i].counts).collect();
            let switch_points = unit_switch_points(plan, first_input.get(&unit).copied());
            let fixes = spread_unit(&unit, &dates, &mut series, &switch_points, plan);
            (idx, series, fixes)
        })
        .collect();

    let mut fixes = Vec::new();
    for (idx, series, unit_fixes) in results {
        if unit_fixes.is_empty() {
            continue;
        }
        for (i, counts) in idx.into_iter().zip(series) {
            records[i].counts = counts;
        }
        fixes.extend(unit_fixes);
    }

    info!(fixes = fixes.len(), "spread cumulative jumps");
    fixes
}

fn unit_switch_points(plan: &SpreadPlan, first_input: Option<NaiveDate>) -> Vec<SwitchPoint> {
    let mut points = Vec::with_capacity(plan.switch_points.len() + 1);
    if plan.from_first_input {
        if let Some(date) = first_input {
            points.push(SwitchPoint { date, counters: CumulativeCounter::ALL.to_vec() });
        }
    }
    points.extend(plan.switch_points.iter().cloned());
    points
}

/// Spread one unit's dense, date-sorted series. Each counter is fixed at
/// most once; the first qualifying switch point wins.
pub fn spread_unit(
    unit: &str,
    dates: &[NaiveDate],
    series: &mut [BedCounts],
    switch_points: &[SwitchPoint],
    plan: &SpreadPlan,
) -> Vec<SpreadFix> {
    let (Some(&first), Some(&last)) = (dates.first(), dates.last()) else {
        return Vec::new();
    };
    let window = Days::new(plan.window_days.max(0) as u64);
    let mut fixed: BTreeSet<CumulativeCounter> = BTreeSet::new();
    let mut fixes = Vec::new();

    for sp in switch_points {
        let beg = sp.date.checked_sub_days(window).map_or(first, |d| first.max(d));
        let end = sp.date.checked_add_days(window).map_or(last, |d| last.min(d));
        if end < beg {
            continue;
        }
        let (Ok(beg_i), Ok(end_i)) = (dates.binary_search(&beg), dates.binary_search(&end)) else {
            continue;
        };

        for &c in &sp.counters {
            if fixed.contains(&c) {
                continue;
            }
            let end_val = series[end_i].cumulative(c);
            let diff = end_val - series[beg_i].cumulative(c);
            if diff <= 0 || diff < plan.threshold(c) {
                continue;
            }

            let len = (end_i + 1) as i64;
            let step = diff / len;
            let remainder = diff % len;
            for (k, counts) in series[..=end_i].iter_mut().enumerate() {
                *counts.cumulative_mut(c) = (step * (k as i64 + 1)).clamp(0, end_val);
            }
            let tail = series[end_i].cumulative_mut(c);
            *tail = (*tail + remainder).clamp(0, end_val);

            debug!(unit, counter = %c, switch_date = %sp.date, diff, "spread reporting-start jump");
            fixed.insert(c);
            fixes.push(SpreadFix {
                unit: unit.to_string(),
                counter: c,
                switch_date: sp.date,
                diff,
                spread_from: first,
                spread_to: end,
            });
        }
    }
    fixes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daily::date_range;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 3, day).unwrap()
    }

    fn plan() -> SpreadPlan {
        SpreadPlan {
            window_days: 2,
            from_first_input: true,
            thresholds: CumulativeCounter::ALL.into_iter().map(|c| (c, 10)).collect(),
            switch_points: vec![SwitchPoint {
                date: d(25),
                counters: vec![CumulativeCounter::Transferred, CumulativeCounter::Refused],
            }],
        }
    }

    fn series(values: &[i64], counter: CumulativeCounter) -> Vec<BedCounts> {
        values
            .iter()
            .map(|v| {
                let mut c = BedCounts::default();
                *c.cumulative_mut(counter) = *v;
                c
            })
            .collect()
    }

    fn values(series: &[BedCounts], counter: CumulativeCounter) -> Vec<i64> {
        series.iter().map(|c| c.cumulative(counter)).collect()
    }

    #[test]
    fn spreads_reporting_start_jump_linearly() {
        // Unit starts reporting on the 15th with 23 lifetime deaths.
        let dates = date_range(d(10), d(20));
        let mut s = series(&[0, 0, 0, 0, 0, 23, 24, 24, 25, 25, 26], CumulativeCounter::Deaths);
        let points = vec![SwitchPoint { date: d(15), counters: CumulativeCounter::ALL.to_vec() }];
        let fixes = spread_unit("A", &dates, &mut s, &points, &plan());

        // window 13..=17: diff = 24 - 0; range 10..=17 has 8 dates → step 3, remainder 0
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].diff, 24);
        assert_eq!(fixes[0].spread_to, d(17));
        assert_eq!(
            values(&s, CumulativeCounter::Deaths),
            vec![3, 6, 9, 12, 15, 18, 21, 24, 25, 25, 26]
        );
    }

    #[test]
    fn huge_window_covers_whole_series() {
        let dates = date_range(d(10), d(14));
        let mut s = series(&[0, 0, 0, 0, 20], CumulativeCounter::Deaths);
        let points = vec![SwitchPoint { date: d(12), counters: vec![CumulativeCounter::Deaths] }];
        let wide = SpreadPlan { window_days: i64::MAX, ..plan() };
        let fixes = spread_unit("A", &dates, &mut s, &points, &wide);
        assert_eq!(fixes[0].spread_to, d(14));
        assert_eq!(values(&s, CumulativeCounter::Deaths), vec![4, 8, 12, 16, 20]);
    }

    #[test]
    fn remainder_lands_on_final_date() {
        let dates = date_range(d(10), d(14));
        let mut s = series(&[0, 0, 0, 0, 13], CumulativeCounter::Deaths);
        let points = vec![SwitchPoint { date: d(14), counters: vec![CumulativeCounter::Deaths] }];
        spread_unit("A", &dates, &mut s, &points, &plan());
        // window 12..=14, range 10..=14 (5 dates): step 2, remainder 3
        assert_eq!(values(&s, CumulativeCounter::Deaths), vec![2, 4, 6, 8, 13]);
    }

    #[test]
    fn below_threshold_is_noop() {
        let dates = date_range(d(10), d(14));
        let mut s = series(&[0, 0, 9, 9, 9], CumulativeCounter::Deaths);
        let before = s.clone();
        let points = vec![SwitchPoint { date: d(12), counters: vec![CumulativeCounter::Deaths] }];
        let fixes = spread_unit("A", &dates, &mut s, &points, &plan());
        assert!(fixes.is_empty());
        assert_eq!(s, before);
    }

    #[test]
    fn counter_fixed_at_most_once() {
        let dates = date_range(d(20), d(28));
        let mut s = series(&[0, 0, 0, 12, 12, 12, 40, 40, 40], CumulativeCounter::Transferred);
        let points = vec![
            SwitchPoint { date: d(22), counters: vec![CumulativeCounter::Transferred] },
            SwitchPoint { date: d(25), counters: vec![CumulativeCounter::Transferred] },
        ];
        let fixes = spread_unit("A", &dates, &mut s, &points, &plan());
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].switch_date, d(22));
    }

    #[test]
    fn switch_point_outside_series_is_skipped() {
        let dates = date_range(d(1), d(5));
        let mut s = series(&[0, 0, 50, 50, 50], CumulativeCounter::Refused);
        let points = vec![SwitchPoint { date: d(25), counters: vec![CumulativeCounter::Refused] }];
        assert!(spread_unit("A", &dates, &mut s, &points, &plan()).is_empty());
    }

    #[test]
    fn spread_jumps_uses_first_input_dates() {
        let dates = date_range(d(10), d(14));
        let mut records = Vec::new();
        for (i, date) in dates.iter().enumerate() {
            for (unit, vals) in [("A", [0, 0, 0, 20, 20]), ("B", [1, 1, 2, 2, 3])] {
                let mut counts = BedCounts::default();
                *counts.cumulative_mut(CumulativeCounter::Healed) = vals[i];
                records.push(CanonicalRecord {
                    date: *date,
                    icu_name: unit.into(),
                    department: None,
                    counts,
                });
            }
        }
        let first_input = BTreeMap::from([("A".to_string(), d(13)), ("B".to_string(), d(10))]);
        let fixes = spread_jumps(&mut records, &plan(), &first_input);
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].unit, "A");

        let healed = |unit: &str| -> Vec<i64> {
            records
                .iter()
                .filter(|r| r.icu_name == unit)
                .map(|r| r.counts.cumulative(CumulativeCounter::Healed))
                .collect()
        };
        assert_eq!(healed("A"), vec![4, 8, 12, 16, 20]);
        assert_eq!(healed("B"), vec![1, 1, 2, 2, 3]);
    }
}
