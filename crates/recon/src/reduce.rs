//! Multi-reading reducer: per unit, collapse bursts of readings, smooth
//! single-point noise and stop cumulative counters from regressing.
//!
//! Units are independent, so the per-unit pass runs on the rayon pool and the
//! results are concatenated in unit order.

use std::collections::BTreeMap;

use chrono::Duration;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::{ReduceConfig, MAX_CLUSTER_WINDOW_MINUTES};
use crate::model::{CumulativeCounter, GaugeCounter, RawReading, SourceKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReduceStats {
    pub readings_in: usize,
    pub collapsed: usize,
}

/// Reduce every unit of one source. Output is grouped by unit (sorted) and
/// chronological within a unit.
pub fn reduce_source(
    kind: SourceKind,
    readings: Vec<RawReading>,
    config: &ReduceConfig,
) -> (Vec<RawReading>, ReduceStats) {
    let readings_in = readings.len();

    let mut by_unit: BTreeMap<String, Vec<RawReading>> = BTreeMap::new();
    for r in readings {
        by_unit.entry(r.unit.clone()).or_default().push(r);
    }

    let reduced: Vec<(usize, Vec<RawReading>)> = by_unit
        .into_par_iter()
        .map(|(unit, rows)| {
            let before = rows.len();
            let out = reduce_unit(rows, config);
            let collapsed = before - out.len();
            if collapsed > 0 {
                debug!(source = %kind, unit = %unit, collapsed, "collapsed reading clusters");
            }
            (collapsed, out)
        })
        .collect();

    let collapsed = reduced.iter().map(|(c, _)| c).sum();
    let out: Vec<RawReading> = reduced.into_iter().flat_map(|(_, rows)| rows).collect();
    info!(source = %kind, readings_in, kept = out.len(), collapsed, "reduced multi-reading bursts");

    (out, ReduceStats { readings_in, collapsed })
}

/// Reduce the readings of a single unit.
pub fn reduce_unit(mut readings: Vec<RawReading>, config: &ReduceConfig) -> Vec<RawReading> {
    // Stable: among equal timestamps the later input row stays last.
    readings.sort_by_key(|r| r.timestamp);

    let minutes = config.cluster_window_minutes.clamp(0, MAX_CLUSTER_WINDOW_MINUTES);
    let mut readings = collapse_clusters(readings, Duration::minutes(minutes));

    for c in CumulativeCounter::ALL {
        let values: Vec<i64> = readings.iter().map(|r| r.counts.cumulative(c)).collect();
        let smoothed = rolling_median(&values, config.cumulative_median_window);
        for (r, v) in readings.iter_mut().zip(smoothed) {
            *r.counts.cumulative_mut(c) = v;
        }
    }
    for g in GaugeCounter::ALL {
        let values: Vec<i64> = readings.iter().map(|r| r.counts.gauge(g)).collect();
        let smoothed = rolling_median(&values, config.gauge_median_window);
        for (r, v) in readings.iter_mut().zip(smoothed) {
            *r.counts.gauge_mut(g) = v;
        }
    }

    enforce_running_max(&mut readings);
    readings
}

/// Keep only the last reading of every tight cluster: a reading is dropped
/// when the next one arrives within `window`. Input must be sorted.
pub fn collapse_clusters(readings: Vec<RawReading>, window: Duration) -> Vec<RawReading> {
    let next_ts: Vec<Option<_>> = readings
        .iter()
        .skip(1)
        .map(|r| Some(r.timestamp))
        .chain(std::iter::once(None))
        .collect();

    readings
        .into_iter()
        .zip(next_ts)
        .filter(|(r, next)| match next {
            Some(next) => *next - r.timestamp > window,
            None => true,
        })
        .map(|(r, _)| r)
        .collect()
}

/// Centered rolling median with a minimum period of one, so edge points use
/// a truncated window. Even-sized windows average the two middle values and
/// truncate back to an integer.
pub fn rolling_median(values: &[i64], window: usize) -> Vec<i64> {
    if window <= 1 {
        return values.to_vec();
    }
    let n = values.len();
    let ahead = (window - 1) / 2;
    let behind = window - 1 - ahead;

    let mut buf: Vec<i64> = Vec::with_capacity(window.min(n));
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(behind);
            let hi = i.saturating_add(ahead).min(n - 1);
            buf.clear();
            buf.extend_from_slice(&values[lo..=hi]);
            buf.sort_unstable();
            let m = buf.len();
            if m % 2 == 1 {
                buf[m / 2]
            } else {
                // i128 keeps the sum exact; division truncates toward zero.
                ((i128::from(buf[m / 2 - 1]) + i128::from(buf[m / 2])) / 2) as i64
            }
        })
        .collect()
}

/// Replace any cumulative value below the highest seen so far with that high-water mark.
pub fn enforce_running_max(readings: &mut [RawReading]) {
    for c in CumulativeCounter::ALL {
        let mut high = i64::MIN;
        for r in readings.iter_mut() {
            let v = r.counts.cumulative_mut(c);
            if *v < high {
                *v = high;
            } else {
                high = *v;
            }
        }
    }
}
