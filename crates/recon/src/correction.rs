//! Per-unit counter corrections for units known to report a counter
//! that double-counts another one.

use tracing::debug;

use crate::config::CorrectionConfig;
use crate::model::{Counter, RawReading};

/// Apply every configured correction in order: `target = max(0, target - subtract)`
/// on the readings of the named unit. Corrections naming unknown counters
/// are rejected at config validation and skipped here.
pub fn apply_corrections(readings: &mut [RawReading], corrections: &[CorrectionConfig]) -> usize {
    let mut touched = 0;
    for correction in corrections {
        let (Some(target), Some(subtract)) = (
            Counter::from_column(&correction.target),
            Counter::from_column(&correction.subtract),
        ) else {
            continue;
        };
        let mut n = 0;
        for reading in readings.iter_mut().filter(|r| r.unit == correction.unit) {
            let corrected = (reading.counts.get(target) - reading.counts.get(subtract)).max(0);
            *reading.counts.get_mut(target) = corrected;
            n += 1;
        }
        debug!(unit = %correction.unit, target = %correction.target, rows = n, "applied counter correction");
        touched += n;
    }
    touched
}
