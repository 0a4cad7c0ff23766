use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::config::CensusConfig;
use crate::correction::apply_corrections;
use crate::daily::DailyPolicy;
use crate::derived::build_derived;
use crate::error::CensusError;
use crate::evidence::{compute_summary, StageCounts};
use crate::merge::merge_and_canonicalize;
use crate::model::{CensusInput, CensusMeta, CensusResult, RawReading, SourceKind};
use crate::normalize::normalize;
use crate::reduce::reduce_source;
use crate::spread::spread_jumps;

/// Run the full reconciliation per config. Returns the canonical table,
/// sorted by (date, unit), plus summary and derived outputs.
pub fn run(config: &CensusConfig, input: &CensusInput) -> Result<CensusResult, CensusError> {
    let policy = config.daily_policy()?;
    let spread_plan = if config.spread.enabled {
        Some(config.spread_plan()?)
    } else {
        None
    };

    let mut legacy = normalize(SourceKind::Legacy, &input.legacy, &config.sources.legacy)?;
    let mut primary = normalize(SourceKind::Primary, &input.primary, &config.sources.primary)?;
    apply_corrections(&mut legacy, &config.corrections);
    apply_corrections(&mut primary, &config.corrections);

    let (legacy, legacy_stats) = reduce_source(SourceKind::Legacy, legacy, &config.reduce);
    let (primary, primary_stats) = reduce_source(SourceKind::Primary, primary, &config.reduce);

    let (mut records, daily_stats, merged) = merge_and_canonicalize(
        legacy,
        primary,
        &policy,
        &input.registry,
        config.grid.include_registry_units,
    );

    let spread_fixes = match spread_plan {
        Some(ref plan) => spread_jumps(&mut records, plan, &first_input_dates(&merged.readings)),
        None => Vec::new(),
    };

    let in_window = |date: NaiveDate| {
        config.start_date.map_or(true, |s| date >= s) && config.end_date.map_or(true, |e| date < e)
    };
    records.retain(|r| in_window(r.date));
    let window_readings: Vec<RawReading> =
        merged.readings.into_iter().filter(|r| in_window(r.date())).collect();

    let stages = StageCounts {
        readings_in: legacy_stats.readings_in + primary_stats.readings_in,
        readings_collapsed: legacy_stats.collapsed + primary_stats.collapsed,
        legacy_rows_superseded: merged.legacy_superseded,
        unvalidated_days: daily_stats.unvalidated_days,
        jumps_spread: spread_fixes.len(),
    };
    let summary = compute_summary(&records, stages, matches!(policy, DailyPolicy::LastOfDay));
    if summary.monotonicity_violations > 0 {
        warn!(
            violations = summary.monotonicity_violations,
            "cumulative counters regress in the canonical table; sources disagree at the cutover"
        );
    }
    let derived = build_derived(&records, &window_readings, spread_fixes);

    info!(
        config = %config.name,
        rows = summary.rows,
        units = summary.units,
        dates = summary.dates,
        "census reconciliation complete"
    );

    Ok(CensusResult {
        meta: CensusMeta {
            config_name: config.name.clone(),
            policy: config.policy_name().to_string(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            first_date: records.first().map(|r| r.date),
            last_date: records.last().map(|r| r.date),
        },
        summary,
        records,
        derived,
    })
}

/// Earliest reported date per unit.
pub fn first_input_dates(readings: &[RawReading]) -> BTreeMap<String, NaiveDate> {
    let mut first: BTreeMap<String, NaiveDate> = BTreeMap::new();
    for r in readings {
        first
            .entry(r.unit.clone())
            .and_modify(|d| *d = (*d).min(r.date()))
            .or_insert_with(|| r.date());
    }
    first
}
