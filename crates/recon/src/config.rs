use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::daily::{DailyPolicy, IncreaseBounds};
use crate::error::CensusError;
use crate::load::SourceFormat;
use crate::model::{Counter, CumulativeCounter};
use crate::normalize::{DATE_COLUMN, UNIT_COLUMN};
use crate::spread::{SpreadPlan, SwitchPoint};

/// Daily increase cap and jump threshold used when a counter is not listed.
pub const DEFAULT_MAX_DAILY_INCREASE: i64 = 10;
pub const DEFAULT_JUMP_THRESHOLD: i64 = 10;
/// Bursts are collapsed within a day at most.
pub const MAX_CLUSTER_WINDOW_MINUTES: i64 = 24 * 60;
pub const MAX_SPREAD_WINDOW_DAYS: i64 = 366;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CensusConfig {
    pub name: String,
    /// First date kept in the emitted table (inclusive).
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// Cutoff date of the emitted table (exclusive).
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub sources: SourcesConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub reduce: ReduceConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub spread: SpreadConfig,
    #[serde(default)]
    pub corrections: Vec<CorrectionConfig>,
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    pub legacy: SourceConfig,
    pub primary: SourceConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceConfig {
    pub file: String,
    /// Overrides the extension-based format detection.
    #[serde(default)]
    pub format: Option<String>,
    /// Raw column name → canonical column name.
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
    /// Wrong or retired unit identifier → canonical identifier.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Reducer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReduceConfig {
    #[serde(default = "default_cluster_window")]
    pub cluster_window_minutes: i64,
    #[serde(default = "default_cumulative_window")]
    pub cumulative_median_window: usize,
    #[serde(default = "default_gauge_window")]
    pub gauge_median_window: usize,
}

fn default_cluster_window() -> i64 {
    15
}

fn default_cumulative_window() -> usize {
    5
}

fn default_gauge_window() -> usize {
    3
}

impl Default for ReduceConfig {
    fn default() -> Self {
        Self {
            cluster_window_minutes: default_cluster_window(),
            cumulative_median_window: default_cumulative_window(),
            gauge_median_window: default_gauge_window(),
        }
    }
}

// ---------------------------------------------------------------------------
// Daily policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyConfig {
    LastOfDay,
    BoundedIncrease {
        /// Counter column → maximum accepted increase per elapsed day.
        #[serde(default)]
        max_daily_increase: BTreeMap<String, i64>,
    },
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::LastOfDay
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GridConfig {
    /// Add every registry unit to the grid, even units with no readings.
    #[serde(default)]
    pub include_registry_units: bool,
}

// ---------------------------------------------------------------------------
// Jump spreader + corrections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SpreadConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_spread_window")]
    pub window_days: i64,
    /// Treat each unit's first input date as a switch date for every cumulative counter.
    #[serde(default = "default_true")]
    pub from_first_input: bool,
    #[serde(default)]
    pub thresholds: BTreeMap<String, i64>,
    #[serde(default)]
    pub switch_dates: Vec<SwitchDateConfig>,
}

fn default_spread_window() -> i64 {
    2
}

fn default_true() -> bool {
    true
}

impl Default for SpreadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window_days: default_spread_window(),
            from_first_input: true,
            thresholds: BTreeMap::new(),
            switch_dates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwitchDateConfig {
    pub date: NaiveDate,
    pub counters: Vec<String>,
}

/// `target = max(0, target - subtract)` on one unit's raw readings.
#[derive(Debug, Clone, Deserialize)]
pub struct CorrectionConfig {
    pub unit: String,
    pub target: String,
    pub subtract: String,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl CensusConfig {
    pub fn from_toml(input: &str) -> Result<Self, CensusError> {
        let config: CensusConfig =
            toml::from_str(input).map_err(|e| CensusError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CensusError> {
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start >= end {
                return Err(CensusError::ConfigValidation(format!(
                    "start_date {start} must be before end_date {end}"
                )));
            }
        }

        for (label, source) in [("legacy", &self.sources.legacy), ("primary", &self.sources.primary)] {
            if let Some(ref fmt) = source.format {
                SourceFormat::parse(fmt).ok_or_else(|| {
                    CensusError::ConfigValidation(format!("source '{label}': unknown format '{fmt}'"))
                })?;
            }
            for (raw, canonical) in &source.columns {
                let known = canonical == UNIT_COLUMN
                    || canonical == DATE_COLUMN
                    || Counter::from_column(canonical).is_some();
                if !known {
                    return Err(CensusError::ConfigValidation(format!(
                        "source '{label}': column '{raw}' maps to unknown canonical column '{canonical}'"
                    )));
                }
            }
        }

        let r = &self.reduce;
        if r.cumulative_median_window == 0 || r.gauge_median_window == 0 {
            return Err(CensusError::ConfigValidation(
                "median windows must be at least 1".into(),
            ));
        }
        if !(0..=MAX_CLUSTER_WINDOW_MINUTES).contains(&r.cluster_window_minutes) {
            return Err(CensusError::ConfigValidation(format!(
                "cluster_window_minutes must be between 0 and {MAX_CLUSTER_WINDOW_MINUTES}"
            )));
        }

        // Resolving surfaces unknown counters and negative rates.
        let policy = self.daily_policy()?;

        if self.spread.enabled {
            if matches!(policy, DailyPolicy::BoundedIncrease(_)) {
                return Err(CensusError::ConfigValidation(
                    "spread requires the last_of_day policy (bounded_increase emits increases, not totals)"
                        .into(),
                ));
            }
            self.spread_plan()?;
        }

        for correction in &self.corrections {
            if correction.unit.is_empty() {
                return Err(CensusError::ConfigValidation("correction with empty unit".into()));
            }
            for column in [&correction.target, &correction.subtract] {
                if Counter::from_column(column).is_none() {
                    return Err(CensusError::ConfigValidation(format!(
                        "correction for '{}': unknown counter '{column}'",
                        correction.unit
                    )));
                }
            }
        }

        Ok(())
    }

    /// Resolve the configured policy into its runtime form.
    pub fn daily_policy(&self) -> Result<DailyPolicy, CensusError> {
        match &self.policy {
            PolicyConfig::LastOfDay => Ok(DailyPolicy::LastOfDay),
            PolicyConfig::BoundedIncrease { max_daily_increase } => {
                let per_counter =
                    resolve_per_counter(max_daily_increase, DEFAULT_MAX_DAILY_INCREASE, "max_daily_increase")?;
                Ok(DailyPolicy::BoundedIncrease(IncreaseBounds::new(per_counter)))
            }
        }
    }

    /// Resolve the spreader thresholds and switch dates.
    pub fn spread_plan(&self) -> Result<SpreadPlan, CensusError> {
        let s = &self.spread;
        if !(0..=MAX_SPREAD_WINDOW_DAYS).contains(&s.window_days) {
            return Err(CensusError::ConfigValidation(format!(
                "spread.window_days must be between 0 and {MAX_SPREAD_WINDOW_DAYS}"
            )));
        }
        let thresholds = resolve_per_counter(&s.thresholds, DEFAULT_JUMP_THRESHOLD, "spread.thresholds")?;

        let mut switch_points = Vec::with_capacity(s.switch_dates.len());
        for sd in &s.switch_dates {
            let mut counters = Vec::with_capacity(sd.counters.len());
            for name in &sd.counters {
                let c = CumulativeCounter::from_column(name).ok_or_else(|| {
                    CensusError::ConfigValidation(format!(
                        "spread.switch_dates {}: '{name}' is not a cumulative counter",
                        sd.date
                    ))
                })?;
                counters.push(c);
            }
            switch_points.push(SwitchPoint { date: sd.date, counters });
        }

        Ok(SpreadPlan {
            window_days: s.window_days,
            from_first_input: s.from_first_input,
            thresholds,
            switch_points,
        })
    }

    pub fn policy_name(&self) -> &'static str {
        match self.policy {
            PolicyConfig::LastOfDay => "last_of_day",
            PolicyConfig::BoundedIncrease { .. } => "bounded_increase",
        }
    }
}

/// Fill a full per-counter table from a sparse name-keyed map.
fn resolve_per_counter(
    raw: &BTreeMap<String, i64>,
    default: i64,
    section: &str,
) -> Result<BTreeMap<CumulativeCounter, i64>, CensusError> {
    let mut resolved: BTreeMap<CumulativeCounter, i64> =
        CumulativeCounter::ALL.into_iter().map(|c| (c, default)).collect();
    for (name, value) in raw {
        let counter = CumulativeCounter::from_column(name).ok_or_else(|| {
            CensusError::ConfigValidation(format!("{section}: '{name}' is not a cumulative counter"))
        })?;
        if *value < 0 {
            return Err(CensusError::ConfigValidation(format!(
                "{section}: '{name}' must not be negative"
            )));
        }
        resolved.insert(counter, *value);
    }
    Ok(resolved)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
