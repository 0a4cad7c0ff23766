use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::registry::UnitRegistry;
use crate::spread::SpreadFix;

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Lifetime running totals. Never allowed to regress for a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CumulativeCounter {
    Deaths,
    Healed,
    Transferred,
    Refused,
}

impl CumulativeCounter {
    pub const ALL: [Self; 4] = [Self::Deaths, Self::Healed, Self::Transferred, Self::Refused];

    /// Canonical column name.
    pub fn column(self) -> &'static str {
        match self {
            Self::Deaths => "n_covid_deaths",
            Self::Healed => "n_covid_healed",
            Self::Transferred => "n_covid_transfered",
            Self::Refused => "n_covid_refused",
        }
    }

    pub fn from_column(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.column() == name)
    }
}

impl std::fmt::Display for CumulativeCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// Point-in-time occupancy counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GaugeCounter {
    CovidFree,
    NonCovidFree,
    CovidOccupied,
    NonCovidOccupied,
}

impl GaugeCounter {
    pub const ALL: [Self; 4] = [
        Self::CovidFree,
        Self::NonCovidFree,
        Self::CovidOccupied,
        Self::NonCovidOccupied,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Self::CovidFree => "n_covid_free",
            Self::NonCovidFree => "n_ncovid_free",
            Self::CovidOccupied => "n_covid_occ",
            Self::NonCovidOccupied => "n_ncovid_occ",
        }
    }

    pub fn from_column(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.column() == name)
    }
}

impl std::fmt::Display for GaugeCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// Either kind of counter, addressed by canonical column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    Cumulative(CumulativeCounter),
    Gauge(GaugeCounter),
}

impl Counter {
    pub fn from_column(name: &str) -> Option<Self> {
        CumulativeCounter::from_column(name)
            .map(Self::Cumulative)
            .or_else(|| GaugeCounter::from_column(name).map(Self::Gauge))
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::Cumulative(c) => c.column(),
            Self::Gauge(g) => g.column(),
        }
    }

    /// All eight counters, cumulative first, in canonical column order.
    pub fn all() -> impl Iterator<Item = Counter> {
        CumulativeCounter::ALL
            .into_iter()
            .map(Self::Cumulative)
            .chain(GaugeCounter::ALL.into_iter().map(Self::Gauge))
    }
}

/// The eight bed-count fields carried by both raw readings and canonical records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BedCounts {
    pub n_covid_deaths: i64,
    pub n_covid_healed: i64,
    pub n_covid_transfered: i64,
    pub n_covid_refused: i64,
    pub n_covid_free: i64,
    pub n_ncovid_free: i64,
    pub n_covid_occ: i64,
    pub n_ncovid_occ: i64,
}

impl BedCounts {
    pub fn cumulative(&self, counter: CumulativeCounter) -> i64 {
        match counter {
            CumulativeCounter::Deaths => self.n_covid_deaths,
            CumulativeCounter::Healed => self.n_covid_healed,
            CumulativeCounter::Transferred => self.n_covid_transfered,
            CumulativeCounter::Refused => self.n_covid_refused,
        }
    }

    pub fn cumulative_mut(&mut self, counter: CumulativeCounter) -> &mut i64 {
        match counter {
            CumulativeCounter::Deaths => &mut self.n_covid_deaths,
            CumulativeCounter::Healed => &mut self.n_covid_healed,
            CumulativeCounter::Transferred => &mut self.n_covid_transfered,
            CumulativeCounter::Refused => &mut self.n_covid_refused,
        }
    }

    pub fn gauge(&self, counter: GaugeCounter) -> i64 {
        match counter {
            GaugeCounter::CovidFree => self.n_covid_free,
            GaugeCounter::NonCovidFree => self.n_ncovid_free,
            GaugeCounter::CovidOccupied => self.n_covid_occ,
            GaugeCounter::NonCovidOccupied => self.n_ncovid_occ,
        }
    }

    pub fn gauge_mut(&mut self, counter: GaugeCounter) -> &mut i64 {
        match counter {
            GaugeCounter::CovidFree => &mut self.n_covid_free,
            GaugeCounter::NonCovidFree => &mut self.n_ncovid_free,
            GaugeCounter::CovidOccupied => &mut self.n_covid_occ,
            GaugeCounter::NonCovidOccupied => &mut self.n_ncovid_occ,
        }
    }

    pub fn get(&self, counter: Counter) -> i64 {
        match counter {
            Counter::Cumulative(c) => self.cumulative(c),
            Counter::Gauge(g) => self.gauge(g),
        }
    }

    pub fn get_mut(&mut self, counter: Counter) -> &mut i64 {
        match counter {
            Counter::Cumulative(c) => self.cumulative_mut(c),
            Counter::Gauge(g) => self.gauge_mut(g),
        }
    }

    /// Copy every gauge field from `other`, leaving cumulative fields alone.
    pub fn copy_gauges_from(&mut self, other: &BedCounts) {
        for g in GaugeCounter::ALL {
            *self.gauge_mut(g) = other.gauge(g);
        }
    }

    /// Field-wise sum, used by department rollups. Saturates at `i64::MAX`.
    pub fn accumulate(&mut self, other: &BedCounts) {
        for c in Counter::all() {
            let v = self.get_mut(c);
            *v = v.saturating_add(other.get(c));
        }
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A source table as loaded from disk: headers plus string cells, nothing interpreted yet.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Which historical source a reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Legacy,
    Primary,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Primary => write!(f, "primary"),
        }
    }
}

/// One normalized observation for a unit at an arbitrary timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReading {
    pub unit: String,
    pub timestamp: NaiveDateTime,
    pub counts: BedCounts,
}

impl RawReading {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// Pre-loaded tables and reference data for one run.
pub struct CensusInput {
    pub legacy: RawTable,
    pub primary: RawTable,
    pub registry: UnitRegistry,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// The single reconciled row for a (unit, date) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalRecord {
    pub date: NaiveDate,
    pub icu_name: String,
    pub department: Option<String>,
    #[serde(flatten)]
    pub counts: BedCounts,
}

impl CanonicalRecord {
    /// Column order of the exported table.
    pub fn csv_headers() -> Vec<&'static str> {
        let mut headers = vec!["date", "icu_name", "department"];
        headers.extend(Counter::all().map(Counter::column));
        headers
    }

    pub fn csv_fields(&self) -> Vec<String> {
        let mut fields = vec![
            self.date.to_string(),
            self.icu_name.clone(),
            self.department.clone().unwrap_or_default(),
        ];
        fields.extend(Counter::all().map(|c| self.counts.get(c).to_string()));
        fields
    }
}

/// Summed counters for every unit of a department on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepartmentDay {
    pub date: NaiveDate,
    pub department: String,
    pub unit_count: usize,
    #[serde(flatten)]
    pub counts: BedCounts,
}

impl DepartmentDay {
    pub fn csv_headers() -> Vec<&'static str> {
        let mut headers = vec!["date", "department", "unit_count"];
        headers.extend(Counter::all().map(Counter::column));
        headers
    }

    pub fn csv_fields(&self) -> Vec<String> {
        let mut fields = vec![self.date.to_string(), self.department.clone(), self.unit_count.to_string()];
        fields.extend(Counter::all().map(|c| self.counts.get(c).to_string()));
        fields
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DerivedOutputs {
    pub department_rollup: Vec<DepartmentDay>,
    /// Number of raw inputs in a (date, unit) cell → how many cells had that many.
    pub inputs_per_day: BTreeMap<usize, usize>,
    pub units_without_department: Vec<String>,
    /// Jumps redistributed by the spreader, in (unit, counter) order.
    pub spread_fixes: Vec<SpreadFix>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CensusSummary {
    pub dates: usize,
    pub units: usize,
    pub rows: usize,
    pub units_without_department: usize,
    pub readings_in: usize,
    pub readings_collapsed: usize,
    pub legacy_rows_superseded: usize,
    pub unvalidated_days: usize,
    pub jumps_spread: usize,
    pub monotonicity_violations: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CensusMeta {
    pub config_name: String,
    pub policy: String,
    pub engine_version: String,
    pub run_at: String,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CensusResult {
    pub meta: CensusMeta,
    pub summary: CensusSummary,
    pub records: Vec<CanonicalRecord>,
    pub derived: DerivedOutputs,
}
