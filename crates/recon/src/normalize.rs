//! Schema normalizer: raw source table → canonical readings.
//!
//! Renames source columns onto the canonical schema, fills absent counters
//! with zero, parses timestamps and counters, and rewrites unit identifiers
//! through the source's alias table so that every later stage sees one key
//! per physical unit.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::error::CensusError;
use crate::model::{BedCounts, Counter, RawReading, RawTable, SourceKind};

pub const UNIT_COLUMN: &str = "icu_name";
pub const DATE_COLUMN: &str = "date";

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Normalize one source table. The input table is left untouched.
pub fn normalize(kind: SourceKind, table: &RawTable, source: &SourceConfig) -> Result<Vec<RawReading>, CensusError> {
    let source_name = kind.to_string();

    // Canonical name for every raw header; unmapped headers keep their own name.
    let canonical: Vec<&str> = table
        .headers
        .iter()
        .map(|h| source.columns.get(h).map(String::as_str).unwrap_or(h.as_str()))
        .collect();
    let idx = |name: &str| canonical.iter().position(|c| *c == name);

    let unit_idx = idx(UNIT_COLUMN).ok_or_else(|| CensusError::MissingColumn {
        source_name: source_name.clone(),
        column: UNIT_COLUMN.into(),
    })?;
    let date_idx = idx(DATE_COLUMN).ok_or_else(|| CensusError::MissingColumn {
        source_name: source_name.clone(),
        column: DATE_COLUMN.into(),
    })?;
    let counter_idx: Vec<(Counter, Option<usize>)> =
        Counter::all().map(|c| (c, idx(c.column()))).collect();

    let missing: Vec<&str> = counter_idx
        .iter()
        .filter(|(_, i)| i.is_none())
        .map(|(c, _)| c.column())
        .collect();
    if !missing.is_empty() {
        debug!(source = %kind, columns = ?missing, "filling absent counter columns with zero");
    }

    let mut readings = Vec::with_capacity(table.rows.len());
    let mut aliased = 0usize;

    for (row_no, row) in table.rows.iter().enumerate() {
        let cell = |i: usize| row.get(i).map(|s| s.trim()).unwrap_or("");

        let raw_unit = cell(unit_idx);
        if raw_unit.is_empty() {
            return Err(CensusError::TableParse {
                source_name: source_name.clone(),
                message: format!("row {row_no}: empty unit identifier"),
            });
        }
        let unit = match source.aliases.get(raw_unit) {
            Some(fixed) => {
                aliased += 1;
                fixed.clone()
            }
            None => raw_unit.to_string(),
        };

        let ts_str = cell(date_idx);
        let timestamp = parse_timestamp(ts_str).ok_or_else(|| CensusError::TimestampParse {
            source_name: source_name.clone(),
            row: row_no,
            value: ts_str.into(),
        })?;

        let mut counts = BedCounts::default();
        for (counter, i) in &counter_idx {
            let Some(i) = *i else { continue };
            let value_str = cell(i);
            let value = parse_counter(value_str).ok_or_else(|| CensusError::CounterParse {
                source_name: source_name.clone(),
                row: row_no,
                column: counter.column().into(),
                value: value_str.into(),
            })?;
            *counts.get_mut(*counter) = value;
        }

        readings.push(RawReading { unit, timestamp, counts });
    }

    info!(source = %kind, rows = readings.len(), aliased, "normalized source table");
    Ok(readings)
}

/// Accepts plain dates, naive datetimes (space or `T` separated) and
/// RFC 3339 with an offset, of which only the wall-clock part is kept.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    for fmt in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.naive_local());
    }
    if let Ok(ts) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(ts.naive_local());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Empty → 0; integers; floats only when integral (dataframe exports write `3.0`).
/// Negative counts are rejected.
pub fn parse_counter(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return Some(0);
    }
    let value = match s.parse::<i64>() {
        Ok(v) => v,
        Err(_) => {
            let f: f64 = s.parse().ok()?;
            if !f.is_finite() || f.fract() != 0.0 || f.abs() > i64::MAX as f64 {
                return None;
            }
            f as i64
        }
    };
    (value >= 0).then_some(value)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::{CumulativeCounter, GaugeCounter};

    fn legacy_config() -> SourceConfig {
        SourceConfig {
            file: "pre_icubam.csv".into(),
            format: None,
            columns: BTreeMap::from([
                ("Hopital".into(), "icu_name".into()),
                ("Date".into(), "date".into()),
                ("NbDeces".into(), "n_covid_deaths".into()),
                ("NbSortieVivant".into(), "n_covid_healed".into()),
                ("NbCOVID".into(), "n_covid_occ".into()),
                ("NbLitDispo".into(), "n_covid_free".into()),
            ]),
            aliases: BTreeMap::from([
                ("C-Scweitzer".into(), "C-Schweitzer".into()),
                ("CHR-SSPI".into(), "CHR-Thionville".into()),
                ("CHR-CCV".into(), "CHR-Thionville".into()),
            ]),
        }
    }

    fn table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn renames_and_fills_missing_with_zero() {
        let t = table(
            &["Hopital", "Date", "NbDeces", "NbSortieVivant", "NbCOVID", "NbLitDispo"],
            &[&["Colmar", "2020-03-18", "2", "5", "11", "3"]],
        );
        let readings = normalize(SourceKind::Legacy, &t, &legacy_config()).unwrap();
        assert_eq!(readings.len(), 1);
        let r = &readings[0];
        assert_eq!(r.unit, "Colmar");
        assert_eq!(r.date(), NaiveDate::from_ymd_opt(2020, 3, 18).unwrap());
        assert_eq!(r.counts.cumulative(CumulativeCounter::Deaths), 2);
        assert_eq!(r.counts.cumulative(CumulativeCounter::Healed), 5);
        assert_eq!(r.counts.cumulative(CumulativeCounter::Transferred), 0);
        assert_eq!(r.counts.cumulative(CumulativeCounter::Refused), 0);
        assert_eq!(r.counts.gauge(GaugeCounter::CovidOccupied), 11);
        assert_eq!(r.counts.gauge(GaugeCounter::CovidFree), 3);
        assert_eq!(r.counts.gauge(GaugeCounter::NonCovidFree), 0);
    }

    #[test]
    fn aliases_merge_unit_identities() {
        let t = table(
            &["Hopital", "Date"],
            &[
                &["CHR-SSPI", "2020-03-18"],
                &["CHR-CCV", "2020-03-18"],
                &["C-Scweitzer", "2020-03-18"],
                &["Colmar", "2020-03-18"],
            ],
        );
        let readings = normalize(SourceKind::Legacy, &t, &legacy_config()).unwrap();
        let units: Vec<&str> = readings.iter().map(|r| r.unit.as_str()).collect();
        assert_eq!(units, vec!["CHR-Thionville", "CHR-Thionville", "C-Schweitzer", "Colmar"]);
    }

    #[test]
    fn input_table_not_mutated() {
        let t = table(&["Hopital", "Date"], &[&["CHR-SSPI", "2020-03-18"]]);
        let before = t.rows.clone();
        normalize(SourceKind::Legacy, &t, &legacy_config()).unwrap();
        assert_eq!(t.rows, before);
        assert_eq!(t.headers, vec!["Hopital", "Date"]);
    }

    #[test]
    fn primary_create_date_alias() {
        let config = SourceConfig {
            file: "bedcounts.csv".into(),
            columns: BTreeMap::from([("create_date".into(), "date".into())]),
            ..Default::default()
        };
        let t = table(
            &["icu_name", "create_date", "n_covid_deaths", "n_ncovid_occ"],
            &[&["Metz", "2020-03-20T14:05:09.123", "4", "7.0"]],
        );
        let readings = normalize(SourceKind::Primary, &t, &config).unwrap();
        assert_eq!(readings[0].timestamp.to_string(), "2020-03-20 14:05:09.123");
        assert_eq!(readings[0].counts.gauge(GaugeCounter::NonCovidOccupied), 7);
    }

    #[test]
    fn missing_unit_column() {
        let t = table(&["Hospital", "Date"], &[]);
        let err = normalize(SourceKind::Legacy, &t, &SourceConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "source 'legacy': missing column 'icu_name'");
    }

    #[test]
    fn non_numeric_counter_fails() {
        let t = table(
            &["icu_name", "date", "n_covid_deaths"],
            &[&["Metz", "2020-03-20", "three"]],
        );
        let err = normalize(SourceKind::Primary, &t, &SourceConfig::default()).unwrap_err();
        assert!(matches!(err, CensusError::CounterParse { row: 0, .. }));
    }

    #[test]
    fn bad_timestamp_fails() {
        let t = table(&["icu_name", "date"], &[&["Metz", "20/03/2020"]]);
        let err = normalize(SourceKind::Primary, &t, &SourceConfig::default()).unwrap_err();
        assert!(err.to_string().contains("cannot parse timestamp '20/03/2020'"));
    }

    #[test]
    fn timestamp_forms() {
        let expect = |s: &str, want: &str| {
            assert_eq!(parse_timestamp(s).map(|t| t.to_string()).as_deref(), Some(want), "{s}");
        };
        expect("2020-03-20", "2020-03-20 00:00:00");
        expect("2020-03-20 08:15", "2020-03-20 08:15:00");
        expect("2020-03-20 08:15:30", "2020-03-20 08:15:30");
        expect("2020-03-20T08:15:30+02:00", "2020-03-20 08:15:30");
        expect("2020-03-20 08:15:30.5+01:00", "2020-03-20 08:15:30.500");
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn counter_forms() {
        assert_eq!(parse_counter(""), Some(0));
        assert_eq!(parse_counter(" 12 "), Some(12));
        assert_eq!(parse_counter("12.0"), Some(12));
        assert_eq!(parse_counter("12.5"), None);
        assert_eq!(parse_counter("-1"), None);
        assert_eq!(parse_counter("NaN"), None);
        assert_eq!(parse_counter("x"), None);
    }
}
