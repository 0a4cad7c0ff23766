//! Table readers for the two on-disk representations we accept.
//!
//! Everything here works on in-memory text; the caller owns file access.

use std::path::Path;

use serde_json::Value;

use crate::error::CensusError;
use crate::model::RawTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    /// Array of flat objects, one per row.
    Json,
}

impl SourceFormat {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Pick a reader from the explicit override or else the file extension.
    /// Anything unrecognized is fatal: no partial load.
    pub fn resolve(path: &Path, format_override: Option<&str>) -> Result<Self, CensusError> {
        let name = match format_override {
            Some(f) => f.to_string(),
            None => path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_string(),
        };
        Self::parse(&name).ok_or_else(|| CensusError::UnsupportedFormat {
            path: path.display().to_string(),
            extension: name,
        })
    }
}

/// Parse table text in the given format.
pub fn parse_table(format: SourceFormat, source_name: &str, text: &str) -> Result<RawTable, CensusError> {
    match format {
        SourceFormat::Csv => parse_csv(source_name, text),
        SourceFormat::Json => parse_json(source_name, text),
    }
}

fn parse_csv(source_name: &str, text: &str) -> Result<RawTable, CensusError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .comment(Some(b'#'))
        .from_reader(text.as_bytes());

    let table_err = |e: csv::Error| CensusError::TableParse {
        source_name: source_name.into(),
        message: e.to_string(),
    };

    let headers: Vec<String> = reader
        .headers()
        .map_err(table_err)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(table_err)?;
        rows.push(record.iter().map(|v| v.to_string()).collect());
    }

    Ok(RawTable { headers, rows })
}

fn parse_json(source_name: &str, text: &str) -> Result<RawTable, CensusError> {
    let table_err = |message: String| CensusError::TableParse {
        source_name: source_name.into(),
        message,
    };

    let value: Value = serde_json::from_str(text).map_err(|e| table_err(e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(table_err("expected a JSON array of row objects".into()));
    };

    let mut headers: Vec<String> = Vec::new();
    for item in &items {
        let Value::Object(obj) = item else {
            return Err(table_err("every row must be a JSON object".into()));
        };
        for key in obj.keys() {
            if !headers.iter().any(|h| h == key) {
                headers.push(key.clone());
            }
        }
    }

    let mut rows = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Value::Object(obj) = item else {
            continue;
        };
        let mut row = Vec::with_capacity(headers.len());
        for h in &headers {
            let cell = match obj.get(h) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                Some(_) => {
                    return Err(table_err(format!("row {i}, field '{h}': nested values are not supported")))
                }
            };
            row.push(cell);
        }
        rows.push(row);
    }

    Ok(RawTable { headers, rows })
}
