//! Static unit → department reference data.

use std::collections::BTreeMap;

use crate::error::CensusError;

/// Read-only mapping from unit identifier to department name.
///
/// Loaded once per run and passed by reference into the stages that need it.
/// A unit with no entry simply has no department; that is a data-quality gap,
/// never a reason to abort.
#[derive(Debug, Clone, Default)]
pub struct UnitRegistry {
    departments: BTreeMap<String, String>,
}

impl UnitRegistry {
    pub fn new(departments: BTreeMap<String, String>) -> Self {
        Self { departments }
    }

    /// Decode a flat JSON object `{ "unit": "department", ... }`.
    pub fn from_json(input: &str) -> Result<Self, CensusError> {
        let departments: BTreeMap<String, String> =
            serde_json::from_str(input).map_err(|e| CensusError::Registry(e.to_string()))?;
        Ok(Self { departments })
    }

    /// Layer fixed corrections on top of the loaded mapping. Overrides win.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, String>) -> Self {
        for (unit, department) in overrides {
            self.departments.insert(unit.clone(), department.clone());
        }
        self
    }

    pub fn department(&self, unit: &str) -> Option<&str> {
        self.departments.get(unit).map(String::as_str)
    }

    pub fn units(&self) -> impl Iterator<Item = &str> {
        self.departments.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.departments.len()
    }
}
