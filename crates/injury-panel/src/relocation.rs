// Franchise relocation map: historical team names to their canonical name.

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RelocationError {
    #[error("relocation source `{0}` is listed more than once")]
    DuplicateSource(String),

    #[error("relocation entry has an empty team name")]
    EmptyName,
}

/// One-directional substitution of historical franchise names.
///
/// Names are replaced in a single pass; a target is never looked up again.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelocationMap {
    map: BTreeMap<String, String>,
}

impl RelocationMap {
    /// Build a map from raw config entries. Names are trimmed; two sources
    /// that trim to the same name are rejected.
    pub fn new(entries: BTreeMap<String, String>) -> Result<Self, RelocationError> {
        let mut map = BTreeMap::new();
        for (from, to) in entries {
            let (from, to) = (from.trim().to_string(), to.trim().to_string());
            if from.is_empty() || to.is_empty() {
                return Err(RelocationError::EmptyName);
            }
            if map.insert(from.clone(), to).is_some() {
                return Err(RelocationError::DuplicateSource(from));
            }
        }
        Ok(RelocationMap { map })
    }

    /// Relocations and renames present in the historical schedule data.
    pub fn builtin() -> Self {
        let mut map = BTreeMap::new();
        map.insert(
            "Washington Redskins".to_string(),
            "Washington Football Team".to_string(),
        );
        map.insert("St. Louis Rams".to_string(), "Los Angeles Rams".to_string());
        map.insert(
            "San Diego Chargers".to_string(),
            "Los Angeles Chargers".to_string(),
        );
        RelocationMap { map }
    }

    /// Rewrite `team` in place, returning whether it changed.
    pub fn apply(&self, team: &mut String) -> bool {
        match self.map.get(team.as_str()) {
            Some(canonical) => {
                *team = canonical.clone();
                true
            }
            None => false,
        }
    }

    /// First target name that is also a source, if any.
    pub fn chained_entry(&self) -> Option<(&str, &str)> {
        self.map
            .iter()
            .find(|(_, to)| self.map.contains_key(to.as_str()))
            .map(|(from, to)| (from.as_str(), to.as_str()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
