//! Named option presets.
//!
//! Presets live in a YAML file mapping a preset name to a (possibly partial)
//! [`PmvsOptions`] mapping. The table is loaded once at startup and handed to the
//! pipeline by value; nothing here is global.
//!
//! ```yaml
//! pmvs_2_4_1:
//!   level: 2
//!   csize: 4
//!   numNeighbors: 1
//! ```

use crate::error::PmvsError;
use crate::options::PmvsOptions;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Named [`PmvsOptions`], sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresetTable {
    presets: BTreeMap<String, PmvsOptions>,
}

impl PresetTable {
    pub fn from_yaml_str(contents: &str) -> Result<Self, PmvsError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Loads a preset table from a YAML file.
    pub fn load_from_yaml(path: &Path) -> Result<Self, PmvsError> {
        let contents = fs::read_to_string(path)?;
        let table = Self::from_yaml_str(&contents)?;
        debug!("Loaded {} presets from {}", table.len(), path.display());
        Ok(table)
    }

    pub fn get(&self, name: &str) -> Option<&PmvsOptions> {
        self.presets.get(name)
    }

    /// Returns a copy of the preset called `name`.
    ///
    /// # Errors
    ///
    /// [`PmvsError::UnknownPreset`] if the table has no such preset.
    pub fn resolve(&self, name: &str) -> Result<PmvsOptions, PmvsError> {
        self.get(name)
            .cloned()
            .ok_or_else(|| PmvsError::UnknownPreset(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PmvsOptions)> {
        self.presets.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

/// Destination file name used for a preset's reconstruction.
pub fn preset_destination(name: &str) -> String {
    format!("{name}.ply")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests loading the bundled presets from "samples/pmvs_presets.yaml".
    #[test]
    fn test_load_bundled_presets() {
        let table = PresetTable::load_from_yaml(Path::new("samples/pmvs_presets.yaml")).unwrap();
        assert_eq!(table.len(), 8);

        let names: Vec<&str> = table.names().collect();
        assert_eq!(names[0], "pmvs_0_4_2");
        assert!(names.contains(&"pmvs_2_8_1"));

        let fast = table.resolve("pmvs_2_8_1").unwrap();
        assert_eq!(fast.level, 2);
        assert_eq!(fast.csize, 8);
        assert_eq!(fast.num_neighbors, 1);
        // Unlisted keys keep the defaults.
        assert_eq!(fast.threshold, 0.6);
        assert_eq!(fast.wsize, 7);

        // Each preset name encodes level, cell size and neighbour count.
        for (name, options) in table.iter() {
            let expected = format!(
                "pmvs_{}_{}_{}",
                options.level, options.csize, options.num_neighbors
            );
            assert_eq!(name, expected);
        }
    }

    #[test]
    fn test_unknown_preset() {
        let table = PresetTable::from_yaml_str("fast:\n  level: 2\n").unwrap();
        assert!(matches!(
            table.resolve("slow"),
            Err(PmvsError::UnknownPreset(name)) if name == "slow"
        ));
    }

    #[test]
    fn test_empty_mapping_entry_uses_defaults() {
        let table = PresetTable::from_yaml_str("plain: {}\n").unwrap();
        assert_eq!(table.resolve("plain").unwrap(), PmvsOptions::default());
    }

    #[test]
    fn test_empty_table_and_destination() {
        let table = PresetTable::from_yaml_str("{}\n").unwrap();
        assert!(table.is_empty());
        assert_eq!(preset_destination("custom"), "custom.ply");
    }
}
