use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const MODSET_SCHEMA_VERSION: &str = "rimorder.modset@0.1.0";

/// Where a mod was installed from. Provenance only; never consulted for
/// ordering decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModSource {
    Official,
    #[default]
    Local,
    Workshop,
}

/// One mod as reported by the scanning collaborator.
///
/// Ids arrive in whatever casing the manifest used; canonicalization happens
/// inside this crate, never at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModRecord {
    pub package_id: String,
    /// Ids this mod wants to load after (they must precede it).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub load_after: Vec<String>,
    /// Ids this mod wants to load before (it must precede them).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub load_before: Vec<String>,
    #[serde(default)]
    pub source: ModSource,
}

impl ModRecord {
    pub fn new(package_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            load_after: Vec::new(),
            load_before: Vec::new(),
            source: ModSource::default(),
        }
    }
}

/// Schema-versioned mod-set document: the on-disk contract with the scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModSet {
    pub schema_version: String,
    pub mods: Vec<ModRecord>,
}

impl ModSet {
    pub fn new(mods: Vec<ModRecord>) -> Self {
        Self {
            schema_version: MODSET_SCHEMA_VERSION.to_string(),
            mods,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let doc: Self = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse {}", path.display()))?;
        if doc.schema_version != MODSET_SCHEMA_VERSION {
            bail!(
                "unsupported modset schema_version: {} (expected {MODSET_SCHEMA_VERSION})",
                doc.schema_version
            );
        }
        Ok(doc)
    }

    /// Package ids in document order, original casing.
    pub fn package_ids(&self) -> Vec<String> {
        self.mods.iter().map(|m| m.package_id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modset_round_trips_through_json() {
        let set = ModSet::new(vec![
            ModRecord::new("Brrainz.Harmony"),
            ModRecord {
                package_id: "some.mod".to_string(),
                load_after: vec!["ludeon.rimworld".to_string()],
                load_before: Vec::new(),
                source: ModSource::Workshop,
            },
        ]);
        let bytes = serde_json::to_vec(&set).unwrap();
        let back: ModSet = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.schema_version, MODSET_SCHEMA_VERSION);
        assert_eq!(back.package_ids(), vec!["Brrainz.Harmony", "some.mod"]);
        assert_eq!(back.mods[1].load_after, vec!["ludeon.rimworld"]);
        assert_eq!(back.mods[1].source, ModSource::Workshop);
    }

    #[test]
    fn modset_defaults_optional_fields() {
        let doc = r#"{"schema_version":"rimorder.modset@0.1.0","mods":[{"packageId":"a.mod"}]}"#;
        let set: ModSet = serde_json::from_str(doc).unwrap();
        assert!(set.mods[0].load_after.is_empty());
        assert!(set.mods[0].load_before.is_empty());
        assert_eq!(set.mods[0].source, ModSource::Local);
    }
}
