//! Static reference data: diagnosis allow/deny lists, the lab alias and
//! range table, and the cardiology diagnosis library.
//!
//! Loaded once and never mutated. The built-in tables are embedded JSON;
//! `from_dir` loads the same four files from disk for hosts that ship their
//! own data.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const ALLOWLIST_JSON: &str = include_str!("../data/diagnosis_allowlist.json");
const BLOCKLIST_JSON: &str = include_str!("../data/diagnosis_blocklist.json");
const LABS_JSON: &str = include_str!("../data/labs_reference.json");
const DIAGNOSES_JSON: &str = include_str!("../data/cardiology_diagnoses.json");

/// One lab in the reference table. The first alias doubles as the display
/// name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabRef {
    pub aliases: Vec<String>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub critical_low: Option<f64>,
    #[serde(default)]
    pub critical_high: Option<f64>,
    #[serde(default)]
    pub note: Option<String>,
}

impl LabRef {
    pub fn display_name(&self) -> &str {
        self.aliases.first().map(String::as_str).unwrap_or("")
    }
}

/// Diagnosis library entry referenced by the plan generator and renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DxEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub workup: Vec<String>,
    #[serde(default)]
    pub management: Vec<String>,
    #[serde(default)]
    pub pearls: Vec<String>,
    #[serde(default)]
    pub guidelines: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ReferenceData {
    pub diagnosis_allowlist: Vec<String>,
    pub diagnosis_blocklist: Vec<String>,
    pub labs: BTreeMap<String, LabRef>,
    pub diagnoses: Vec<DxEntry>,
    /// Lowercased alias -> canonical lab id, longest aliases first.
    alias_index: Vec<(String, String)>,
}

static BUILTIN: Lazy<ReferenceData> = Lazy::new(|| {
    ReferenceData::from_json(ALLOWLIST_JSON, BLOCKLIST_JSON, LABS_JSON, DIAGNOSES_JSON)
        .expect("invalid built-in reference data")
});

impl ReferenceData {
    /// Embedded defaults, parsed once.
    pub fn builtin() -> &'static ReferenceData {
        &BUILTIN
    }

    /// Load the four reference files from a directory. Any missing or
    /// malformed file is fatal at init.
    pub fn from_dir(dir: &Path) -> Result<ReferenceData, CoreError> {
        let read = |name: &str| -> Result<String, CoreError> {
            fs::read_to_string(dir.join(name))
                .map_err(|e| CoreError::StaticDataMissing(format!("{name}: {e}")))
        };
        ReferenceData::from_json(
            &read("diagnosis_allowlist.json")?,
            &read("diagnosis_blocklist.json")?,
            &read("labs_reference.json")?,
            &read("cardiology_diagnoses.json")?,
        )
    }

    pub fn from_json(
        allowlist: &str,
        blocklist: &str,
        labs: &str,
        diagnoses: &str,
    ) -> Result<ReferenceData, CoreError> {
        let diagnosis_allowlist: Vec<String> = serde_json::from_str(allowlist)
            .map_err(|e| CoreError::StaticDataMissing(format!("diagnosis_allowlist.json: {e}")))?;
        let diagnosis_blocklist: Vec<String> = serde_json::from_str(blocklist)
            .map_err(|e| CoreError::StaticDataMissing(format!("diagnosis_blocklist.json: {e}")))?;
        let labs: BTreeMap<String, LabRef> = serde_json::from_str(labs)
            .map_err(|e| CoreError::StaticDataMissing(format!("labs_reference.json: {e}")))?;
        let diagnoses: Vec<DxEntry> = serde_json::from_str(diagnoses)
            .map_err(|e| CoreError::StaticDataMissing(format!("cardiology_diagnoses.json: {e}")))?;

        let mut alias_index: Vec<(String, String)> = Vec::new();
        for (id, entry) in &labs {
            for alias in &entry.aliases {
                alias_index.push((alias.to_ascii_lowercase(), id.clone()));
            }
            alias_index.push((id.to_ascii_lowercase(), id.clone()));
        }
        // Longest alias first so "troponin i" wins over "troponin"; ties
        // break alphabetically for stability.
        alias_index.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        alias_index.dedup_by(|a, b| a.0 == b.0);

        Ok(ReferenceData {
            diagnosis_allowlist,
            diagnosis_blocklist,
            labs,
            diagnoses,
            alias_index,
        })
    }

    /// Canonical lab id for a name as written in the note, if allowlisted.
    pub fn lab_canonical(&self, name: &str) -> Option<(&str, &str)> {
        let needle = name.trim().to_ascii_lowercase();
        self.alias_index
            .iter()
            .find(|(alias, _)| *alias == needle)
            .map(|(alias, id)| (id.as_str(), alias.as_str()))
    }

    pub fn lab_ref(&self, id: &str) -> Option<&LabRef> {
        self.labs.get(id)
    }

    pub fn dx_entry(&self, canonical: &str) -> Option<&DxEntry> {
        let needle = canonical.to_ascii_lowercase();
        self.diagnoses
            .iter()
            .find(|d| d.name.to_ascii_lowercase() == needle || d.id == needle)
    }
}
