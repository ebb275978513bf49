//! Core data model for parsed clinical notes.
//!
//! Everything here is a plain value: no cycles, no back-pointers. Warning
//! triggers and context markers reference entities by index into the owning
//! `ParsedNote` vectors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::normalize::NormalizedText;
use crate::options::TemplateId;

// =============================================================================
// SECTIONS
// =============================================================================

/// Canonical section label. Declaration order is clinical document order and
/// drives `BTreeMap` iteration, so renders are stable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SectionTag {
    Subjective,
    Hpi,
    Pmh,
    Psh,
    FamilyHistory,
    SocialHistory,
    Ros,
    Medications,
    Allergies,
    Objective,
    Vitals,
    Labs,
    Imaging,
    Assessment,
    Plan,
    Unknown,
}

impl SectionTag {
    /// Canonical header label used in rendered output.
    pub fn canonical_label(self) -> &'static str {
        match self {
            SectionTag::Subjective => "Chief Complaint",
            SectionTag::Hpi => "History of Present Illness",
            SectionTag::Pmh => "Past Medical History",
            SectionTag::Psh => "Past Surgical History",
            SectionTag::FamilyHistory => "Family History",
            SectionTag::SocialHistory => "Social History",
            SectionTag::Ros => "Review of Systems",
            SectionTag::Medications => "Medications",
            SectionTag::Allergies => "Allergies",
            SectionTag::Objective => "Physical Exam",
            SectionTag::Vitals => "Vitals",
            SectionTag::Labs => "Labs",
            SectionTag::Imaging => "Imaging",
            SectionTag::Assessment => "Assessment",
            SectionTag::Plan => "Plan",
            SectionTag::Unknown => "Unmapped",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SectionTag::Subjective => "subjective",
            SectionTag::Hpi => "hpi",
            SectionTag::Pmh => "pmh",
            SectionTag::Psh => "psh",
            SectionTag::FamilyHistory => "family_history",
            SectionTag::SocialHistory => "social_history",
            SectionTag::Ros => "ros",
            SectionTag::Medications => "medications",
            SectionTag::Allergies => "allergies",
            SectionTag::Objective => "objective",
            SectionTag::Vitals => "vitals",
            SectionTag::Labs => "labs",
            SectionTag::Imaging => "imaging",
            SectionTag::Assessment => "assessment",
            SectionTag::Plan => "plan",
            SectionTag::Unknown => "unknown",
        }
    }
}

/// One detected section of the note. `raw_text` is the body with original
/// casing; the header line (when one existed) is kept separately so the
/// cleaned text can be reassembled byte-for-byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub tag: SectionTag,
    pub raw_text: String,
    /// 0.0 iff `tag == Unknown`.
    pub confidence: f64,
    pub source_header_text: Option<String>,
}

// =============================================================================
// VITALS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalKind {
    Bp,
    Hr,
    Rr,
    Temp,
    SpO2,
    Weight,
    Height,
    Bmi,
}

impl VitalKind {
    pub fn label(self) -> &'static str {
        match self {
            VitalKind::Bp => "BP",
            VitalKind::Hr => "HR",
            VitalKind::Rr => "RR",
            VitalKind::Temp => "Temp",
            VitalKind::SpO2 => "SpO2",
            VitalKind::Weight => "Weight",
            VitalKind::Height => "Height",
            VitalKind::Bmi => "BMI",
        }
    }
}

/// Measured value. Blood pressure is a systolic/diastolic pair; range
/// answers ("BP 120-140/70-90") keep the min-max bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum VitalValue {
    Single { value: f64 },
    Pressure { systolic: u16, diastolic: u16 },
    SingleRange { low: f64, high: f64 },
    PressureRange {
        systolic_low: u16,
        systolic_high: u16,
        diastolic_low: u16,
        diastolic_high: u16,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VitalFlag {
    #[default]
    None,
    High,
    Low,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vital {
    pub kind: VitalKind,
    pub value: VitalValue,
    pub unit: Option<String>,
    pub flag: VitalFlag,
    pub raw: String,
}

// =============================================================================
// LABS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Less,
    Greater,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Less => "<",
            CmpOp::Greater => ">",
        }
    }
}

/// Lab result value: exact number, comparator (`<0.5`, `>500`), or range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum LabValue {
    Exact { value: f64 },
    Comparator { op: CmpOp, value: f64 },
    Range { low: f64, high: f64 },
}

impl LabValue {
    /// Representative number for threshold rules. Comparators use the bound;
    /// ranges use the midpoint.
    pub fn magnitude(&self) -> f64 {
        match *self {
            LabValue::Exact { value } => value,
            LabValue::Comparator { value, .. } => value,
            LabValue::Range { low, high } => (low + high) / 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LabFlag {
    #[default]
    None,
    High,
    Low,
    Critical,
    Star,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lab {
    pub name_canonical: String,
    pub aliases_matched: Vec<String>,
    pub value: LabValue,
    pub unit: Option<String>,
    pub ref_low: Option<f64>,
    pub ref_high: Option<f64>,
    pub flag: LabFlag,
    pub raw: String,
}

// =============================================================================
// MEDICATIONS / ALLERGIES
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medication {
    pub name: String,
    pub dose: Option<String>,
    pub unit: Option<String>,
    pub route: Option<String>,
    pub frequency: Option<String>,
    pub raw: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allergy {
    pub substance: String,
    pub reaction: Option<String>,
}

/// Allergy list with the explicit "no known drug allergies" marker. NKDA
/// yields `no_known = true` and an empty item list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Allergies {
    pub no_known: bool,
    pub items: Vec<Allergy>,
}

// =============================================================================
// DIAGNOSES / CONTEXT
// =============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Acuity {
    Acute,
    Chronic,
    #[default]
    Unspecified,
}

/// Where the candidate came from; Assessment outranks HPI outranks ROS.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DxSource {
    Assessment,
    Hpi,
    Ros,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnosis {
    /// Source phrase as written in the note.
    pub text: String,
    /// Allowlist canonical name this candidate matched.
    pub canonical: String,
    pub acuity: Acuity,
    pub confidence: f64,
    pub source: DxSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    Temporal,
    Severity,
    Causality,
    Negation,
}

/// A temporal/severity/causality/negation relationship bound to a nearby
/// entity phrase. Spans are byte offsets into the scanned text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMarker {
    pub kind: ContextKind,
    pub entity: String,
    pub modifier: String,
    pub span_start: usize,
    pub span_end: usize,
}

// =============================================================================
// WARNINGS
// =============================================================================

/// Declaration order is ascending severity; sort descending for output.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Vital,
    Lab,
    Medication,
    Diagnosis,
}

/// Index reference into the owning `ParsedNote` vector named by `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRef {
    pub kind: TriggerKind,
    pub index: usize,
}

/// Coded advisory. Safety rules and non-fatal parse anomalies share this
/// shape so one deterministic ordering covers both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub action: Option<String>,
    pub triggers: Vec<TriggerRef>,
}

/// Sort (severity desc, code asc) and collapse duplicates by code, keeping
/// the first occurrence after the sort.
pub fn finalize_warnings(mut warnings: Vec<Warning>) -> Vec<Warning> {
    warnings.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.code.cmp(&b.code)));
    let mut seen: Vec<String> = Vec::new();
    warnings.retain(|w| {
        if seen.iter().any(|c| c == &w.code) {
            false
        } else {
            seen.push(w.code.clone());
            true
        }
    });
    warnings
}

// =============================================================================
// PATIENT / META
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn label(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Patient {
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub mrn: Option<String>,
    pub dob: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteMeta {
    pub source: Option<String>,
    /// Host-filled; always `None` inside the core so output stays
    /// deterministic.
    pub timing_ms: Option<u64>,
    pub parser_version: String,
    pub cancelled: bool,
}

impl Default for NoteMeta {
    fn default() -> Self {
        Self {
            source: None,
            timing_ms: None,
            parser_version: env!("CARGO_PKG_VERSION").to_string(),
            cancelled: false,
        }
    }
}

// =============================================================================
// TOP-LEVEL RESULTS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedNote {
    pub normalized: NormalizedText,
    pub sections: BTreeMap<SectionTag, Section>,
    pub unknown_text: Vec<String>,
    pub vitals: Vec<Vital>,
    pub labs: Vec<Lab>,
    pub medications: Vec<Medication>,
    pub allergies: Allergies,
    pub diagnoses: Vec<Diagnosis>,
    pub context: Vec<ContextMarker>,
    pub patient: Patient,
    pub warnings: Vec<Warning>,
    pub confidence_overall: f64,
    pub meta: NoteMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedNote {
    pub template_id: TemplateId,
    pub text: String,
    pub section_order: Vec<SectionTag>,
    pub unmapped_content: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_warning(severity: Severity, code: &str) -> Warning {
        Warning {
            severity,
            code: code.to_string(),
            message: String::new(),
            action: None,
            triggers: vec![],
        }
    }

    #[test]
    fn test_warning_order_severity_desc_code_asc() {
        let out = finalize_warnings(vec![
            make_warning(Severity::Medium, "B_MED"),
            make_warning(Severity::High, "Z_HIGH"),
            make_warning(Severity::High, "A_HIGH"),
            make_warning(Severity::Low, "A_LOW"),
        ]);
        let codes: Vec<&str> = out.iter().map(|w| w.code.as_str()).collect();
        assert_eq!(codes, vec!["A_HIGH", "Z_HIGH", "B_MED", "A_LOW"]);
    }

    #[test]
    fn test_warning_dedup_by_code() {
        let out = finalize_warnings(vec![
            make_warning(Severity::High, "HYPERK_RISK"),
            make_warning(Severity::High, "HYPERK_RISK"),
        ]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_section_tag_order_is_clinical() {
        assert!(SectionTag::Subjective < SectionTag::Assessment);
        assert!(SectionTag::Assessment < SectionTag::Plan);
        assert!(SectionTag::Plan < SectionTag::Unknown);
    }

    #[test]
    fn test_lab_value_magnitude() {
        assert_eq!(LabValue::Exact { value: 4.2 }.magnitude(), 4.2);
        assert_eq!(
            LabValue::Comparator { op: CmpOp::Less, value: 0.5 }.magnitude(),
            0.5
        );
        assert_eq!(LabValue::Range { low: 2.0, high: 4.0 }.magnitude(), 3.0);
    }
}
