//! The parsing pipeline: phase composition, cooperative cancellation, and
//! the public entry points.
//!
//! Each phase is an ordinary public function (`normalize::normalize`,
//! `sections::detect_sections`, the extractors, `disambiguate`,
//! `validate_safety`, `render::render`), so a host can run them stepwise
//! and yield between phases. `parse_clinical_note` is the straight-line
//! composition with cancellation checks at every phase boundary.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::allergies::extract_allergies;
use crate::context::extract_context;
use crate::demographics::extract_demographics;
use crate::diagnoses::extract_diagnoses;
use crate::disambiguate::disambiguate;
use crate::error::CoreError;
use crate::labs::extract_labs;
use crate::meds::extract_medications;
use crate::normalize::{normalize, NormalizedText};
use crate::options::{ParseOptions, TemplateId};
use crate::refdata::ReferenceData;
use crate::render;
use crate::safety::validate_safety;
use crate::sections::detect_sections;
use crate::types::{
    finalize_warnings, Allergies, DxSource, NoteMeta, ParsedNote, Patient, RenderedNote,
    SectionTag, Severity, Warning,
};
use crate::vitals::{extract_vitals, Span};

/// Cooperative cancellation flag checked at phase boundaries. Cloneable;
/// all clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

// =============================================================================
// ENTRY POINTS
// =============================================================================

/// Parse a clinical note with the built-in reference data.
pub fn parse_clinical_note(text: &str, opts: &ParseOptions) -> Result<ParsedNote, CoreError> {
    parse_with(text, opts, ReferenceData::builtin(), None)
}

/// Render a previously parsed note. Never fails.
pub fn render_note(parsed: &ParsedNote, template: TemplateId, opts: &ParseOptions) -> RenderedNote {
    render::render(parsed, template, opts, ReferenceData::builtin())
}

/// Parse then render in one call.
pub fn parse_and_render(
    text: &str,
    opts: &ParseOptions,
) -> Result<(ParsedNote, RenderedNote), CoreError> {
    let parsed = parse_clinical_note(text, opts)?;
    let rendered = render_note(&parsed, opts.template, opts);
    Ok((parsed, rendered))
}

fn base_note(normalized: NormalizedText) -> ParsedNote {
    ParsedNote {
        normalized,
        sections: BTreeMap::new(),
        unknown_text: Vec::new(),
        vitals: Vec::new(),
        labs: Vec::new(),
        medications: Vec::new(),
        allergies: Allergies::default(),
        diagnoses: Vec::new(),
        context: Vec::new(),
        patient: Patient::default(),
        warnings: Vec::new(),
        confidence_overall: 0.0,
        meta: NoteMeta::default(),
    }
}

/// Full-control variant: explicit reference data and optional cancellation.
/// On cancellation a partial `ParsedNote` is returned with
/// `meta.cancelled = true` and no warnings for unreached phases.
pub fn parse_with(
    text: &str,
    opts: &ParseOptions,
    refdata: &ReferenceData,
    cancel: Option<&CancelToken>,
) -> Result<ParsedNote, CoreError> {
    if text.len() > opts.max_text_bytes {
        return Err(CoreError::InputTooLarge {
            size: text.len(),
            max: opts.max_text_bytes,
        });
    }

    let cancelled = || cancel.is_some_and(|c| c.is_cancelled());

    // Phase 1: normalize.
    let mut note = base_note(normalize(text));
    debug!(lines = note.normalized.lines.len(), "normalized note text");
    if cancelled() {
        note.meta.cancelled = true;
        return Ok(note);
    }

    // Phase 2: section detection.
    let detected = detect_sections(&note.normalized);
    let section_confidence = detected.confidence;
    debug!(
        sections = detected.sections.len(),
        confidence = section_confidence,
        "detected sections"
    );
    note.sections = detected.sections;
    note.unknown_text = detected.unknown_text;
    if cancelled() {
        note.meta.cancelled = true;
        return Ok(note);
    }

    // Phase 3: entity extraction.
    let cleaned = note.normalized.cleaned.clone();
    let (vitals, vital_spans) = extract_vitals(&cleaned);

    let labs_scope = note
        .sections
        .get(&SectionTag::Labs)
        .map(|s| s.raw_text.clone());
    let (labs, lab_spans) = match &labs_scope {
        Some(body) => (extract_labs(body, refdata).0, Vec::new()),
        None => extract_labs(&cleaned, refdata),
    };

    let meds_scope = note
        .sections
        .get(&SectionTag::Medications)
        .map(|s| s.raw_text.clone());
    let (medications, unparsed_meds) = match &meds_scope {
        Some(body) => {
            let (meds, _, unparsed) = extract_medications(body, true);
            (meds, unparsed)
        }
        None => {
            // Blank out vitals/labs spans so "HR 88" never reads as a drug.
            let masked = mask_spans(&cleaned, vital_spans.iter().chain(lab_spans.iter()));
            let (meds, _, unparsed) = extract_medications(&masked, false);
            (meds, unparsed)
        }
    };

    note.allergies = match note.sections.get(&SectionTag::Allergies) {
        Some(s) => extract_allergies(&s.raw_text, true),
        None => extract_allergies(&cleaned, false),
    };
    note.patient = extract_demographics(&cleaned);
    note.vitals = vitals;
    note.labs = labs;
    note.medications = medications;
    if cancelled() {
        note.meta.cancelled = true;
        return Ok(note);
    }

    // Phase 4: clinical context.
    note.context = extract_context(&cleaned);
    if cancelled() {
        note.meta.cancelled = true;
        return Ok(note);
    }

    // Phase 5: diagnosis mining + disambiguation.
    let allowlist = opts
        .allowlist_override
        .as_deref()
        .unwrap_or(&refdata.diagnosis_allowlist);
    let blocklist = opts
        .blocklist_override
        .as_deref()
        .unwrap_or(&refdata.diagnosis_blocklist);

    let mut sources: Vec<(DxSource, &str)> = Vec::new();
    if let Some(s) = note.sections.get(&SectionTag::Assessment) {
        sources.push((DxSource::Assessment, s.raw_text.as_str()));
    }
    if let Some(s) = note.sections.get(&SectionTag::Hpi) {
        sources.push((DxSource::Hpi, s.raw_text.as_str()));
    }
    if let Some(s) = note.sections.get(&SectionTag::Subjective) {
        sources.push((DxSource::Hpi, s.raw_text.as_str()));
    }
    if let Some(s) = note.sections.get(&SectionTag::Ros) {
        sources.push((DxSource::Ros, s.raw_text.as_str()));
    }
    let candidates = extract_diagnoses(&sources, allowlist, blocklist);
    let pmh_text = note
        .sections
        .get(&SectionTag::Pmh)
        .map(|s| s.raw_text.clone());
    note.diagnoses = disambiguate(candidates, &note.context, &note.vitals, pmh_text.as_deref());
    if cancelled() {
        note.meta.cancelled = true;
        return Ok(note);
    }

    // Phase 6: safety validation + warning assembly.
    let mut warnings = validate_safety(&note.medications, &note.labs, &note.vitals);
    if !unparsed_meds.is_empty() {
        tracing::warn!(
            dropped = unparsed_meds.len(),
            "medication items dropped during lenient parse"
        );
        warnings.push(Warning {
            severity: Severity::Low,
            code: "PARTIAL_MED_UNPARSED".to_string(),
            message: format!(
                "{} medication item(s) could not be parsed: {}",
                unparsed_meds.len(),
                unparsed_meds.join("; ")
            ),
            action: None,
            triggers: Vec::new(),
        });
    }
    note.warnings = finalize_warnings(warnings);

    // Phase 7: overall confidence.
    note.confidence_overall = overall_confidence(&note, section_confidence);

    Ok(note)
}

fn mask_spans<'a>(text: &str, spans: impl Iterator<Item = &'a Span>) -> String {
    let mut bytes = text.as_bytes().to_vec();
    for &(start, end) in spans {
        for b in bytes.iter_mut().take(end.min(text.len())).skip(start) {
            if *b != b'\n' {
                *b = b' ';
            }
        }
    }
    String::from_utf8(bytes).unwrap_or_else(|_| text.to_string())
}

fn overall_confidence(note: &ParsedNote, section_confidence: f64) -> f64 {
    let entity_count = note.vitals.len() + note.labs.len() + note.medications.len();
    let entity_signal = (entity_count as f64 / 8.0).min(1.0);
    let dx_signal = if note.diagnoses.is_empty() {
        0.0
    } else {
        note.diagnoses.iter().map(|d| d.confidence).sum::<f64>() / note.diagnoses.len() as f64
    };
    (0.5 * section_confidence + 0.2 * entity_signal + 0.3 * dx_signal).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> ParseOptions {
        ParseOptions::default()
    }

    #[test]
    fn test_input_too_large() {
        let mut o = opts();
        o.max_text_bytes = 16;
        let err = parse_clinical_note("This input is longer than sixteen bytes.", &o).unwrap_err();
        assert_eq!(err.code(), "INPUT_TOO_LARGE");
    }

    #[test]
    fn test_empty_input_parses() {
        let note = parse_clinical_note("", &opts()).unwrap();
        assert!(note.sections.is_empty());
        assert!(note.warnings.is_empty());
        assert_eq!(note.confidence_overall, 0.0);
    }

    #[test]
    fn test_cancellation_returns_partial() {
        let token = CancelToken::new();
        token.cancel();
        let note = parse_with(
            "HPI: chest pain\nVitals: BP 150/90\n",
            &opts(),
            ReferenceData::builtin(),
            Some(&token),
        )
        .unwrap();
        assert!(note.meta.cancelled);
        assert!(note.warnings.is_empty());
        assert!(note.diagnoses.is_empty());
    }

    #[test]
    fn test_uncancelled_token_is_harmless() {
        let token = CancelToken::new();
        let note = parse_with(
            "HPI: chest pain\n",
            &opts(),
            ReferenceData::builtin(),
            Some(&token),
        )
        .unwrap();
        assert!(!note.meta.cancelled);
    }

    #[test]
    fn test_allowlist_override() {
        let mut o = opts();
        o.allowlist_override = Some(vec!["gout".to_string()]);
        let note = parse_clinical_note("Assessment:\n1. Gout\n2. Hypertension\n", &o).unwrap();
        let canonicals: Vec<&str> = note.diagnoses.iter().map(|d| d.canonical.as_str()).collect();
        assert_eq!(canonicals, vec!["gout"]);
    }

    #[test]
    fn test_meds_not_hallucinated_from_vitals() {
        let note = parse_clinical_note("HR 88 BP 120/80 and nothing else\n", &opts()).unwrap();
        assert!(note.medications.is_empty());
    }

    #[test]
    fn test_parse_and_render_roundtrip() {
        let (parsed, rendered) =
            parse_and_render("HPI: chest pain\nVitals: BP 150/90\n", &opts()).unwrap();
        assert!(!parsed.sections.is_empty());
        assert_eq!(rendered.template_id, TemplateId::Cis);
        assert!(rendered.text.contains("History of Present Illness:"));
    }

    #[test]
    fn test_partial_med_warning() {
        let note = parse_clinical_note("Medications: 5mg of the blue pill 3x\n", &opts()).unwrap();
        assert!(note
            .warnings
            .iter()
            .any(|w| w.code == "PARTIAL_MED_UNPARSED" && w.severity == Severity::Low));
    }

    #[test]
    fn test_reparse_is_identical() {
        let text = "Chief Complaint: Chest pain\nHPI: 65yo M with HTN\nVitals: BP 150/90 HR 88\nAssessment:\n1. Angina\nPlan:\n- EKG\n";
        let a = parse_clinical_note(text, &opts()).unwrap();
        let b = parse_clinical_note(text, &opts()).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
