//! End-to-end scenarios and universal properties for the parsing and
//! rendering pipeline.

use rand::seq::SliceRandom;
use rand::SeedableRng;

use corscribe::normalize::normalize;
use corscribe::pipeline::{parse_and_render, parse_clinical_note};
use corscribe::types::{Acuity, LabFlag, SectionTag, VitalKind, VitalValue};
use corscribe::{ParseOptions, TemplateId};

fn opts() -> ParseOptions {
    ParseOptions::default()
}

fn vital_value(note: &corscribe::ParsedNote, kind: VitalKind) -> Option<VitalValue> {
    note.vitals.iter().find(|v| v.kind == kind).map(|v| v.value)
}

// =============================================================================
// SCENARIO 1: complete SOAP note
// =============================================================================

const SOAP_NOTE: &str = "Chief Complaint: Chest pain\nHPI: 65yo M with HTN, 2h chest pain, worse with exertion\nVitals:\nBP: 150/90\nHR: 88\nRR: 16\nSpO2: 98% on RA\nAssessment:\n1. Chest pain, likely angina\n2. Hypertension\nPlan:\n- EKG\n- Troponin\n- Aspirin 325mg\n- Cardiology consult\n";

#[test]
fn scenario_complete_soap_note() {
    let (parsed, rendered) = parse_and_render(SOAP_NOTE, &opts()).unwrap();

    for tag in [
        SectionTag::Hpi,
        SectionTag::Vitals,
        SectionTag::Assessment,
        SectionTag::Plan,
    ] {
        let section = parsed.sections.get(&tag).unwrap_or_else(|| panic!("missing {tag:?}"));
        assert!(!section.raw_text.trim().is_empty(), "{tag:?} body empty");
    }

    assert_eq!(
        vital_value(&parsed, VitalKind::Bp),
        Some(VitalValue::Pressure { systolic: 150, diastolic: 90 })
    );
    assert_eq!(
        vital_value(&parsed, VitalKind::Hr),
        Some(VitalValue::Single { value: 88.0 })
    );
    assert_eq!(
        vital_value(&parsed, VitalKind::Rr),
        Some(VitalValue::Single { value: 16.0 })
    );
    let spo2 = parsed.vitals.iter().find(|v| v.kind == VitalKind::SpO2).unwrap();
    assert_eq!(spo2.value, VitalValue::Single { value: 98.0 });
    assert_eq!(spo2.unit.as_deref(), Some("%"));

    let canonicals: Vec<&str> = parsed.diagnoses.iter().map(|d| d.canonical.as_str()).collect();
    assert!(canonicals.contains(&"angina"));
    assert!(canonicals.contains(&"hypertension"));

    assert_eq!(parsed.patient.age, Some(65));

    let text = &rendered.text;
    let hpi = text.find("History of Present Illness:").expect("HPI label");
    let vitals = text.find("Vitals:").expect("Vitals label");
    let assessment = text.find("Assessment:").expect("Assessment label");
    let plan = text.find("Plan:").expect("Plan label");
    assert!(hpi < vitals && vitals < assessment && assessment < plan);
}

// =============================================================================
// SCENARIO 2: out-of-order sections with synonyms
// =============================================================================

#[test]
fn scenario_out_of_order_synonyms() {
    let input = "Plan: diuresis, daily weights\nImpression: heart failure exacerbation\nExam: HR 110 BP 90/60\nHPI: 3 days of worsening dyspnea and orthopnea\n";
    let parsed = parse_clinical_note(input, &opts()).unwrap();

    assert!(parsed.sections.contains_key(&SectionTag::Plan));
    assert!(parsed.sections.contains_key(&SectionTag::Assessment));
    assert!(parsed.sections.contains_key(&SectionTag::Objective));
    assert!(parsed.sections.contains_key(&SectionTag::Hpi));
    assert!(parsed.sections[&SectionTag::Assessment]
        .raw_text
        .contains("heart failure exacerbation"));

    assert_eq!(
        vital_value(&parsed, VitalKind::Hr),
        Some(VitalValue::Single { value: 110.0 })
    );
    assert_eq!(
        vital_value(&parsed, VitalKind::Bp),
        Some(VitalValue::Pressure { systolic: 90, diastolic: 60 })
    );
}

// =============================================================================
// SCENARIO 3: all-caps hypertensive emergency
// =============================================================================

#[test]
fn scenario_all_caps_hypertensive_emergency() {
    let input = "HPI: PATIENT WITH HEADACHE\nVITALS: BP 220/120 HR 95\nA/P: HYPERTENSIVE EMERGENCY. START CLONIDINE.";
    let (parsed, rendered) = parse_and_render(input, &opts()).unwrap();

    assert!(parsed
        .diagnoses
        .iter()
        .any(|d| d.canonical == "hypertensive emergency"));

    let plan = &parsed.sections[&SectionTag::Plan];
    assert!(plan.raw_text.to_ascii_lowercase().contains("clonidine"));

    // Raw body casing preserved; header labels use canonical casing.
    assert!(rendered.text.contains("PATIENT WITH HEADACHE"));
    assert!(rendered.text.contains("Assessment:"));
    assert!(rendered.text.contains("Plan:"));
    assert!(rendered.text.to_ascii_lowercase().contains("clonidine"));
}

// =============================================================================
// SCENARIO 4: safety composition
// =============================================================================

#[test]
fn scenario_safety_composition() {
    let input = "Medications: Warfarin 5mg daily; Spironolactone 25mg daily\nLabs: Platelets 45, Creatinine 2.5, Potassium 5.5\nVitals: HR 48";
    let (parsed, rendered) = parse_and_render(input, &opts()).unwrap();

    let codes: Vec<&str> = parsed.warnings.iter().map(|w| w.code.as_str()).collect();
    assert!(codes.contains(&"ANTI_COAG_LOW_PLT"));
    assert!(codes.contains(&"RENAL_DOSE_REVIEW"));
    assert!(codes.contains(&"HYPERK_RISK"));
    assert!(codes.contains(&"BRADY_RATE_CTRL"));
    assert!(parsed.warnings.len() >= 4);

    // High severities lead and the rendered Assessment carries annotations.
    assert_eq!(parsed.warnings[0].severity.label(), "HIGH");
    assert!(rendered.text.contains("[HIGH]"));
    assert!(rendered.text.contains("[MEDIUM]"));
}

// =============================================================================
// SCENARIO 5: admin-line rejection
// =============================================================================

#[test]
fn scenario_admin_line_rejection() {
    let input = "Date: 08/27/2025\nPatient: John Doe\nMRN: 12345\nLabs:\nTroponin: 0.04 ng/mL\n";
    let parsed = parse_clinical_note(input, &opts()).unwrap();

    assert_eq!(parsed.labs.len(), 1);
    assert_eq!(parsed.labs[0].name_canonical, "troponin");
    for admin in ["date", "time", "patient", "mrn", "name"] {
        assert!(
            parsed.labs.iter().all(|l| l.name_canonical != admin),
            "admin header {admin} leaked into labs"
        );
    }
    assert_eq!(parsed.patient.mrn.as_deref(), Some("12345"));
}

// =============================================================================
// SCENARIO 6: combo lab splits
// =============================================================================

#[test]
fn scenario_combo_lab_split() {
    let input = "Labs:\nAST/ALT: 25/30 U/L\nPT/INR: 12.0/1.1 sec\n";
    let parsed = parse_clinical_note(input, &opts()).unwrap();

    assert_eq!(parsed.labs.len(), 4);
    let expect = [
        ("ast", 25.0, "U/L"),
        ("alt", 30.0, "U/L"),
        ("pt", 12.0, "sec"),
        ("inr", 1.1, "sec"),
    ];
    for (lab, (name, value, unit)) in parsed.labs.iter().zip(expect) {
        assert_eq!(lab.name_canonical, name);
        assert_eq!(lab.unit.as_deref(), Some(unit));
        match lab.value {
            corscribe::types::LabValue::Exact { value: v } => {
                assert!((v - value).abs() < 1e-9, "{name}: {v} != {value}")
            }
            other => panic!("{name}: unexpected value {other:?}"),
        }
    }
}

// =============================================================================
// UNIVERSAL PROPERTIES
// =============================================================================

#[test]
fn property_normalize_idempotent() {
    let inputs = [
        SOAP_NOTE,
        "A/P: HTN.\r\n\r\n\r\nPlan:\ttitrate  meds\n",
        "\u{FEFF}\u{201C}smart quotes\u{201D} \u{2014} and dashes",
        "",
    ];
    for input in inputs {
        let once = normalize(input);
        let twice = normalize(&once.cleaned);
        assert_eq!(once.cleaned, twice.cleaned, "normalize not idempotent for {input:?}");
    }
}

#[test]
fn property_parse_and_render_deterministic() {
    let a = parse_and_render(SOAP_NOTE, &opts()).unwrap();
    let b = parse_and_render(SOAP_NOTE, &opts()).unwrap();
    assert_eq!(a.1.text, b.1.text);
    assert_eq!(
        serde_json::to_string(&a.0).unwrap(),
        serde_json::to_string(&b.0).unwrap()
    );
}

/// Every byte of `cleaned` lands in a section header, a section body, or
/// unknown_text; nothing is lost or doubled. Bodies join their lines with
/// a newline, so the only permitted shortfall is the newline mass.
#[test]
fn property_section_coverage() {
    let inputs = [
        SOAP_NOTE,
        "preamble line\nHPI: text\nbody\n\nVITALS\nBP 120/80\ntrailing prose that is long enough to not be a header\n",
        "no headers at all, just one line of prose",
    ];
    for input in inputs {
        let parsed = parse_clinical_note(input, &opts()).unwrap();
        let mut mass = 0usize;
        for s in parsed.sections.values() {
            mass += s.raw_text.len();
            if let Some(h) = &s.source_header_text {
                mass += h.len();
            }
        }
        for u in &parsed.unknown_text {
            mass += u.len();
        }
        let cleaned = &parsed.normalized.cleaned;
        let newlines = cleaned.matches('\n').count();
        assert!(
            mass >= cleaned.len().saturating_sub(newlines) && mass <= cleaned.len(),
            "coverage mass {mass} vs cleaned {} for {input:?}",
            cleaned.len()
        );
    }
}

#[test]
fn property_no_admin_as_lab_and_allowlist() {
    let input = "Date: 01/02/2024\nTime: 14:30\nName: Smith\nLabs: Troponin 0.02, Potassium 4.0, Widget 9\n";
    let parsed = parse_clinical_note(input, &opts()).unwrap();
    let rd = corscribe::ReferenceData::builtin();
    for lab in &parsed.labs {
        assert!(
            rd.lab_canonical(&lab.name_canonical).is_some()
                || rd.lab_ref(&lab.name_canonical).is_some(),
            "lab {} not allowlisted",
            lab.name_canonical
        );
    }
    assert_eq!(parsed.labs.len(), 2);
}

#[test]
fn property_negation_removes_diagnoses() {
    let input = "HPI: denies chest pain and palpitations. Longstanding hypertension.\n";
    let parsed = parse_clinical_note(input, &opts()).unwrap();
    let canonicals: Vec<&str> = parsed.diagnoses.iter().map(|d| d.canonical.as_str()).collect();
    assert!(!canonicals.contains(&"chest pain"));
    assert!(!canonicals.contains(&"palpitations"));
    assert!(canonicals.contains(&"hypertension"));
}

#[test]
fn property_acuity_preference() {
    let input = "Assessment:\n1. Acute heart failure\n2. Chronic heart failure\n";
    let parsed = parse_clinical_note(input, &opts()).unwrap();
    let hf: Vec<_> = parsed
        .diagnoses
        .iter()
        .filter(|d| d.canonical == "heart failure")
        .collect();
    assert_eq!(hf.len(), 1);
    assert_eq!(hf[0].acuity, Acuity::Acute);
    assert!(hf[0].confidence > 0.9);
}

#[test]
fn property_warning_stability() {
    let input = "Medications: Warfarin 5mg daily; Lisinopril 10mg daily\nLabs: Platelets 40, Potassium 5.9\n";
    let runs: Vec<Vec<String>> = (0..3)
        .map(|_| {
            parse_clinical_note(input, &opts())
                .unwrap()
                .warnings
                .iter()
                .map(|w| w.code.clone())
                .collect()
        })
        .collect();
    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[1], runs[2]);
    assert!(!runs[0].is_empty());
}

#[test]
fn property_lab_flag_suffixes() {
    let cases = [
        ("Labs: Potassium 4.0 H\n", LabFlag::High),
        ("Labs: Potassium 4.0 Low\n", LabFlag::Low),
        ("Labs: Potassium 4.0 \u{2191}\n", LabFlag::High),
        ("Labs: Potassium 4.0 *\n", LabFlag::Star),
    ];
    for (input, expected) in cases {
        let parsed = parse_clinical_note(input, &opts()).unwrap();
        assert_eq!(parsed.labs[0].flag, expected, "{input}");
    }
}

#[test]
fn property_rendering_order_matches_template() {
    let expected: [(TemplateId, &[&str]); 3] = [
        (
            TemplateId::Cis,
            &[
                "Demographics:",
                "Chief Complaint:",
                "History of Present Illness:",
                "Past Medical History:",
                "Medications:",
                "Allergies:",
                "Vitals:",
                "Labs:",
                "Imaging:",
                "Assessment:",
                "Plan:",
            ],
        ),
        (
            TemplateId::Consult,
            &[
                "Demographics:",
                "Reason for Consultation:",
                "History of Present Illness:",
                "Past Medical History:",
                "Past Surgical History:",
                "Family History:",
                "Social History:",
                "Review of Systems:",
                "Medications:",
                "Allergies:",
                "Vitals:",
                "Labs:",
                "Imaging:",
                "Assessment:",
                "Plan:",
            ],
        ),
        (
            TemplateId::Progress,
            &["Subjective:", "Objective:", "Vitals:", "Labs:", "Assessment:", "Plan:"],
        ),
    ];

    for (template, labels) in expected {
        let mut o = opts();
        o.template = template;
        let (_, rendered) = parse_and_render(SOAP_NOTE, &o).unwrap();
        assert_eq!(rendered.template_id, template);

        let mut last = 0usize;
        for label in labels {
            let pos = rendered.text[last..]
                .find(label)
                .unwrap_or_else(|| panic!("{template:?}: label {label} missing or out of order"));
            last += pos + label.len();
        }
    }
}

// =============================================================================
// SHUFFLE PROPERTY
// =============================================================================

/// Shuffling section block order must not change which sections, vitals,
/// and diagnoses are recognized, and canonical rendering stays invariant
/// modulo whitespace.
#[test]
fn property_section_shuffle_invariance() {
    let blocks = [
        "Chief Complaint: Chest pain",
        "HPI: 65yo M with HTN, 2h chest pain",
        "Vitals:\nBP: 150/90\nHR: 88",
        "Labs:\nTroponin: 0.04 ng/mL",
        "Assessment:\n1. Chest pain, likely angina\n2. Hypertension",
        "Plan:\n- EKG\n- Troponin",
    ];

    let baseline = parse_and_render(&blocks.join("\n"), &opts()).unwrap();
    let baseline_tags: Vec<SectionTag> = baseline.0.sections.keys().copied().collect();
    let baseline_render = squeeze(&baseline.1.text);

    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    for _ in 0..6 {
        let mut shuffled = blocks.to_vec();
        shuffled.shuffle(&mut rng);
        let (parsed, rendered) = parse_and_render(&shuffled.join("\n"), &opts()).unwrap();

        let tags: Vec<SectionTag> = parsed.sections.keys().copied().collect();
        assert_eq!(tags, baseline_tags, "section set changed for {shuffled:?}");

        assert_eq!(
            vital_value(&parsed, VitalKind::Bp),
            Some(VitalValue::Pressure { systolic: 150, diastolic: 90 })
        );
        let canonicals: Vec<&str> =
            parsed.diagnoses.iter().map(|d| d.canonical.as_str()).collect();
        assert!(canonicals.contains(&"angina"));
        assert!(canonicals.contains(&"hypertension"));

        assert_eq!(squeeze(&rendered.text), baseline_render, "render changed for {shuffled:?}");
    }
}

fn squeeze(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
