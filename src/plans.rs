//! Evidence-based plan scaffolding: canned, diagnosis-indexed
//! recommendation blocks with guideline class tags. String labels only;
//! nothing here reaches for a network.

use std::collections::HashSet;

use once_cell::sync::Lazy;

use crate::refdata::ReferenceData;
use crate::types::Diagnosis;

struct PlanBullet {
    class: &'static str,
    text: &'static str,
    reference: &'static str,
}

struct PlanEntry {
    key: &'static str,
    /// Canonical diagnosis names that select this entry.
    matches: &'static [&'static str],
    title: &'static str,
    bullets: &'static [PlanBullet],
}

const fn b(class: &'static str, text: &'static str, reference: &'static str) -> PlanBullet {
    PlanBullet { class, text, reference }
}

const STEMI_BULLETS: &[PlanBullet] = &[
    b("Class I", "Aspirin 325 mg chewed immediately", "ACC/AHA 2021 Revascularization"),
    b("Class I", "Activate cath lab; primary PCI within 90 minutes", "ACC/AHA 2021 Revascularization"),
    b("Class I", "P2Y12 inhibitor loading dose", "ESC 2023 ACS"),
    b("Class I", "High-intensity statin", "ACC/AHA 2018 Cholesterol"),
];

const NSTEMI_BULLETS: &[PlanBullet] = &[
    b("Class I", "Serial troponin and EKG while symptomatic", "ACC/AHA 2021 Chest Pain"),
    b("Class I", "Aspirin load, then anticoagulation per ACS protocol", "ESC 2023 ACS"),
    b("Class IIa", "Early invasive strategy within 24h for high-risk features", "ESC 2023 ACS"),
    b("Class I", "High-intensity statin", "ACC/AHA 2018 Cholesterol"),
];

const UNSTABLE_ANGINA_BULLETS: &[PlanBullet] = &[
    b("Class I", "Serial troponin to exclude NSTEMI", "ACC/AHA 2021 Chest Pain"),
    b("Class I", "Aspirin load, beta blocker if no contraindication", "ACC/AHA 2021 Chest Pain"),
    b("Class I", "High-intensity statin", "ACC/AHA 2018 Cholesterol"),
];

const ANGINA_BULLETS: &[PlanBullet] = &[
    b("Class I", "Resting EKG and troponin if acute features", "ACC/AHA 2021 Chest Pain"),
    b("Class I", "Beta blocker first line for symptom control", "ACC/AHA 2021 Chest Pain"),
    b("Class I", "Sublingual nitroglycerin PRN", "ACC/AHA 2021 Chest Pain"),
    b("Class I", "High-intensity statin", "ACC/AHA 2018 Cholesterol"),
];

const AFIB_BULLETS: &[PlanBullet] = &[
    b("Class I", "Rate control with beta blocker or nondihydropyridine CCB", "ACC/AHA/ACCP/HRS 2023 AF"),
    b("Class I", "Anticoagulation per CHA2DS2-VASc", "ACC/AHA/ACCP/HRS 2023 AF"),
    b("Class IIa", "Rhythm control if symptomatic despite rate control", "ACC/AHA/ACCP/HRS 2023 AF"),
];

const HEART_FAILURE_BULLETS: &[PlanBullet] = &[
    b("Class I", "Loop diuretic for congestion; strict I/O and daily weights", "ACC/AHA/HFSA 2022 HF"),
    b("Class I", "ARNI/ACEi/ARB at maximally tolerated dose", "ACC/AHA/HFSA 2022 HF"),
    b("Class I", "Evidence-based beta blocker", "ACC/AHA/HFSA 2022 HF"),
    b("Class I", "SGLT2 inhibitor regardless of diabetes status", "ACC/AHA/HFSA 2022 HF"),
    b("Class IIa", "MRA if EF <= 35% and potassium < 5.0", "ACC/AHA/HFSA 2022 HF"),
];

const HTN_EMERGENCY_BULLETS: &[PlanBullet] = &[
    b("Class I", "IV titratable agent; reduce MAP by <= 25% in the first hour", "ACC/AHA 2017 HTN"),
    b("Class I", "ICU-level monitoring with arterial line as needed", "ACC/AHA 2017 HTN"),
    b("Class I", "Screen for end-organ damage: troponin, creatinine, neuro exam", "ACC/AHA 2017 HTN"),
];

const HTN_BULLETS: &[PlanBullet] = &[
    b("Class I", "Lifestyle modification: DASH diet, sodium restriction, exercise", "ACC/AHA 2017 HTN"),
    b("Class I", "First-line agent: thiazide, ACEi/ARB, or CCB", "ACC/AHA 2017 HTN"),
    b("Class I", "Target < 130/80 for most adults", "ACC/AHA 2017 HTN"),
];

const HYPERLIPIDEMIA_BULLETS: &[PlanBullet] = &[
    b("Class I", "High-intensity statin for ASCVD or LDL >= 190", "ACC/AHA 2018 Cholesterol"),
    b("Class IIa", "Recheck lipids 4-12 weeks after initiation", "ACC/AHA 2018 Cholesterol"),
];

const PERICARDITIS_BULLETS: &[PlanBullet] = &[
    b("Class I", "High-dose NSAID with taper", "ESC 2015 Pericardial Disease"),
    b("Class I", "Colchicine for 3 months", "ESC 2015 Pericardial Disease"),
];

const PE_BULLETS: &[PlanBullet] = &[
    b("Class I", "Anticoagulation; DOAC first line for most", "ESC 2019 PE"),
    b("Class IIa", "Risk stratify with troponin, BNP, and RV assessment", "ESC 2019 PE"),
];

static PLAN_LIBRARY: Lazy<Vec<PlanEntry>> = Lazy::new(|| {
    vec![
        PlanEntry {
            key: "stemi",
            matches: &["stemi"],
            title: "STEMI",
            bullets: STEMI_BULLETS,
        },
        PlanEntry {
            key: "nstemi",
            matches: &["nstemi", "acute coronary syndrome"],
            title: "NSTEMI / ACS",
            bullets: NSTEMI_BULLETS,
        },
        PlanEntry {
            key: "unstable_angina",
            matches: &["unstable angina"],
            title: "Unstable Angina",
            bullets: UNSTABLE_ANGINA_BULLETS,
        },
        PlanEntry {
            key: "angina",
            matches: &["angina", "chest pain", "coronary artery disease"],
            title: "Angina / CAD",
            bullets: ANGINA_BULLETS,
        },
        PlanEntry {
            key: "afib",
            matches: &["atrial fibrillation", "atrial flutter"],
            title: "Atrial Fibrillation / Flutter",
            bullets: AFIB_BULLETS,
        },
        PlanEntry {
            key: "heart_failure",
            matches: &["heart failure", "heart failure exacerbation", "cardiomyopathy"],
            title: "Heart Failure",
            bullets: HEART_FAILURE_BULLETS,
        },
        PlanEntry {
            key: "htn_emergency",
            matches: &["hypertensive emergency", "hypertensive urgency"],
            title: "Hypertensive Emergency",
            bullets: HTN_EMERGENCY_BULLETS,
        },
        PlanEntry {
            key: "htn",
            matches: &["hypertension"],
            title: "Hypertension",
            bullets: HTN_BULLETS,
        },
        PlanEntry {
            key: "hyperlipidemia",
            matches: &["hyperlipidemia", "dyslipidemia"],
            title: "Hyperlipidemia",
            bullets: HYPERLIPIDEMIA_BULLETS,
        },
        PlanEntry {
            key: "pericarditis",
            matches: &["pericarditis"],
            title: "Pericarditis",
            bullets: PERICARDITIS_BULLETS,
        },
        PlanEntry {
            key: "pe",
            matches: &["pulmonary embolism"],
            title: "Pulmonary Embolism",
            bullets: PE_BULLETS,
        },
    ]
});

fn entry_for(canonical: &str) -> Option<&'static PlanEntry> {
    PLAN_LIBRARY
        .iter()
        .find(|e| e.matches.iter().any(|m| *m == canonical))
}

/// Emit one recommendation block per recognized diagnosis key, in the
/// (already confidence-sorted) diagnosis order. Bullets deduplicate across
/// blocks. Returns `None` when no key maps.
pub fn generate_plan(diagnoses: &[Diagnosis], refdata: &ReferenceData) -> Option<String> {
    let mut seen_keys: HashSet<String> = HashSet::new();
    let mut seen_bullets: HashSet<String> = HashSet::new();
    let mut out = String::new();

    for dx in diagnoses {
        let canonical = dx.canonical.as_str();

        if let Some(entry) = entry_for(canonical) {
            if !seen_keys.insert(entry.key.to_string()) {
                continue;
            }
            let mut block = String::new();
            for bullet in entry.bullets {
                if !seen_bullets.insert(bullet.text.to_string()) {
                    continue;
                }
                block.push_str(&format!(
                    "- [{}] {} ({})\n",
                    bullet.class, bullet.text, bullet.reference
                ));
            }
            if !block.is_empty() {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(&format!("{}:\n", entry.title));
                out.push_str(&block);
            }
            continue;
        }

        // No built-in entry: fall back to the diagnosis library's management
        // lines, when it knows this canonical name.
        if let Some(dx_entry) = refdata.dx_entry(canonical) {
            if !seen_keys.insert(dx_entry.id.clone()) {
                continue;
            }
            let mut block = String::new();
            for line in &dx_entry.management {
                if !seen_bullets.insert(line.clone()) {
                    continue;
                }
                block.push_str(&format!("- {line}\n"));
            }
            if !block.is_empty() {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(&format!("{}:\n", dx_entry.name));
                out.push_str(&block);
            }
        }
    }

    if out.is_empty() {
        None
    } else {
        Some(out.trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Acuity, DxSource};

    fn make_dx(canonical: &str, confidence: f64) -> Diagnosis {
        Diagnosis {
            text: canonical.to_string(),
            canonical: canonical.to_string(),
            acuity: Acuity::Unspecified,
            confidence,
            source: DxSource::Assessment,
        }
    }

    #[test]
    fn test_single_block() {
        let plan = generate_plan(&[make_dx("atrial fibrillation", 0.9)], ReferenceData::builtin())
            .unwrap();
        assert!(plan.starts_with("Atrial Fibrillation / Flutter:"));
        assert!(plan.contains("[Class I] Rate control"));
        assert!(plan.contains("CHA2DS2-VASc"));
    }

    #[test]
    fn test_confidence_order_of_blocks() {
        let plan = generate_plan(
            &[make_dx("stemi", 0.95), make_dx("hypertension", 0.7)],
            ReferenceData::builtin(),
        )
        .unwrap();
        let stemi_pos = plan.find("STEMI:").unwrap();
        let htn_pos = plan.find("Hypertension:").unwrap();
        assert!(stemi_pos < htn_pos);
    }

    #[test]
    fn test_bullets_dedup_across_blocks() {
        // STEMI and NSTEMI both carry a high-intensity statin line.
        let plan = generate_plan(
            &[make_dx("stemi", 0.95), make_dx("nstemi", 0.8)],
            ReferenceData::builtin(),
        )
        .unwrap();
        assert_eq!(plan.matches("High-intensity statin").count(), 1);
    }

    #[test]
    fn test_unknown_key_emits_nothing() {
        assert!(generate_plan(&[make_dx("syncope", 0.9)], ReferenceData::builtin()).is_none());
        assert!(generate_plan(&[], ReferenceData::builtin()).is_none());
    }

    #[test]
    fn test_duplicate_canonicals_single_block() {
        let plan = generate_plan(
            &[make_dx("heart failure", 0.9), make_dx("heart failure exacerbation", 0.8)],
            ReferenceData::builtin(),
        )
        .unwrap();
        assert_eq!(plan.matches("Heart Failure:").count(), 1);
    }
}
