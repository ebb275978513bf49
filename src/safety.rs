//! Clinical safety validation: cross-checks medications against labs,
//! vitals, and each other. Every rule has a stable code so hosts and tests
//! can key on it.

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::types::{
    finalize_warnings, Lab, Medication, Severity, TriggerKind, TriggerRef, Vital, VitalKind,
    VitalValue, Warning,
};

// =============================================================================
// DRUG CLASSES
// =============================================================================

static ANTICOAGULANTS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "warfarin",
        "coumadin",
        "apixaban",
        "eliquis",
        "rivaroxaban",
        "xarelto",
        "dabigatran",
        "pradaxa",
        "edoxaban",
        "enoxaparin",
        "lovenox",
        "heparin",
        "fondaparinux",
    ]
    .into_iter()
    .collect()
});

static RENALLY_ELIMINATED: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "metformin",
        "gabapentin",
        "digoxin",
        "dabigatran",
        "rivaroxaban",
        "enoxaparin",
        "vancomycin",
        "allopurinol",
        "spironolactone",
        "sotalol",
        "dofetilide",
        "lisinopril",
    ]
    .into_iter()
    .collect()
});

static POTASSIUM_RETAINING: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "lisinopril",
        "enalapril",
        "ramipril",
        "captopril",
        "benazepril",
        "losartan",
        "valsartan",
        "olmesartan",
        "candesartan",
        "irbesartan",
        "spironolactone",
        "eplerenone",
        "amiloride",
        "triamterene",
        "sacubitril-valsartan",
        "entresto",
    ]
    .into_iter()
    .collect()
});

static RATE_LIMITING: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "metoprolol",
        "atenolol",
        "carvedilol",
        "bisoprolol",
        "propranolol",
        "labetalol",
        "nebivolol",
        "diltiazem",
        "verapamil",
        "digoxin",
        "amiodarone",
        "ivabradine",
        "clonidine",
        "sotalol",
    ]
    .into_iter()
    .collect()
});

/// Canonical drug-drug clashes. Each pair carries its own stable code so
/// collapse-by-code cannot merge distinct interactions.
static DRUG_CLASHES: Lazy<Vec<(&'static str, &'static str, &'static str, &'static str)>> =
    Lazy::new(|| {
        vec![
            (
                "verapamil",
                "metoprolol",
                "DDI_VERAPAMIL_BETA_BLOCKER",
                "Verapamil with a beta blocker risks additive AV nodal blockade",
            ),
            (
                "diltiazem",
                "metoprolol",
                "DDI_DILTIAZEM_BETA_BLOCKER",
                "Diltiazem with a beta blocker risks additive AV nodal blockade",
            ),
            (
                "amiodarone",
                "digoxin",
                "DDI_AMIODARONE_DIGOXIN",
                "Amiodarone raises digoxin levels; toxicity risk",
            ),
            (
                "warfarin",
                "amiodarone",
                "DDI_WARFARIN_AMIODARONE",
                "Amiodarone potentiates warfarin; INR will rise",
            ),
            (
                "sildenafil",
                "nitroglycerin",
                "DDI_NITRATE_PDE5",
                "PDE5 inhibitor with nitrate risks refractory hypotension",
            ),
        ]
    });

fn med_in_class(med: &Medication, class: &HashSet<&'static str>) -> bool {
    med.name
        .split_whitespace()
        .any(|token| class.contains(token.to_ascii_lowercase().as_str()))
}

fn med_is(med: &Medication, drug: &str) -> bool {
    med.name
        .split_whitespace()
        .any(|token| token.eq_ignore_ascii_case(drug))
}

fn med_triggers(meds: &[Medication], class: &HashSet<&'static str>) -> Vec<TriggerRef> {
    meds.iter()
        .enumerate()
        .filter(|(_, m)| med_in_class(m, class))
        .map(|(i, _)| TriggerRef {
            kind: TriggerKind::Medication,
            index: i,
        })
        .collect()
}

fn lab_value(labs: &[Lab], canonical: &str) -> Option<(usize, f64)> {
    labs.iter()
        .enumerate()
        .find(|(_, l)| l.name_canonical == canonical)
        .map(|(i, l)| (i, l.value.magnitude()))
}

fn min_heart_rate(vitals: &[Vital]) -> Option<(usize, f64)> {
    vitals
        .iter()
        .enumerate()
        .filter(|(_, v)| v.kind == VitalKind::Hr)
        .filter_map(|(i, v)| match v.value {
            VitalValue::Single { value } => Some((i, value)),
            VitalValue::SingleRange { low, .. } => Some((i, low)),
            _ => None,
        })
        .fold(None, |acc: Option<(usize, f64)>, (i, v)| match acc {
            Some((_, best)) if best <= v => acc,
            _ => Some((i, v)),
        })
}

// =============================================================================
// RULES
// =============================================================================

/// Cross-check meds x labs x vitals. Output is sorted (severity desc,
/// code asc) and deduplicated by code.
pub fn validate_safety(meds: &[Medication], labs: &[Lab], vitals: &[Vital]) -> Vec<Warning> {
    let mut warnings: Vec<Warning> = Vec::new();

    // Anticoagulation against significant thrombocytopenia.
    if let Some((lab_idx, plt)) = lab_value(labs, "platelets") {
        let anticoag = med_triggers(meds, &ANTICOAGULANTS);
        if plt < 50.0 && !anticoag.is_empty() {
            let mut triggers = anticoag;
            triggers.push(TriggerRef {
                kind: TriggerKind::Lab,
                index: lab_idx,
            });
            warnings.push(Warning {
                severity: Severity::High,
                code: "ANTI_COAG_LOW_PLT".to_string(),
                message: format!(
                    "Anticoagulant on board with platelets {plt} (< 50 x10^9/L)"
                ),
                action: Some("Review anticoagulation; consider holding and hematology input".to_string()),
                triggers,
            });
        }
    }

    // Renally-eliminated drugs against elevated creatinine.
    if let Some((lab_idx, cr)) = lab_value(labs, "creatinine") {
        let renal = med_triggers(meds, &RENALLY_ELIMINATED);
        if cr > 1.8 && !renal.is_empty() {
            let mut triggers = renal;
            triggers.push(TriggerRef {
                kind: TriggerKind::Lab,
                index: lab_idx,
            });
            warnings.push(Warning {
                severity: Severity::High,
                code: "RENAL_DOSE_REVIEW".to_string(),
                message: format!("Creatinine {cr} mg/dL with renally-eliminated medication"),
                action: Some("Reassess renal dosing; check eGFR and adjust or hold".to_string()),
                triggers,
            });
        }
    }

    // Hyperkalemia with potassium-retaining agents.
    if let Some((lab_idx, k)) = lab_value(labs, "potassium") {
        let retaining = med_triggers(meds, &POTASSIUM_RETAINING);
        if k >= 5.5 && !retaining.is_empty() {
            let mut triggers = retaining;
            triggers.push(TriggerRef {
                kind: TriggerKind::Lab,
                index: lab_idx,
            });
            warnings.push(Warning {
                severity: Severity::High,
                code: "HYPERK_RISK".to_string(),
                message: format!("Potassium {k} mEq/L with potassium-retaining medication"),
                action: Some("Hold ACEi/ARB/MRA; recheck potassium and obtain EKG".to_string()),
                triggers,
            });
        }
    }

    // Bradycardia; rate-limiting agents join the trigger list when present.
    if let Some((vital_idx, hr)) = min_heart_rate(vitals) {
        if hr < 50.0 {
            let mut triggers = med_triggers(meds, &RATE_LIMITING);
            triggers.push(TriggerRef {
                kind: TriggerKind::Vital,
                index: vital_idx,
            });
            warnings.push(Warning {
                severity: Severity::Medium,
                code: "BRADY_RATE_CTRL".to_string(),
                message: format!("Heart rate {hr} bpm; review rate-limiting medications"),
                action: Some("Reassess beta blocker / CCB / digoxin dosing".to_string()),
                triggers,
            });
        }
    }

    // Canonical drug-drug clashes.
    for (a, b, code, message) in DRUG_CLASHES.iter() {
        let idx_a = meds.iter().position(|m| med_is(m, a));
        let idx_b = meds.iter().position(|m| med_is(m, b));
        if let (Some(ia), Some(ib)) = (idx_a, idx_b) {
            warnings.push(Warning {
                severity: Severity::Medium,
                code: (*code).to_string(),
                message: (*message).to_string(),
                action: Some("Review combination; adjust or substitute".to_string()),
                triggers: vec![
                    TriggerRef {
                        kind: TriggerKind::Medication,
                        index: ia,
                    },
                    TriggerRef {
                        kind: TriggerKind::Medication,
                        index: ib,
                    },
                ],
            });
        }
    }

    finalize_warnings(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labs::extract_labs;
    use crate::meds::extract_medications;
    use crate::refdata::ReferenceData;
    use crate::vitals::extract_vitals;

    fn check(meds_text: &str, labs_text: &str, vitals_text: &str) -> Vec<Warning> {
        let (meds, _, _) = extract_medications(meds_text, true);
        let (labs, _) = extract_labs(labs_text, ReferenceData::builtin());
        let (vitals, _) = extract_vitals(vitals_text);
        validate_safety(&meds, &labs, &vitals)
    }

    #[test]
    fn test_safety_composition_scenario() {
        let warnings = check(
            "Warfarin 5mg daily; Spironolactone 25mg daily",
            "Platelets 45, Creatinine 2.5, Potassium 5.5",
            "HR 48",
        );
        let codes: Vec<&str> = warnings.iter().map(|w| w.code.as_str()).collect();
        assert!(codes.contains(&"ANTI_COAG_LOW_PLT"));
        assert!(codes.contains(&"RENAL_DOSE_REVIEW"));
        assert!(codes.contains(&"HYPERK_RISK"));
        assert!(codes.contains(&"BRADY_RATE_CTRL"));
        assert!(warnings.len() >= 4);

        // HIGH codes first, alphabetical within severity.
        assert_eq!(codes[0], "ANTI_COAG_LOW_PLT");
        assert_eq!(codes[1], "HYPERK_RISK");
        assert_eq!(codes[2], "RENAL_DOSE_REVIEW");
        assert_eq!(codes[3], "BRADY_RATE_CTRL");
    }

    #[test]
    fn test_no_warnings_when_benign() {
        let warnings = check("Aspirin 81mg daily", "Potassium 4.2", "HR 72 BP 118/76");
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_thrombocytopenia_without_anticoag_is_quiet() {
        let warnings = check("Aspirin 81mg daily", "Platelets 45", "");
        assert!(!warnings.iter().any(|w| w.code == "ANTI_COAG_LOW_PLT"));
    }

    #[test]
    fn test_ddi_pair() {
        let warnings = check("Verapamil 120mg daily; Metoprolol 50mg bid", "", "");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, "DDI_VERAPAMIL_BETA_BLOCKER");
        assert_eq!(warnings[0].severity, Severity::Medium);
        assert_eq!(warnings[0].triggers.len(), 2);
    }

    #[test]
    fn test_triggers_reference_indices() {
        let warnings = check("Warfarin 5mg daily", "Platelets 30", "");
        let w = &warnings[0];
        assert!(w
            .triggers
            .iter()
            .any(|t| t.kind == TriggerKind::Medication && t.index == 0));
        assert!(w.triggers.iter().any(|t| t.kind == TriggerKind::Lab && t.index == 0));
    }

    #[test]
    fn test_deterministic_across_runs() {
        let a = check(
            "Warfarin 5mg daily; Spironolactone 25mg daily",
            "Platelets 45, Creatinine 2.5, Potassium 5.5",
            "HR 48",
        );
        let b = check(
            "Warfarin 5mg daily; Spironolactone 25mg daily",
            "Platelets 45, Creatinine 2.5, Potassium 5.5",
            "HR 48",
        );
        let codes_a: Vec<&str> = a.iter().map(|w| w.code.as_str()).collect();
        let codes_b: Vec<&str> = b.iter().map(|w| w.code.as_str()).collect();
        assert_eq!(codes_a, codes_b);
    }
}
