//! Diagnosis disambiguation: negation pruning, acute-over-chronic
//! preference, vital-supported re-ranking, and a stable final sort.

use std::collections::BTreeMap;

use crate::context::is_negated;
use crate::types::{Acuity, ContextMarker, Diagnosis, Vital, VitalKind, VitalValue};

const ACUTE_BOOST: f64 = 0.2;
const VITAL_SUPPORT_BOOST: f64 = 0.1;

const TACHY_SUPPORTED: &[&str] = &[
    "atrial fibrillation",
    "atrial flutter",
    "supraventricular tachycardia",
    "ventricular tachycardia",
    "tachycardia",
];

fn max_heart_rate(vitals: &[Vital]) -> Option<f64> {
    vitals
        .iter()
        .filter(|v| v.kind == VitalKind::Hr)
        .filter_map(|v| match v.value {
            VitalValue::Single { value } => Some(value),
            VitalValue::SingleRange { high, .. } => Some(high),
            _ => None,
        })
        .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
}

fn max_pressure(vitals: &[Vital]) -> Option<(u16, u16)> {
    vitals
        .iter()
        .filter(|v| v.kind == VitalKind::Bp)
        .filter_map(|v| match v.value {
            VitalValue::Pressure { systolic, diastolic } => Some((systolic, diastolic)),
            VitalValue::PressureRange {
                systolic_high,
                diastolic_high,
                ..
            } => Some((systolic_high, diastolic_high)),
            _ => None,
        })
        .fold(None, |acc: Option<(u16, u16)>, (s, d)| {
            Some(match acc {
                None => (s, d),
                Some((as_, ad)) => (as_.max(s), ad.max(d)),
            })
        })
}

fn source_rank(d: &Diagnosis) -> u8 {
    d.source as u8
}

/// Disambiguate mined diagnosis candidates.
///
/// `pmh_text` is the Past Medical History body; a chronic diagnosis
/// reaffirmed there survives alongside its acute counterpart.
pub fn disambiguate(
    diagnoses: Vec<Diagnosis>,
    context: &[ContextMarker],
    vitals: &[Vital],
    pmh_text: Option<&str>,
) -> Vec<Diagnosis> {
    // 1. Negation pruning.
    let mut kept: Vec<Diagnosis> = diagnoses
        .into_iter()
        .filter(|d| !is_negated(context, &d.text) && !is_negated(context, &d.canonical))
        .collect();

    // 2. Collapse duplicates of the same (canonical, acuity), preferring the
    // stronger source.
    let mut best: BTreeMap<(String, Acuity), Diagnosis> = BTreeMap::new();
    for d in kept.drain(..) {
        let key = (d.canonical.clone(), d.acuity);
        match best.get(&key) {
            Some(existing)
                if (existing.confidence, std::cmp::Reverse(source_rank(existing)))
                    >= (d.confidence, std::cmp::Reverse(source_rank(&d))) => {}
            _ => {
                best.insert(key, d);
            }
        }
    }
    let mut kept: Vec<Diagnosis> = best.into_values().collect();

    // 3. Acute-over-chronic: the acute form gets a boost and the chronic
    // twin drops unless PMH reaffirms it.
    let pmh_lower = pmh_text.map(|t| t.to_ascii_lowercase());
    let acute_canonicals: Vec<String> = kept
        .iter()
        .filter(|d| d.acuity == Acuity::Acute)
        .map(|d| d.canonical.clone())
        .collect();
    kept.retain(|d| {
        if d.acuity != Acuity::Chronic || !acute_canonicals.contains(&d.canonical) {
            return true;
        }
        pmh_lower
            .as_deref()
            .is_some_and(|pmh| pmh.contains(d.canonical.as_str()))
    });
    for d in kept.iter_mut() {
        if d.acuity == Acuity::Acute {
            d.confidence = (d.confidence + ACUTE_BOOST).min(1.0);
        }
    }

    // 4. Vital support.
    let hr = max_heart_rate(vitals);
    let bp = max_pressure(vitals);
    for d in kept.iter_mut() {
        if hr.is_some_and(|h| h > 100.0) && TACHY_SUPPORTED.contains(&d.canonical.as_str()) {
            d.confidence = (d.confidence + VITAL_SUPPORT_BOOST).min(1.0);
        }
        if bp.is_some_and(|(s, dia)| s > 180 || dia > 110)
            && d.canonical == "hypertensive emergency"
        {
            d.confidence = (d.confidence + VITAL_SUPPORT_BOOST).min(1.0);
        }
    }

    // 5. Stable sort on (-confidence, source order, canonical name).
    kept.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| source_rank(a).cmp(&source_rank(b)))
            .then_with(|| a.canonical.cmp(&b.canonical))
    });
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::extract_context;
    use crate::types::DxSource;

    fn make_dx(canonical: &str, acuity: Acuity, confidence: f64, source: DxSource) -> Diagnosis {
        Diagnosis {
            text: canonical.to_string(),
            canonical: canonical.to_string(),
            acuity,
            confidence,
            source,
        }
    }

    #[test]
    fn test_negated_diagnosis_removed() {
        let context = extract_context("Patient reports no fever. Denies chest pain.");
        let dx = vec![
            make_dx("chest pain", Acuity::Unspecified, 0.9, DxSource::Assessment),
            make_dx("hypertension", Acuity::Unspecified, 0.9, DxSource::Assessment),
        ];
        let out = disambiguate(dx, &context, &[], None);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].canonical, "hypertension");
    }

    #[test]
    fn test_acute_beats_chronic() {
        let dx = vec![
            make_dx("heart failure", Acuity::Acute, 0.9, DxSource::Assessment),
            make_dx("heart failure", Acuity::Chronic, 0.9, DxSource::Assessment),
        ];
        let out = disambiguate(dx, &[], &[], None);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].acuity, Acuity::Acute);
        assert!(out[0].confidence > 0.9);
    }

    #[test]
    fn test_chronic_survives_when_pmh_reaffirms() {
        let dx = vec![
            make_dx("heart failure", Acuity::Acute, 0.9, DxSource::Assessment),
            make_dx("heart failure", Acuity::Chronic, 0.9, DxSource::Assessment),
        ];
        let out = disambiguate(dx, &[], &[], Some("Known heart failure since 2019"));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_tachycardia_boosts_afib() {
        let (vitals, _) = crate::vitals::extract_vitals("HR: 132");
        let dx = vec![
            make_dx("atrial fibrillation", Acuity::Unspecified, 0.7, DxSource::Hpi),
            make_dx("hyperlipidemia", Acuity::Unspecified, 0.7, DxSource::Hpi),
        ];
        let out = disambiguate(dx, &[], &vitals, None);
        assert_eq!(out[0].canonical, "atrial fibrillation");
        assert!(out[0].confidence > out[1].confidence);
    }

    #[test]
    fn test_crisis_bp_boosts_hypertensive_emergency() {
        let (vitals, _) = crate::vitals::extract_vitals("BP 220/120");
        let dx = vec![make_dx(
            "hypertensive emergency",
            Acuity::Unspecified,
            0.9,
            DxSource::Assessment,
        )];
        let out = disambiguate(dx, &[], &vitals, None);
        assert!((out[0].confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sort_is_stable_and_deterministic() {
        let dx = vec![
            make_dx("hypertension", Acuity::Unspecified, 0.9, DxSource::Assessment),
            make_dx("angina", Acuity::Unspecified, 0.9, DxSource::Assessment),
        ];
        let out = disambiguate(dx, &[], &[], None);
        // Equal confidence and source: alphabetical canonical order.
        assert_eq!(out[0].canonical, "angina");
        assert_eq!(out[1].canonical, "hypertension");
    }

    #[test]
    fn test_duplicate_sources_collapse() {
        let dx = vec![
            make_dx("hypertension", Acuity::Unspecified, 0.7, DxSource::Hpi),
            make_dx("hypertension", Acuity::Unspecified, 0.9, DxSource::Assessment),
        ];
        let out = disambiguate(dx, &[], &[], None);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, DxSource::Assessment);
    }
}
