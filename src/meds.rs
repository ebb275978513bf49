//! Medication extraction: delimiter-tolerant splitting with per-item
//! `name dose unit [route] [frequency]` parsing and frequency synonym
//! normalization.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::Medication;
use crate::vitals::Span;

static MEDS_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:medications?|meds|current medications|home medications)\s*:\s*")
        .expect("invalid MEDS_LABEL_RE")
});

static BULLET_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*\u{2022}]|\d{1,2}[.)])\s+").expect("invalid BULLET_PREFIX_RE"));

static MED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*([A-Za-z][A-Za-z0-9\-]*(?:\s+[A-Za-z][A-Za-z0-9\-]*){0,2}?)\s+(\d+(?:\.\d+)?(?:/\d+(?:\.\d+)?)?)\s*(mg|mcg|g|grams?|mL|units?|mEq|%)?(?:\s+(po|iv|im|sc|subq|sl|pr|inh|oral|topical|by mouth))?\s*(.*)$",
    )
    .expect("invalid MED_RE")
});

/// Bare-name item accepted only when scanning a Medications section.
static NAME_ONLY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z \-]{1,40}$").expect("invalid NAME_ONLY_RE"));

// =============================================================================
// FREQUENCY SYNONYMS
// =============================================================================

static FREQ_SYNONYMS: Lazy<Vec<(&'static [&'static str], &'static str)>> = Lazy::new(|| {
    vec![
        (
            &["qd", "q d", "qday", "daily", "once daily", "every day", "od", "q24h"][..],
            "daily",
        ),
        (&["bid", "b i d", "q12h", "twice daily", "twice a day"][..], "bid"),
        (&["tid", "t i d", "q8h", "three times daily", "three times a day"][..], "tid"),
        (&["qid", "q i d", "q6h", "four times daily", "four times a day"][..], "qid"),
        (&["qhs", "nightly", "at bedtime", "at night"][..], "qhs"),
        (&["qam", "every morning", "in the morning"][..], "qam"),
        (&["prn", "as needed"][..], "prn"),
        (&["weekly", "qweek", "once weekly", "every week"][..], "weekly"),
        (&["qod", "every other day"][..], "qod"),
    ]
});

/// Normalize a frequency phrase. The bool reports whether a synonym table
/// entry matched; unknown phrases pass through trimmed.
fn normalize_frequency(raw: &str) -> (Option<String>, bool) {
    let cleaned: String = raw
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == '.' { ' ' } else { c })
        .collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return (None, false);
    }
    for (synonyms, canonical) in FREQ_SYNONYMS.iter() {
        if synonyms.iter().any(|s| *s == cleaned || cleaned.starts_with(&format!("{s} "))) {
            return (Some((*canonical).to_string()), true);
        }
    }
    (Some(cleaned), false)
}

// =============================================================================
// EXTRACTION
// =============================================================================

/// Extract medications. `lenient` accepts bare drug names (Medications
/// section bodies); strict mode requires a dose so prose stays quiet.
/// Returns (meds, line spans, unparsed items).
pub fn extract_medications(text: &str, lenient: bool) -> (Vec<Medication>, Vec<Span>, Vec<String>) {
    let mut meds: Vec<Medication> = Vec::new();
    let mut spans: Vec<Span> = Vec::new();
    let mut unparsed: Vec<String> = Vec::new();

    let mut offset = 0usize;
    for line in text.split('\n') {
        let line_start = offset;
        offset += line.len() + 1;
        if line.trim().is_empty() {
            continue;
        }

        let after_label = MEDS_LABEL_RE.find(line).map(|m| m.end()).unwrap_or(0);
        let content = BULLET_PREFIX_RE.replace(&line[after_label..], "");

        let before = meds.len();
        for item in content.split(';') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            match parse_item(item, lenient) {
                Some(med) => meds.push(med),
                None if lenient && NAME_ONLY_RE.is_match(item) && !is_negation(item) => {
                    meds.push(Medication {
                        name: item.to_string(),
                        dose: None,
                        unit: None,
                        route: None,
                        frequency: None,
                        raw: item.to_string(),
                    });
                }
                None if lenient => unparsed.push(item.to_string()),
                None => {}
            }
        }
        if meds.len() > before {
            spans.push((line_start, line_start + line.len()));
        }
    }

    (meds, spans, unparsed)
}

fn is_negation(item: &str) -> bool {
    let lower = item.to_ascii_lowercase();
    lower == "none" || lower.starts_with("no ") || lower == "nkda"
}

fn parse_item(item: &str, lenient: bool) -> Option<Medication> {
    let caps = MED_RE.captures(item)?;
    let name = caps[1].trim().to_string();
    let dose = caps[2].to_string();
    let unit = caps.get(3).map(|m| m.as_str().to_ascii_lowercase());
    let route = caps
        .get(4)
        .map(|m| m.as_str().to_ascii_lowercase())
        .map(|r| if r == "by mouth" { "po".to_string() } else { r });
    let (frequency, freq_known) = caps
        .get(5)
        .map(|m| normalize_frequency(m.as_str()))
        .unwrap_or((None, false));

    // Outside a Medications section a bare "NAME <number>" is usually not a
    // drug (vitals, lab shorthand, lead counts); demand a unit, route, or a
    // recognized frequency.
    if !lenient && unit.is_none() && route.is_none() && !freq_known {
        return None;
    }

    Some(Medication {
        name,
        dose: Some(dose),
        unit,
        route,
        frequency,
        raw: item.to_string(),
    })
}
