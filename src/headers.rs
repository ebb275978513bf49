//! Synonym/header scoring: maps candidate header strings to canonical
//! section tags with a confidence score.
//!
//! Backed by a closed SIGNAL_WORDS table. Exact matches score >= 0.9,
//! token-subset matches land in 0.6-0.89 scaled by covered-token ratio,
//! and a body sample can nudge tags whose entity patterns appear in it.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::SectionTag;

#[derive(Debug, Clone, Copy)]
struct SignalWord {
    phrase: &'static str,
    tag: SectionTag,
    weight: f64,
    /// Combined Assessment+Plan headers; the detector splits the body.
    combined: bool,
}

const fn sw(phrase: &'static str, tag: SectionTag, weight: f64) -> SignalWord {
    SignalWord {
        phrase,
        tag,
        weight,
        combined: false,
    }
}

const fn sw_combined(phrase: &'static str, weight: f64) -> SignalWord {
    SignalWord {
        phrase,
        tag: SectionTag::Assessment,
        weight,
        combined: true,
    }
}

// =============================================================================
// SIGNAL WORDS
// =============================================================================

static SIGNAL_WORDS: Lazy<Vec<SignalWord>> = Lazy::new(|| {
    use SectionTag::*;
    vec![
        // Subjective / chief complaint
        sw("subjective", Subjective, 0.95),
        sw("chief complaint", Subjective, 0.96),
        sw("cc", Subjective, 0.85),
        sw("reason for visit", Subjective, 0.92),
        sw("reason for consultation", Subjective, 0.92),
        sw("presenting complaint", Subjective, 0.9),
        // HPI
        sw("hpi", Hpi, 0.95),
        sw("history of present illness", Hpi, 0.98),
        sw("history of presenting illness", Hpi, 0.95),
        sw("interval history", Hpi, 0.85),
        // PMH
        sw("pmh", Pmh, 0.95),
        sw("pmhx", Pmh, 0.9),
        sw("past medical history", Pmh, 0.98),
        sw("medical history", Pmh, 0.88),
        sw("past history", Pmh, 0.82),
        sw("problem list", Pmh, 0.8),
        // PSH
        sw("psh", Psh, 0.95),
        sw("pshx", Psh, 0.9),
        sw("past surgical history", Psh, 0.98),
        sw("surgical history", Psh, 0.92),
        // Family / social
        sw("family history", FamilyHistory, 0.95),
        sw("fhx", FamilyHistory, 0.88),
        sw("fh", FamilyHistory, 0.78),
        sw("social history", SocialHistory, 0.95),
        sw("shx", SocialHistory, 0.88),
        sw("sh", SocialHistory, 0.72),
        // ROS
        sw("ros", Ros, 0.95),
        sw("review of systems", Ros, 0.98),
        sw("systems review", Ros, 0.85),
        // Medications
        sw("medications", Medications, 0.95),
        sw("meds", Medications, 0.9),
        sw("current medications", Medications, 0.95),
        sw("home medications", Medications, 0.93),
        sw("medication list", Medications, 0.93),
        sw("outpatient medications", Medications, 0.9),
        // Allergies
        sw("allergies", Allergies, 0.95),
        sw("allergy", Allergies, 0.88),
        sw("drug allergies", Allergies, 0.95),
        // Objective / exam
        sw("objective", Objective, 0.95),
        sw("physical exam", Objective, 0.95),
        sw("physical examination", Objective, 0.95),
        sw("examination", Objective, 0.88),
        sw("exam", Objective, 0.85),
        sw("pe", Objective, 0.72),
        // Vitals
        sw("vitals", Vitals, 0.95),
        sw("vital signs", Vitals, 0.98),
        sw("vs", Vitals, 0.78),
        // Labs
        sw("labs", Labs, 0.95),
        sw("lab results", Labs, 0.95),
        sw("laboratory", Labs, 0.88),
        sw("laboratory data", Labs, 0.92),
        sw("lab data", Labs, 0.9),
        // Imaging
        sw("imaging", Imaging, 0.95),
        sw("imaging studies", Imaging, 0.93),
        sw("radiology", Imaging, 0.9),
        sw("studies", Imaging, 0.7),
        sw("echo", Imaging, 0.72),
        sw("cxr", Imaging, 0.75),
        // Assessment
        sw("assessment", Assessment, 0.95),
        sw("impression", Assessment, 0.93),
        sw("clinical impression", Assessment, 0.93),
        sw("diagnosis", Assessment, 0.85),
        sw("diagnoses", Assessment, 0.85),
        // Combined assessment+plan
        sw_combined("a/p", 0.92),
        sw_combined("a&p", 0.92),
        sw_combined("assessment and plan", 0.94),
        sw_combined("assessment/plan", 0.93),
        sw_combined("impression and plan", 0.92),
        // Plan
        sw("plan", SectionTag::Plan, 0.95),
        sw("recommendations", SectionTag::Plan, 0.9),
        sw("treatment plan", SectionTag::Plan, 0.93),
        sw("disposition", SectionTag::Plan, 0.8),
        sw("follow up", SectionTag::Plan, 0.75),
    ]
});

// =============================================================================
// BODY-SAMPLE HINTS
// =============================================================================

static BP_HINT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{2,3}\s*/\s*\d{2,3}\b").expect("invalid BP_HINT_RE"));

static LAB_HINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[a-z][a-z0-9 ]{1,20}:\s*[<>]?\d+(?:\.\d+)?\s*(?:mg/dL|ng/mL|mEq/L|mmol/L|U/L|%|K/uL|g/dL)")
        .expect("invalid LAB_HINT_RE")
});

static MED_HINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b\d+(?:\.\d+)?\s*(?:mg|mcg|g|units?)\b").expect("invalid MED_HINT_RE")
});

fn body_boost(tag: SectionTag, body: &str) -> f64 {
    match tag {
        SectionTag::Vitals if BP_HINT_RE.is_match(body) => 0.05,
        SectionTag::Labs if LAB_HINT_RE.is_match(body) => 0.05,
        SectionTag::Medications if MED_HINT_RE.is_match(body) => 0.05,
        _ => 0.0,
    }
}

// =============================================================================
// SCORING
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeaderMatch {
    pub tag: SectionTag,
    pub score: f64,
    /// True for A/P-style combined headers; the body carries both sides.
    pub combined_plan: bool,
}

/// Lowercase and strip punctuation, keeping `/` and `&` so acronyms like
/// `A/P` survive.
fn normalize_header(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.trim().chars() {
        let c = ch.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() || c == '/' || c == '&' {
            out.push(c);
        } else if c == ' ' || c == '\t' || c == '-' {
            if !out.ends_with(' ') {
                out.push(' ');
            }
        }
        // Other punctuation (':', '#', '.', digits prefixes) is dropped.
    }
    out.trim().to_string()
}

fn tokens(s: &str) -> Vec<&str> {
    s.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Score a candidate header string against the SIGNAL_WORDS table.
///
/// Ties break on (1) phrase specificity (more tokens), then (2) the
/// lexicographically smaller canonical label, so results are stable.
pub fn score_match(header_text: &str, body_sample: Option<&str>) -> Option<HeaderMatch> {
    let norm = normalize_header(header_text);
    if norm.is_empty() {
        return None;
    }
    let header_tokens = tokens(&norm);

    let mut best: Option<(HeaderMatch, usize)> = None;

    for entry in SIGNAL_WORDS.iter() {
        let base = if norm == entry.phrase {
            Some(entry.weight.max(0.9))
        } else {
            subset_score(&header_tokens, entry)
        };
        let Some(mut score) = base else { continue };

        if let Some(body) = body_sample {
            score += body_boost(entry.tag, body);
        }
        score = score.min(0.99);

        let phrase_specificity = tokens(entry.phrase).len();
        let candidate = (
            HeaderMatch {
                tag: entry.tag,
                score,
                combined_plan: entry.combined,
            },
            phrase_specificity,
        );

        best = Some(match best {
            None => candidate,
            Some(current) => pick_better(current, candidate),
        });
    }

    best.map(|(m, _)| m)
}

fn subset_score(header_tokens: &[&str], entry: &SignalWord) -> Option<f64> {
    let phrase_tokens = tokens(entry.phrase);
    if phrase_tokens.len() < 2 && header_tokens.len() < 2 {
        // Single-token lookups must match exactly; "a" vs "a/p" is noise.
        return None;
    }
    let matched = header_tokens
        .iter()
        .filter(|t| phrase_tokens.contains(t))
        .count();
    if matched == 0 {
        return None;
    }
    let coverage = matched as f64 / header_tokens.len().max(phrase_tokens.len()) as f64;
    if coverage < 0.34 {
        return None;
    }
    Some((0.6 + coverage * 0.29).min(0.89))
}

fn pick_better(
    a: (HeaderMatch, usize),
    b: (HeaderMatch, usize),
) -> (HeaderMatch, usize) {
    if (b.0.score - a.0.score).abs() > 1e-9 {
        return if b.0.score > a.0.score { b } else { a };
    }
    if b.1 != a.1 {
        return if b.1 > a.1 { b } else { a };
    }
    if b.0.tag.canonical_label() < a.0.tag.canonical_label() {
        b
    } else {
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_scores_high() {
        let m = score_match("Assessment:", None).unwrap();
        assert_eq!(m.tag, SectionTag::Assessment);
        assert!(m.score >= 0.9);
    }

    #[test]
    fn test_hpi_acronym() {
        let m = score_match("HPI", None).unwrap();
        assert_eq!(m.tag, SectionTag::Hpi);
        assert!(m.score >= 0.9);
    }

    #[test]
    fn test_combined_assessment_plan() {
        for header in ["A/P:", "A&P", "Assessment and Plan:"] {
            let m = score_match(header, None).unwrap();
            assert_eq!(m.tag, SectionTag::Assessment, "{header}");
            assert!(m.combined_plan, "{header}");
        }
    }

    #[test]
    fn test_token_subset_scales() {
        let m = score_match("Current Home Medications", None).unwrap();
        assert_eq!(m.tag, SectionTag::Medications);
        assert!(m.score >= 0.6 && m.score < 0.9, "score {}", m.score);
    }

    #[test]
    fn test_impression_maps_to_assessment() {
        let m = score_match("Impression", None).unwrap();
        assert_eq!(m.tag, SectionTag::Assessment);
    }

    #[test]
    fn test_body_sample_boosts_vitals() {
        let plain = score_match("VS", None).unwrap();
        let boosted = score_match("VS", Some("BP 150/90 HR 88")).unwrap();
        assert_eq!(boosted.tag, SectionTag::Vitals);
        assert!(boosted.score > plain.score);
    }

    #[test]
    fn test_gibberish_is_none() {
        assert!(score_match("qwertyuiop", None).is_none());
        assert!(score_match("", None).is_none());
    }

    #[test]
    fn test_all_caps_headers() {
        let m = score_match("VITALS:", None).unwrap();
        assert_eq!(m.tag, SectionTag::Vitals);
        assert!(m.score >= 0.9);
    }
}
