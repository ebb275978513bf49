//! Diagnosis candidate mining: allowlist-gated substring matching over
//! Assessment/HPI/ROS text with alias expansion, blocklist suppression,
//! and acuity inference from adjacent tokens.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{Acuity, Diagnosis, DxSource};

/// Shorthand the notes actually use, expanded to allowlist canonicals.
static DIAGNOSIS_ALIASES: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    vec![
        ("htn emergency", "hypertensive emergency"),
        ("hypertensive crisis", "hypertensive emergency"),
        ("afib with rvr", "atrial fibrillation"),
        ("a-fib", "atrial fibrillation"),
        ("afib", "atrial fibrillation"),
        ("a fib", "atrial fibrillation"),
        ("aflutter", "atrial flutter"),
        ("htn", "hypertension"),
        ("hld", "hyperlipidemia"),
        ("chf", "heart failure"),
        ("hfref", "heart failure"),
        ("hfpef", "heart failure"),
        ("adhf", "heart failure exacerbation"),
        ("hf exacerbation", "heart failure exacerbation"),
        ("cad", "coronary artery disease"),
        ("acs", "acute coronary syndrome"),
        ("mi", "myocardial infarction"),
        ("heart attack", "myocardial infarction"),
        ("dvt", "deep vein thrombosis"),
        ("pulm embolism", "pulmonary embolism"),
        ("svt", "supraventricular tachycardia"),
        ("wpw", "wolff-parkinson-white"),
    ]
});

static ACUTE_CUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:acute(?:ly)?|new[- ]onset|worsening|decompensated|exacerbation)\b")
        .expect("invalid ACUTE_CUE_RE")
});

static CHRONIC_CUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:chronic|stable|known|longstanding|long-standing|baseline|history of|hx of)\b")
        .expect("invalid CHRONIC_CUE_RE")
});

const ACUITY_WINDOW: usize = 30;

fn base_confidence(source: DxSource) -> f64 {
    match source {
        DxSource::Assessment => 0.9,
        DxSource::Hpi => 0.7,
        DxSource::Ros => 0.5,
    }
}

fn word_bounded(line: &str, start: usize, end: usize) -> bool {
    let before_ok = start == 0
        || !line[..start]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_alphanumeric());
    let after_ok = end == line.len()
        || !line[end..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric());
    before_ok && after_ok
}

fn acuity_near(line: &str, start: usize, end: usize) -> Acuity {
    let mut lo = start.saturating_sub(ACUITY_WINDOW);
    while !line.is_char_boundary(lo) {
        lo += 1;
    }
    let mut hi = (end + ACUITY_WINDOW).min(line.len());
    while !line.is_char_boundary(hi) {
        hi -= 1;
    }
    let window = &line[lo..hi];
    if ACUTE_CUE_RE.is_match(window) {
        Acuity::Acute
    } else if CHRONIC_CUE_RE.is_match(window) {
        Acuity::Chronic
    } else {
        Acuity::Unspecified
    }
}

fn blocked_near(line_lower: &str, start: usize, blocklist: &[String]) -> bool {
    let mut lo = start.saturating_sub(ACUITY_WINDOW);
    while !line_lower.is_char_boundary(lo) {
        lo += 1;
    }
    let prefix = &line_lower[lo..start];
    blocklist.iter().any(|p| !p.is_empty() && prefix.contains(p.as_str()))
}

/// Mine diagnosis candidates from `(source, text)` pairs. Matches are
/// longest-needle-first with overlap suppression per line.
pub fn extract_diagnoses(
    sources: &[(DxSource, &str)],
    allowlist: &[String],
    blocklist: &[String],
) -> Vec<Diagnosis> {
    // (needle, canonical) with needles lowercased, longest first.
    let mut needles: Vec<(String, String)> = allowlist
        .iter()
        .map(|t| (t.to_ascii_lowercase(), t.to_ascii_lowercase()))
        .collect();
    for (alias, canonical) in DIAGNOSIS_ALIASES.iter() {
        if allowlist
            .iter()
            .any(|t| t.eq_ignore_ascii_case(canonical))
        {
            needles.push((alias.to_string(), canonical.to_string()));
        }
    }
    needles.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
    needles.dedup_by(|a, b| a.0 == b.0);

    let block_lower: Vec<String> = blocklist.iter().map(|b| b.to_ascii_lowercase()).collect();

    let mut out: Vec<Diagnosis> = Vec::new();
    for (source, text) in sources {
        for line in text.split('\n') {
            let line_lower = line.to_ascii_lowercase();
            let mut taken: Vec<(usize, usize)> = Vec::new();

            for (needle, canonical) in &needles {
                let mut from = 0usize;
                while let Some(rel) = line_lower[from..].find(needle.as_str()) {
                    let start = from + rel;
                    let end = start + needle.len();
                    from = end;

                    if !word_bounded(&line_lower, start, end) {
                        continue;
                    }
                    if taken.iter().any(|&(s, e)| start < e && s < end) {
                        continue;
                    }
                    if blocked_near(&line_lower, start, &block_lower) {
                        continue;
                    }
                    taken.push((start, end));

                    out.push(Diagnosis {
                        text: line[start..end].to_string(),
                        canonical: canonical.clone(),
                        acuity: acuity_near(line, start, end),
                        confidence: base_confidence(*source),
                        source: *source,
                    });
                }
            }
        }
    }
    out
}
