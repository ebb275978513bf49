//! Patient demographics: age/gender phrases and labeled MRN/DOB fields.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::normalize::extract_dates;
use crate::types::{Gender, Patient};

static AGE_GENDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,3})[ \t-]*(?:yo|y/o|y\.o\.|yr old|year[- ]old|years[- ]old)[ \t]*(male|female|man|woman|gentleman|lady|m\b|f\b)?",
    )
    .expect("invalid AGE_GENDER_RE")
});

static GENDER_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:sex|gender)\s*[:=]\s*(male|female|m|f)\b").expect("invalid GENDER_LABEL_RE")
});

static MRN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bMRN\s*[:#]?\s*([A-Za-z0-9\-]{3,20})\b").expect("invalid MRN_RE")
});

static DOB_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bDOB\s*[:#]?\s*").expect("invalid DOB_LABEL_RE"));

fn parse_gender(token: &str) -> Option<Gender> {
    match token.to_ascii_lowercase().as_str() {
        "m" | "male" | "man" | "gentleman" => Some(Gender::Male),
        "f" | "female" | "woman" | "lady" => Some(Gender::Female),
        _ => None,
    }
}

/// Extract demographics from the whole note. First match wins for each
/// field; later mentions never overwrite.
pub fn extract_demographics(text: &str) -> Patient {
    let mut patient = Patient::default();

    if let Some(caps) = AGE_GENDER_RE.captures(text) {
        patient.age = caps[1].parse::<u32>().ok().filter(|a| *a <= 130);
        patient.gender = caps.get(2).and_then(|m| parse_gender(m.as_str()));
    }

    if patient.gender.is_none() {
        if let Some(caps) = GENDER_LABEL_RE.captures(text) {
            patient.gender = parse_gender(&caps[1]);
        }
    }

    if let Some(caps) = MRN_RE.captures(text) {
        patient.mrn = Some(caps[1].to_string());
    }

    if let Some(label) = DOB_LABEL_RE.find(text) {
        // The date token immediately after the label, if any.
        let mut end = text.len().min(label.end() + 24);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let tail = &text[label.end()..end];
        if let Some(date) = extract_dates(tail).into_iter().find(|d| d.offset == 0) {
            patient.dob = Some(date.iso);
        }
    }

    patient
}
