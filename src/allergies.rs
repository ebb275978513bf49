//! Allergy extraction: explicit "no known allergies" markers and
//! substance/reaction pairs.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{Allergies, Allergy};

static NKDA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:nkda|nka|no known (?:drug |medication )?allergies|no allergies)\b")
        .expect("invalid NKDA_RE")
});

static ALLERGY_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:allergies|allergy|drug allergies)\s*:\s*").expect("invalid ALLERGY_LABEL_RE")
});

static BULLET_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[-*\u{2022}]\s+").expect("invalid BULLET_PREFIX_RE"));

/// `Substance (reaction)` or `Substance - reaction` or `Substance: reaction`.
static PAIR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z][A-Za-z0-9 \-]{1,40}?)\s*(?:\(([^)]{1,60})\)|-\s+([^,;]{1,60})|:\s*([^,;]{1,60}))?\s*$")
        .expect("invalid PAIR_RE")
});

/// Extract allergies. `in_section` means `text` is an Allergies section
/// body and every line is fair game; otherwise only lines carrying an
/// explicit allergy label are read, so prose stays quiet.
pub fn extract_allergies(text: &str, in_section: bool) -> Allergies {
    if NKDA_RE.is_match(text) {
        return Allergies {
            no_known: true,
            items: Vec::new(),
        };
    }

    let mut items: Vec<Allergy> = Vec::new();
    for line in text.split('\n') {
        let label = ALLERGY_LABEL_RE.find(line);
        if !in_section && label.is_none() {
            continue;
        }
        let after_label = label.map(|m| m.end()).unwrap_or(0);
        let content = BULLET_PREFIX_RE.replace(&line[after_label..], "");

        for item in content.split([',', ';']) {
            let item = item.trim();
            if item.is_empty() || item.eq_ignore_ascii_case("none") {
                continue;
            }
            let Some(caps) = PAIR_RE.captures(item) else { continue };
            let substance = caps[1].trim().to_string();
            if substance.is_empty() {
                continue;
            }
            let reaction = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str().trim().to_string())
                .filter(|r| !r.is_empty());
            items.push(Allergy { substance, reaction });
        }
    }

    Allergies {
        no_known: false,
        items,
    }
}
