//! Clinical context markers: temporal, severity, causality, and negation
//! cues bound to a nearby entity phrase within a bounded window.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{ContextKind, ContextMarker};

/// Maximum characters between a cue and the phrase it binds to.
const BIND_WINDOW: usize = 60;

static TEMPORAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(acute|chronic|subacute|new[- ]onset|worsening|stable|improving|resolving|recurrent|progressive)\b",
    )
    .expect("invalid TEMPORAL_RE")
});

static SEVERITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(mild|moderate|severe|critical)\b").expect("invalid SEVERITY_RE")
});

static CAUSALITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(due to|secondary to|because of|attributable to|caused by)\b")
        .expect("invalid CAUSALITY_RE")
});

static NEGATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(no|denies|denied|without|negative for|not)\b").expect("invalid NEGATION_RE")
});

/// Forward phrase after `from`, truncated at the bind window and at
/// sentence/clause boundaries.
fn forward_phrase(text: &str, from: usize) -> (String, usize) {
    let slice = &text[from..];
    let mut end = slice.len().min(BIND_WINDOW);
    while !slice.is_char_boundary(end) {
        end -= 1;
    }
    let mut limit = end;
    for (i, ch) in slice.char_indices() {
        if i >= end {
            break;
        }
        if matches!(ch, '.' | ';' | ',' | '\n' | ':') {
            limit = i;
            break;
        }
    }
    let phrase = slice[..limit].trim();
    (phrase.to_string(), from + limit)
}

/// Backward phrase ending at `to`, truncated at the window and boundaries.
fn backward_phrase(text: &str, to: usize) -> String {
    let start_floor = to.saturating_sub(BIND_WINDOW);
    let mut start = start_floor;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    let slice = &text[start..to];
    let phrase = match slice.rfind(['.', ';', ',', '\n', ':']) {
        Some(i) => &slice[i + 1..],
        None => slice,
    };
    phrase.trim().to_string()
}

fn scan(
    text: &str,
    re: &Regex,
    kind: ContextKind,
    allow_backward: bool,
    out: &mut Vec<ContextMarker>,
) {
    for caps in re.captures_iter(text) {
        let cue = caps.get(1).expect("capture 1");
        let (mut entity, mut span_end) = forward_phrase(text, cue.end());
        if entity.is_empty() && allow_backward {
            entity = backward_phrase(text, cue.start());
            span_end = cue.end();
        }
        if entity.is_empty() {
            continue;
        }
        out.push(ContextMarker {
            kind,
            entity,
            modifier: cue.as_str().to_string(),
            span_start: cue.start(),
            span_end,
        });
    }
}

/// Extract all context markers from `text`, in cue-kind then offset order.
pub fn extract_context(text: &str) -> Vec<ContextMarker> {
    let mut out: Vec<ContextMarker> = Vec::new();
    scan(text, &TEMPORAL_RE, ContextKind::Temporal, true, &mut out);
    scan(text, &SEVERITY_RE, ContextKind::Severity, true, &mut out);
    scan(text, &CAUSALITY_RE, ContextKind::Causality, false, &mut out);
    scan(text, &NEGATION_RE, ContextKind::Negation, false, &mut out);
    out.sort_by_key(|m| (m.span_start, m.span_end));
    out
}

/// True when `stem` is inside any negation marker's bound phrase.
pub fn is_negated(markers: &[ContextMarker], stem: &str) -> bool {
    let needle = stem.to_ascii_lowercase();
    markers
        .iter()
        .filter(|m| m.kind == ContextKind::Negation)
        .any(|m| m.entity.to_ascii_lowercase().contains(&needle))
}
