//! Section detection: splits normalized text into canonical sections using
//! header scoring plus line heuristics, with positional fallbacks for notes
//! that never label their Assessment or Plan.
//!
//! Every line of `cleaned` lands in exactly one place: a section's header,
//! a section's body, or `unknown_text`. Nothing is dropped or double-counted.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::headers::{self, HeaderMatch};
use crate::normalize::NormalizedText;
use crate::types::{Section, SectionTag};

#[derive(Debug, Clone)]
pub struct DetectedSections {
    pub sections: BTreeMap<SectionTag, Section>,
    pub unknown_text: Vec<String>,
    /// Weighted mean of accepted header scores (weight = body length).
    pub confidence: f64,
    /// False when the note had no scoreable headers (inline-only note).
    pub synthetic: bool,
}

// =============================================================================
// LINE CLASSIFICATION
// =============================================================================

const MAX_HEADER_LEN: usize = 44;
const MAX_HEADER_TOKENS: usize = 5;

static BULLET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*\u{2022}]|\d{1,2}[.)])\s+").expect("invalid BULLET_RE"));

static IMPERATIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:start|begin|initiate|continue|resume|stop|hold|discontinue|order|check|obtain|repeat|trend|monitor|give|administer|titrate|increase|decrease|consult|admit|discharge|follow|recheck|schedule|arrange|defer|consider)\b",
    )
    .expect("invalid IMPERATIVE_RE")
});

static DX_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:likely|consistent with|concerning for|suspect|hypertension|hypotension|failure|infarction|ischemia|angina|fibrillation|flutter|tachycardia|bradycardia|cardiomyopathy|stenosis|regurgitation|embolism|exacerbation|syndrome|emergency)\b",
    )
    .expect("invalid DX_TOKEN_RE")
});

fn is_bullet(line: &str) -> bool {
    BULLET_RE.is_match(line)
}

fn is_imperative(text: &str) -> bool {
    IMPERATIVE_RE.is_match(text.trim_start())
}

fn token_count(s: &str) -> usize {
    s.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .count()
}

fn is_all_caps(s: &str) -> bool {
    let mut saw_alpha = false;
    for c in s.chars() {
        if c.is_ascii_alphabetic() {
            saw_alpha = true;
            if c.is_ascii_lowercase() {
                return false;
            }
        }
    }
    saw_alpha
}

fn is_title_cased(s: &str) -> bool {
    let mut saw_word = false;
    for word in s.split_whitespace() {
        let Some(first) = word.chars().find(|c| c.is_ascii_alphabetic()) else {
            continue;
        };
        saw_word = true;
        if first.is_ascii_lowercase() && !matches!(word, "of" | "for" | "and" | "the") {
            return false;
        }
    }
    saw_word
}

/// Candidate header split: `(header_including_colon, rest_after_colon)`.
/// `rest` is empty for whole-line headers.
fn header_candidate(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || is_bullet(line) {
        return None;
    }

    if let Some(colon) = line.find(':') {
        let prefix = &line[..colon];
        let p = prefix.trim();
        if !p.is_empty() && p.len() <= MAX_HEADER_LEN && token_count(p) <= MAX_HEADER_TOKENS {
            return Some((&line[..colon + 1], &line[colon + 1..]));
        }
        return None;
    }

    if trimmed.len() <= MAX_HEADER_LEN
        && token_count(trimmed) <= MAX_HEADER_TOKENS
        && (is_all_caps(trimmed) || is_title_cased(trimmed))
    {
        return Some((line, ""));
    }
    None
}

// =============================================================================
// DETECTION
// =============================================================================

struct Block {
    m: HeaderMatch,
    header_text: String,
    /// Body fragments in line order; `rest` after an inline header comes
    /// first.
    fragments: Vec<String>,
}

enum Run {
    Block(Block),
    Unknown(Vec<String>),
}

/// Detect canonical sections. Header candidates are scored, weak scores
/// degrade to body, combined A/P blocks split post-hoc, and missing
/// Assessment/Plan fall back to positional heuristics.
pub fn detect_sections(n: &NormalizedText) -> DetectedSections {
    let mut runs: Vec<Run> = Vec::new();
    let mut current_score: Option<f64> = None;

    for (idx, line) in n.lines.iter().enumerate() {
        let text = line.text.as_str();
        if text.is_empty() {
            push_body(&mut runs, String::new());
            continue;
        }

        // Block headers score against their first body line.
        let next_line = n.lines[idx + 1..]
            .iter()
            .map(|l| l.text.as_str())
            .find(|t| !t.trim().is_empty());
        let candidate = header_candidate(text).and_then(|(header, rest)| {
            let body_sample = if rest.trim().is_empty() { next_line } else { Some(rest) };
            headers::score_match(header, body_sample).map(|m| (header, rest, m))
        });

        match candidate {
            Some((header, rest, m)) if m.score >= 0.5 && accepts(current_score, m.score) => {
                current_score = Some(m.score);
                let mut fragments = Vec::new();
                if !rest.is_empty() {
                    fragments.push(rest.to_string());
                }
                runs.push(Run::Block(Block {
                    m,
                    header_text: header.to_string(),
                    fragments,
                }));
            }
            _ => push_body(&mut runs, text.to_string()),
        }
    }

    let mut blocks: Vec<Block> = Vec::new();
    let mut unknown_runs: Vec<Vec<String>> = Vec::new();
    for run in runs {
        match run {
            Run::Block(b) => blocks.push(b),
            Run::Unknown(lines) => unknown_runs.push(lines),
        }
    }

    let mut split: Vec<Block> = Vec::new();
    for block in blocks {
        if block.m.combined_plan {
            let (assessment, plan) = split_combined(block);
            split.push(assessment);
            if let Some(p) = plan {
                split.push(p);
            }
        } else {
            split.push(block);
        }
    }

    apply_positional_fallbacks(&mut split, &mut unknown_runs);

    if split.is_empty() {
        return synthetic_subjective(n);
    }

    let mut sections: BTreeMap<SectionTag, Section> = BTreeMap::new();
    let mut weight_sum = 0.0;
    let mut score_sum = 0.0;
    for block in split {
        let body = join_fragments(&block.fragments);
        let weight = body.len().max(1) as f64;
        weight_sum += weight;
        score_sum += block.m.score * weight;

        match sections.get_mut(&block.m.tag) {
            Some(existing) => {
                if !body.trim().is_empty() {
                    if !existing.raw_text.is_empty() {
                        existing.raw_text.push('\n');
                    }
                    existing.raw_text.push_str(&body);
                }
                existing.confidence = existing.confidence.max(block.m.score);
            }
            None => {
                sections.insert(
                    block.m.tag,
                    Section {
                        tag: block.m.tag,
                        raw_text: body,
                        confidence: block.m.score,
                        source_header_text: if block.header_text.is_empty() {
                            None
                        } else {
                            Some(block.header_text)
                        },
                    },
                );
            }
        }
    }

    let unknown_text: Vec<String> = unknown_runs
        .into_iter()
        .map(|lines| join_fragments(&lines))
        .filter(|t| !t.trim().is_empty())
        .collect();

    DetectedSections {
        sections,
        unknown_text,
        confidence: if weight_sum > 0.0 { score_sum / weight_sum } else { 0.0 },
        synthetic: false,
    }
}

fn accepts(current: Option<f64>, score: f64) -> bool {
    match current {
        None => true,
        Some(cur) => score >= cur - 0.1,
    }
}

fn push_body(runs: &mut Vec<Run>, text: String) {
    match runs.last_mut() {
        Some(Run::Block(b)) => b.fragments.push(text),
        Some(Run::Unknown(lines)) => lines.push(text),
        None => runs.push(Run::Unknown(vec![text])),
    }
}

fn join_fragments(fragments: &[String]) -> String {
    let mut out = fragments.join("\n");
    while out.starts_with('\n') {
        out.remove(0);
    }
    while out.ends_with('\n') {
        out.pop();
    }
    out
}

// =============================================================================
// COMBINED A/P SPLIT
// =============================================================================

/// Partition a combined A/P body: bulleted or imperative lines (and
/// imperative trailing sentences within a line) go to Plan, the rest stays
/// with Assessment.
fn split_combined(block: Block) -> (Block, Option<Block>) {
    let mut assessment: Vec<String> = Vec::new();
    let mut plan: Vec<String> = Vec::new();

    for fragment in &block.fragments {
        if fragment.trim().is_empty() {
            assessment.push(fragment.clone());
            continue;
        }
        if is_bullet(fragment) || is_imperative(fragment) {
            plan.push(fragment.clone());
            continue;
        }
        match plan_sentence_boundary(fragment) {
            Some(idx) if idx > 0 => {
                assessment.push(fragment[..idx].to_string());
                plan.push(fragment[idx..].to_string());
            }
            Some(_) => plan.push(fragment.clone()),
            None => assessment.push(fragment.clone()),
        }
    }

    let a = Block {
        m: HeaderMatch {
            tag: SectionTag::Assessment,
            score: block.m.score,
            combined_plan: false,
        },
        header_text: block.header_text.clone(),
        fragments: assessment,
    };
    let p = if plan.iter().any(|l| !l.trim().is_empty()) {
        Some(Block {
            m: HeaderMatch {
                tag: SectionTag::Plan,
                score: block.m.score,
                combined_plan: false,
            },
            header_text: String::new(),
            fragments: plan,
        })
    } else {
        None
    };
    (a, p)
}

/// Byte offset of the first imperative sentence within `line`, if any.
fn plan_sentence_boundary(line: &str) -> Option<usize> {
    let mut start = 0usize;
    let bytes = line.as_bytes();
    loop {
        let sentence = &line[start..];
        if is_imperative(sentence) {
            return Some(start);
        }
        // Advance past the next sentence terminator followed by whitespace.
        let mut next = None;
        for (i, b) in sentence.bytes().enumerate() {
            if (b == b'.' || b == b';') && start + i + 1 < bytes.len() {
                let after = bytes[start + i + 1];
                if after == b' ' || after == b'\t' {
                    let mut j = start + i + 1;
                    while j < bytes.len() && (bytes[j] == b' ' || bytes[j] == b'\t') {
                        j += 1;
                    }
                    if j < bytes.len() {
                        next = Some(j);
                    }
                    break;
                }
            }
        }
        match next {
            Some(j) => start = j,
            None => return None,
        }
    }
}

// =============================================================================
// POSITIONAL FALLBACKS
// =============================================================================

/// If no Assessment was found, promote the last unknown prose run with
/// diagnosis-like tokens. If no Plan, collect trailing imperative or
/// bulleted unknown lines.
fn apply_positional_fallbacks(blocks: &mut Vec<Block>, unknown_runs: &mut Vec<Vec<String>>) {
    let has_assessment = blocks.iter().any(|b| b.m.tag == SectionTag::Assessment);
    let has_plan = blocks.iter().any(|b| b.m.tag == SectionTag::Plan);

    if !has_assessment {
        let promote = unknown_runs
            .iter()
            .rposition(|lines| lines.iter().any(|l| DX_TOKEN_RE.is_match(l)));
        let lines = match promote {
            Some(idx) => Some(unknown_runs.remove(idx)),
            // No unknown run qualified; try the trailing paragraph of the
            // last non-Plan section body.
            None => blocks
                .iter_mut()
                .rev()
                .find(|b| b.m.tag != SectionTag::Plan)
                .and_then(take_trailing_dx_paragraph),
        };
        if let Some(lines) = lines {
            blocks.push(Block {
                m: HeaderMatch {
                    tag: SectionTag::Assessment,
                    score: 0.4,
                    combined_plan: false,
                },
                header_text: String::new(),
                fragments: lines,
            });
        }
    }

    if !has_plan {
        // Imperative/bulleted lines in the final unknown run read as a plan.
        if let Some(last) = unknown_runs.last_mut() {
            let plan_lines: Vec<String> = last
                .iter()
                .filter(|l| is_bullet(l) || is_imperative(l))
                .cloned()
                .collect();
            if !plan_lines.is_empty() && plan_lines.len() == last.iter().filter(|l| !l.trim().is_empty()).count() {
                last.clear();
                blocks.push(Block {
                    m: HeaderMatch {
                        tag: SectionTag::Plan,
                        score: 0.4,
                        combined_plan: false,
                    },
                    header_text: String::new(),
                    fragments: plan_lines,
                });
            }
        }
        unknown_runs.retain(|r| !r.is_empty());
    }
}

/// Detach the trailing blank-line-separated paragraph of a block when it
/// carries diagnosis-like tokens and is not the whole body.
fn take_trailing_dx_paragraph(block: &mut Block) -> Option<Vec<String>> {
    let para_start = block
        .fragments
        .iter()
        .rposition(|l| l.trim().is_empty())
        .map(|i| i + 1)?;
    if para_start >= block.fragments.len() {
        return None;
    }
    let paragraph = &block.fragments[para_start..];
    if !paragraph.iter().any(|l| DX_TOKEN_RE.is_match(l)) {
        return None;
    }
    let taken: Vec<String> = block.fragments.split_off(para_start);
    // Drop the now-trailing separator blank from the donor body.
    while block
        .fragments
        .last()
        .is_some_and(|l| l.trim().is_empty())
    {
        block.fragments.pop();
    }
    Some(taken)
}

/// Inline-only note: one synthetic Subjective holding the whole cleaned
/// text so nothing is lost; extraction runs over the full text anyway.
fn synthetic_subjective(n: &NormalizedText) -> DetectedSections {
    let mut sections = BTreeMap::new();
    if !n.cleaned.trim().is_empty() {
        sections.insert(
            SectionTag::Subjective,
            Section {
                tag: SectionTag::Subjective,
                raw_text: n.cleaned.clone(),
                confidence: 0.3,
                source_header_text: None,
            },
        );
    }
    DetectedSections {
        sections,
        unknown_text: Vec::new(),
        confidence: if n.cleaned.trim().is_empty() { 0.0 } else { 0.3 },
        synthetic: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    fn detect(text: &str) -> DetectedSections {
        detect_sections(&normalize(text))
    }

    #[test]
    fn test_basic_soap() {
        let d = detect(
            "Chief Complaint: Chest pain\nHPI: 65yo M with HTN, 2h chest pain\nVitals:\nBP: 150/90\nHR: 88\nAssessment:\n1. Chest pain, likely angina\nPlan:\n- EKG\n- Troponin\n",
        );
        assert!(d.sections.contains_key(&SectionTag::Subjective));
        assert!(d.sections.contains_key(&SectionTag::Hpi));
        assert!(d.sections.contains_key(&SectionTag::Vitals));
        assert!(d.sections.contains_key(&SectionTag::Assessment));
        assert!(d.sections.contains_key(&SectionTag::Plan));
        let vitals = &d.sections[&SectionTag::Vitals];
        assert!(vitals.raw_text.contains("BP: 150/90"));
        assert!(vitals.raw_text.contains("HR: 88"));
    }

    #[test]
    fn test_out_of_order_synonyms() {
        let d = detect(
            "Plan: continue aspirin\nImpression: heart failure exacerbation\nExam: HR 110 BP 90/60\nHPI: dyspnea for 3 days\n",
        );
        assert!(d.sections.contains_key(&SectionTag::Plan));
        assert!(d.sections.contains_key(&SectionTag::Assessment));
        assert!(d.sections.contains_key(&SectionTag::Objective));
        assert!(d.sections.contains_key(&SectionTag::Hpi));
        assert!(d.sections[&SectionTag::Assessment]
            .raw_text
            .contains("heart failure exacerbation"));
    }

    #[test]
    fn test_combined_ap_splits_imperative_sentence() {
        let d = detect("HPI: PATIENT WITH HEADACHE\nA/P: HYPERTENSIVE EMERGENCY. START CLONIDINE.");
        let assessment = &d.sections[&SectionTag::Assessment];
        assert!(assessment.raw_text.contains("HYPERTENSIVE EMERGENCY"));
        let plan = &d.sections[&SectionTag::Plan];
        assert!(plan.raw_text.contains("START CLONIDINE"));
    }

    #[test]
    fn test_admin_lines_stay_unknown() {
        let d = detect("Date: 08/27/2025\nPatient: John Doe\nMRN: 12345\nLabs:\nTroponin: 0.04 ng/mL\n");
        assert!(d.sections.contains_key(&SectionTag::Labs));
        let joined = d.unknown_text.join("\n");
        assert!(joined.contains("Patient: John Doe"));
        assert!(joined.contains("MRN: 12345"));
    }

    #[test]
    fn test_weak_header_degrades_to_body() {
        let d = detect("HPI: fell at home\nShe said: it hurts\nmore body text\n");
        let hpi = &d.sections[&SectionTag::Hpi];
        assert!(hpi.raw_text.contains("She said: it hurts"));
    }

    #[test]
    fn test_inline_only_note_synthesizes_subjective() {
        let d = detect("72 yo M with chest pain, BP 150/90, HR 95, on aspirin.");
        assert!(d.synthetic);
        assert!(d.sections.contains_key(&SectionTag::Subjective));
        assert_eq!(d.sections.len(), 1);
    }

    #[test]
    fn test_positional_assessment_fallback() {
        let d = detect(
            "HPI: chest pain overnight\nSeen and examined.\n\nFindings most consistent with unstable angina, likely progressing.\n",
        );
        assert!(d.sections.contains_key(&SectionTag::Assessment));
        assert!(d.sections[&SectionTag::Assessment]
            .raw_text
            .contains("unstable angina"));
    }

    #[test]
    fn test_duplicate_sections_merge() {
        let d = detect("Labs: Troponin: 0.04\nHPI: pain\nLabs: BNP: 500\n");
        let labs = &d.sections[&SectionTag::Labs];
        assert!(labs.raw_text.contains("Troponin"));
        assert!(labs.raw_text.contains("BNP"));
        assert_eq!(d.sections.values().filter(|s| s.tag == SectionTag::Labs).count(), 1);
    }

    #[test]
    fn test_every_line_lands_somewhere() {
        let input = "Random preamble line\nHPI: some history\nbody line\nVITALS\nBP 120/80\nclosing remark: too long to be a header because it keeps going on and on and on\n";
        let n = normalize(input);
        let d = detect_sections(&n);

        let mut mass: usize = 0;
        for s in d.sections.values() {
            mass += s.raw_text.len();
            if let Some(h) = &s.source_header_text {
                mass += h.len();
            }
        }
        for u in &d.unknown_text {
            mass += u.len();
        }
        let newline_count = n.cleaned.matches('\n').count();
        // Bodies/unknown join lines with '\n'; allow exactly the newline mass.
        assert!(mass >= n.cleaned.len() - newline_count);
        assert!(mass <= n.cleaned.len());
    }
}
