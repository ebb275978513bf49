//! Text normalization: unicode folding, whitespace cleanup, line indexing,
//! and date-token extraction.
//!
//! Normalization is idempotent and never fails; OCR'd and pasted EHR text
//! goes through here before any other phase sees it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One line of `cleaned`, with its byte offset into `cleaned`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    pub text: String,
    pub offset: usize,
}

/// A recognized date with its ISO-8601 form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateToken {
    pub text: String,
    pub iso: String,
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedText {
    pub raw: String,
    pub cleaned: String,
    pub lines: Vec<Line>,
    pub dates: Vec<DateToken>,
}

// =============================================================================
// CHARACTER FOLDING
// =============================================================================

fn fold_char(ch: char) -> Option<char> {
    match ch {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => Some('\''),
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' => Some('"'),
        '\u{2013}' | '\u{2014}' | '\u{2015}' | '\u{2012}' | '\u{2212}' => Some('-'),
        '\u{00A0}' | '\u{202F}' | '\u{2007}' | '\u{2009}' => Some(' '),
        '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' => None,
        // C0 controls other than \n and \t are stripped. \r is handled by the
        // caller before folding.
        c if (c as u32) < 0x20 && c != '\n' && c != '\t' => None,
        '\u{007F}' => None,
        c => Some(c),
    }
}

/// Collapse interior runs of spaces/tabs to one space, preserving the
/// leading indentation run so bullet detection still sees it.
fn collapse_line_whitespace(line: &str) -> String {
    let lead_end = line
        .char_indices()
        .find(|(_, c)| *c != ' ' && *c != '\t')
        .map(|(i, _)| i)
        .unwrap_or(line.len());
    let (lead, rest) = line.split_at(lead_end);

    let mut out = String::with_capacity(line.len());
    out.push_str(lead);
    let mut in_ws = false;
    for ch in rest.chars() {
        if ch == ' ' || ch == '\t' {
            in_ws = true;
            continue;
        }
        if in_ws {
            out.push(' ');
            in_ws = false;
        }
        out.push(ch);
    }
    // Trailing whitespace is dropped (in_ws left pending).
    out
}

/// Normalize raw note text. Worst case the result is the input with only
/// whitespace collapsed; this function has no failure path.
pub fn normalize(raw: &str) -> NormalizedText {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");

    let mut folded = String::with_capacity(unified.len());
    for ch in unified.chars() {
        if let Some(c) = fold_char(ch) {
            folded.push(c);
        }
    }

    let mut out_lines: Vec<String> = Vec::new();
    let mut pending_blank = false;
    for line in folded.split('\n') {
        let collapsed = collapse_line_whitespace(line);
        if collapsed.trim().is_empty() {
            // Runs of blank lines collapse to one; leading blanks drop.
            if !out_lines.is_empty() {
                pending_blank = true;
            }
            continue;
        }
        if pending_blank {
            out_lines.push(String::new());
            pending_blank = false;
        }
        out_lines.push(collapsed);
    }

    let cleaned = out_lines.join("\n");

    let mut lines = Vec::with_capacity(out_lines.len());
    let mut offset = 0usize;
    for text in out_lines {
        let len = text.len();
        lines.push(Line { text, offset });
        offset += len + 1;
    }

    let dates = extract_dates(&cleaned);

    NormalizedText {
        raw: raw.to_string(),
        cleaned,
        lines,
        dates,
    }
}

// =============================================================================
// DATE TOKENS
// =============================================================================

static DATE_MDY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(0?[1-9]|1[0-2])/(0?[1-9]|[12]\d|3[01])/(\d{4}|\d{2})\b")
        .expect("invalid DATE_MDY_RE")
});

static DATE_ISO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{4})-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])\b").expect("invalid DATE_ISO_RE")
});

static DATE_MONTH_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|Jun(?:e)?|Jul(?:y)?|Aug(?:ust)?|Sep(?:tember)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)\.?\s+(\d{1,2}),?\s+(\d{4})\b",
    )
    .expect("invalid DATE_MONTH_NAME_RE")
});

fn month_number(name: &str) -> Option<u32> {
    let key = name.get(..3)?.to_ascii_lowercase();
    let n = match key.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(n)
}

fn expand_year(two_or_four: &str) -> u32 {
    match two_or_four.parse::<u32>() {
        Ok(y) if two_or_four.len() == 4 => y,
        Ok(y) if y < 50 => 2000 + y,
        Ok(y) => 1900 + y,
        Err(_) => 0,
    }
}

/// Recognize `MM/DD/YY(YY)`, `YYYY-MM-DD`, and `Mon DD, YYYY` tokens.
pub fn extract_dates(text: &str) -> Vec<DateToken> {
    let mut out: Vec<DateToken> = Vec::new();

    for m in DATE_ISO_RE.captures_iter(text) {
        let whole = m.get(0).expect("capture 0");
        out.push(DateToken {
            text: whole.as_str().to_string(),
            iso: whole.as_str().to_string(),
            offset: whole.start(),
        });
    }

    for m in DATE_MDY_RE.captures_iter(text) {
        let whole = m.get(0).expect("capture 0");
        let month: u32 = m[1].parse().unwrap_or(0);
        let day: u32 = m[2].parse().unwrap_or(0);
        let year = expand_year(&m[3]);
        out.push(DateToken {
            text: whole.as_str().to_string(),
            iso: format!("{year:04}-{month:02}-{day:02}"),
            offset: whole.start(),
        });
    }

    for m in DATE_MONTH_NAME_RE.captures_iter(text) {
        let whole = m.get(0).expect("capture 0");
        let Some(month) = month_number(&m[1]) else {
            continue;
        };
        let day: u32 = m[2].parse().unwrap_or(0);
        let year: u32 = m[3].parse().unwrap_or(0);
        out.push(DateToken {
            text: whole.as_str().to_string(),
            iso: format!("{year:04}-{month:02}-{day:02}"),
            offset: whole.start(),
        });
    }

    out.sort_by_key(|d| d.offset);
    out.dedup_by_key(|d| d.offset);
    out
}
