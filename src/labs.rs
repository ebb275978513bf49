//! Lab extraction: allowlist-gated name/value parsing with combo splits,
//! comparators, explicit flags, and reference ranges.
//!
//! Admin lines (`Date:`, `Patient:`, `MRN:` ...) are excluded up front;
//! everything else must resolve to a `labs_reference` alias to survive.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::refdata::ReferenceData;
use crate::types::{CmpOp, Lab, LabFlag, LabValue};
use crate::vitals::{parse_num_ocr, Span};

// =============================================================================
// PATTERNS
// =============================================================================

static ADMIN_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:date|time|patient|mrn|name|dob|account|acct|room|bed|provider|physician|visit)\s*[:#]")
        .expect("invalid ADMIN_LINE_RE")
});

static LABS_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:labs?|lab results|laboratory(?: data)?)\s*:\s*")
        .expect("invalid LABS_LABEL_RE")
});

/// `NAME1/NAME2: v1/v2 UNIT` becomes two results sharing one unit.
static COMBO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b([A-Za-z][A-Za-z \-]{0,18}?)\s*/\s*([A-Za-z][A-Za-z \-]{0,18}?)\s*:\s*([<>]?\d+(?:\.\d+)?)\s*/\s*([<>]?\d+(?:\.\d+)?)\s*([A-Za-z%][A-Za-z/%^0-9]*)?",
    )
    .expect("invalid COMBO_RE")
});

/// `name [: or whitespace] [<>] value [- value2] rest`
static ITEM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*([A-Za-z][A-Za-z0-9 +\-]{0,30}?)\s*(?::|=|\s)\s*([<>]?)\s*(\d+(?:\.\d+)?)(?:\s*-\s*(\d+(?:\.\d+)?))?(.*)$",
    )
    .expect("invalid ITEM_RE")
});

static REF_RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:[\(\[]\s*|\brange\s+)(\d+(?:\.\d+)?)\s*-\s*(\d+(?:\.\d+)?)\s*[\)\]]?")
        .expect("invalid REF_RANGE_RE")
});

static FLAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\s)(HH|LL|H|L|High|Low|Crit(?:ical)?)(?:\s|$)|(\*|\u{2191}|\u{2193})")
        .expect("invalid FLAG_RE")
});

static UNIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z%][A-Za-z/%^0-9]*)").expect("invalid UNIT_RE")
});

fn parse_flag(token: &str) -> LabFlag {
    match token {
        "H" | "High" | "\u{2191}" => LabFlag::High,
        "L" | "Low" | "\u{2193}" => LabFlag::Low,
        "HH" | "LL" | "Crit" | "Critical" => LabFlag::Critical,
        "*" => LabFlag::Star,
        _ => LabFlag::None,
    }
}

/// Flag from the reference range when the note carries no explicit flag.
fn range_flag(value: &LabValue, entry: Option<&crate::refdata::LabRef>) -> LabFlag {
    let Some(entry) = entry else { return LabFlag::None };
    let v = value.magnitude();
    if let Some(cl) = entry.critical_low {
        if v < cl {
            return LabFlag::Critical;
        }
    }
    if let Some(ch) = entry.critical_high {
        if v > ch {
            return LabFlag::Critical;
        }
    }
    if let Some(low) = entry.low {
        if v < low {
            return LabFlag::Low;
        }
    }
    if let Some(high) = entry.high {
        if v > high {
            return LabFlag::High;
        }
    }
    LabFlag::None
}

// =============================================================================
// EXTRACTION
// =============================================================================

/// Extract labs from `text`. Line-oriented; spans are line-granular.
pub fn extract_labs(text: &str, refdata: &ReferenceData) -> (Vec<Lab>, Vec<Span>) {
    let mut labs: Vec<Lab> = Vec::new();
    let mut spans: Vec<Span> = Vec::new();

    let mut offset = 0usize;
    for line in text.split('\n') {
        let line_start = offset;
        offset += line.len() + 1;

        if line.trim().is_empty() || ADMIN_LINE_RE.is_match(line) {
            continue;
        }

        let stripped_start = LABS_LABEL_RE
            .find(line)
            .map(|m| m.end())
            .unwrap_or(0);
        let content = &line[stripped_start..];

        let before = labs.len();
        scan_line(content, refdata, &mut labs);

        if labs.len() > before {
            spans.push((line_start, line_start + line.len()));
        }
    }

    (labs, spans)
}

fn scan_line(content: &str, refdata: &ReferenceData, labs: &mut Vec<Lab>) {
    // Combo formats first so the item splitter does not chew them up.
    let mut combo_consumed: Vec<(usize, usize)> = Vec::new();
    for caps in COMBO_RE.captures_iter(content) {
        let whole = caps.get(0).expect("capture 0");
        let unit = caps.get(5).map(|m| m.as_str().to_string());
        let pair = [(&caps[1], &caps[3]), (&caps[2], &caps[4])];

        let resolved: Vec<_> = pair
            .iter()
            .filter_map(|(name, val)| {
                let (id, alias) = canonical_for(refdata, name)?;
                let value = parse_value(val)?;
                Some((id.to_string(), alias.to_string(), value))
            })
            .collect();
        // Both sides must be allowlisted labs or this is not a lab combo.
        if resolved.len() != 2 {
            continue;
        }
        combo_consumed.push((whole.start(), whole.end()));
        for (id, alias, value) in resolved {
            let entry = refdata.lab_ref(&id);
            labs.push(Lab {
                flag: range_flag(&value, entry),
                ref_low: entry.and_then(|e| e.low),
                ref_high: entry.and_then(|e| e.high),
                name_canonical: id,
                aliases_matched: vec![alias],
                value,
                unit: unit.clone(),
                raw: whole.as_str().trim().to_string(),
            });
        }
    }

    // Remaining content splits on commas/semicolons into single items.
    let mut rest = String::with_capacity(content.len());
    let mut last = 0usize;
    for (s, e) in &combo_consumed {
        rest.push_str(&content[last..*s]);
        last = *e;
    }
    rest.push_str(&content[last..]);

    for item in rest.split([',', ';']) {
        if let Some(lab) = parse_item(item, refdata) {
            labs.push(lab);
        }
    }
}

fn canonical_for<'a>(refdata: &'a ReferenceData, name: &str) -> Option<(&'a str, &'a str)> {
    let tokens: Vec<&str> = name.split_whitespace().collect();
    // Drop leading qualifier tokens ("repeat troponin") until an alias hits.
    for skip in 0..tokens.len() {
        let candidate = tokens[skip..].join(" ");
        if let Some(hit) = refdata.lab_canonical(&candidate) {
            return Some(hit);
        }
    }
    None
}

fn parse_value(token: &str) -> Option<LabValue> {
    let t = token.trim();
    if let Some(stripped) = t.strip_prefix('<') {
        return Some(LabValue::Comparator {
            op: CmpOp::Less,
            value: parse_num_ocr(stripped.trim())?,
        });
    }
    if let Some(stripped) = t.strip_prefix('>') {
        return Some(LabValue::Comparator {
            op: CmpOp::Greater,
            value: parse_num_ocr(stripped.trim())?,
        });
    }
    Some(LabValue::Exact {
        value: parse_num_ocr(t)?,
    })
}

fn parse_item(item: &str, refdata: &ReferenceData) -> Option<Lab> {
    let caps = ITEM_RE.captures(item)?;
    let name = caps[1].trim();
    let (id, alias) = canonical_for(refdata, name)?;

    let value = match (&caps[2], caps.get(4)) {
        ("<", _) => LabValue::Comparator {
            op: CmpOp::Less,
            value: parse_num_ocr(&caps[3])?,
        },
        (">", _) => LabValue::Comparator {
            op: CmpOp::Greater,
            value: parse_num_ocr(&caps[3])?,
        },
        (_, Some(hi)) => LabValue::Range {
            low: parse_num_ocr(&caps[3])?,
            high: parse_num_ocr(hi.as_str())?,
        },
        _ => LabValue::Exact {
            value: parse_num_ocr(&caps[3])?,
        },
    };

    let tail = caps.get(5).map(|m| m.as_str()).unwrap_or("");

    let inline_range = REF_RANGE_RE
        .captures(tail)
        .and_then(|r| Some((parse_num_ocr(&r[1])?, parse_num_ocr(&r[2])?)));
    let (ref_low, ref_high) = match inline_range {
        Some((lo, hi)) => (Some(lo), Some(hi)),
        None => {
            let entry = refdata.lab_ref(id);
            (
                entry.and_then(|e| e.low),
                entry.and_then(|e| e.high),
            )
        }
    };

    // Flags scan only the tail outside any reference-range parens.
    let flag_scan = REF_RANGE_RE.replace_all(tail, " ");
    let explicit_flag = FLAG_RE
        .captures(&flag_scan)
        .map(|f| parse_flag(f.get(1).or_else(|| f.get(2)).map_or("", |m| m.as_str())))
        .unwrap_or(LabFlag::None);

    let unit = UNIT_RE
        .captures(tail)
        .map(|u| u[1].to_string())
        .filter(|u| parse_flag(u) == LabFlag::None);

    let flag = if explicit_flag != LabFlag::None {
        explicit_flag
    } else if let Some((lo, hi)) = inline_range {
        // The note's own range outranks the reference table.
        let v = value.magnitude();
        if v < lo {
            LabFlag::Low
        } else if v > hi {
            LabFlag::High
        } else {
            LabFlag::None
        }
    } else {
        range_flag(&value, refdata.lab_ref(id))
    };

    Some(Lab {
        name_canonical: id.to_string(),
        aliases_matched: vec![alias.to_string()],
        value,
        unit,
        ref_low,
        ref_high,
        flag,
        raw: item.trim().to_string(),
    })
}
