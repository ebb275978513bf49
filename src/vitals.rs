//! Vital-sign extraction: regex families for BP, HR, RR, Temp, SpO2,
//! weight, height, and BMI, plus one codified threshold table for flags.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{Vital, VitalFlag, VitalKind, VitalValue};

// =============================================================================
// OCR-TOLERANT NUMBER PARSING
// =============================================================================

fn ocr_fold_digit(ch: char) -> char {
    match ch {
        'O' | 'o' => '0',
        'l' | 'I' | '|' => '1',
        'B' => '8',
        'S' | 's' => '5',
        'Z' | 'z' => '2',
        _ => ch,
    }
}

/// Parse a number from a token that is already known to sit in a numeric
/// slot; common OCR letter confusions are folded before the retry.
pub(crate) fn parse_num_ocr(token: &str) -> Option<f64> {
    if let Ok(v) = token.parse::<f64>() {
        return Some(v);
    }
    let folded: String = token.chars().map(ocr_fold_digit).collect();
    folded.parse::<f64>().ok()
}

// =============================================================================
// PATTERNS
// =============================================================================

static BP_RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:BP|blood pressure)[:\s]+(\d{2,3})\s*-\s*(\d{2,3})\s*/\s*(\d{2,3})\s*-\s*(\d{2,3})\b")
        .expect("invalid BP_RANGE_RE")
});

static BP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:BP|blood pressure)[:\s]+([0-9OoIl]{2,3})\s*/\s*([0-9OoIl]{2,3})\b")
        .expect("invalid BP_RE")
});

static HR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:HR|heart rate|pulse)[:\s]+([0-9OoIl]{1,3})(\s*(?:bpm|beats/min|/min))?\b")
        .expect("invalid HR_RE")
});

static RR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:RR|resp(?:iratory)? rate|respirations?)[:\s]+(\d{1,2})\b")
        .expect("invalid RR_RE")
});

static TEMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:temp(?:erature)?[:\s]+|T:\s*)(\d{2,3}(?:\.\d)?)\s*(?:°\s*|deg(?:rees)?\s*)?([FC])?\b")
        .expect("invalid TEMP_RE")
});

static SPO2_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:SpO2|O2\s*sat(?:uration)?|SaO2|pulse\s*ox(?:imetry)?)[:\s]+(\d{2,3})\s*%?((?:\s*on\s+(?:room\s+air|RA|\d+\s*L(?:/min)?(?:\s*NC)?|NC))?)")
        .expect("invalid SPO2_RE")
});

static WEIGHT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:weight|wt)[:.\s]+(\d{2,3}(?:\.\d)?)\s*(kg|lbs?|pounds?)?\b")
        .expect("invalid WEIGHT_RE")
});

static HEIGHT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:height|ht)[:.\s]+(\d{2,3}(?:\.\d)?)\s*(cm|in(?:ches)?)?\b")
        .expect("invalid HEIGHT_RE")
});

static BMI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bBMI[:\s]+(\d{2}(?:\.\d)?)\b").expect("invalid BMI_RE"));

// =============================================================================
// FLAG THRESHOLDS
// =============================================================================

fn flag_pressure(systolic: u16, diastolic: u16) -> VitalFlag {
    if systolic > 180 || diastolic > 110 {
        VitalFlag::Critical
    } else if systolic >= 140 || diastolic >= 90 {
        VitalFlag::High
    } else if systolic < 90 || diastolic < 60 {
        VitalFlag::Low
    } else {
        VitalFlag::None
    }
}

fn flag_single(kind: VitalKind, value: f64, unit: Option<&str>) -> VitalFlag {
    match kind {
        VitalKind::Hr => {
            if value >= 150.0 || value < 40.0 {
                VitalFlag::Critical
            } else if value > 100.0 {
                VitalFlag::High
            } else if value < 50.0 {
                VitalFlag::Low
            } else {
                VitalFlag::None
            }
        }
        VitalKind::Rr => {
            if value > 30.0 {
                VitalFlag::Critical
            } else if value > 24.0 {
                VitalFlag::High
            } else if value < 10.0 {
                VitalFlag::Low
            } else {
                VitalFlag::None
            }
        }
        VitalKind::Temp => {
            let fahrenheit = matches!(unit, Some("F")) || (unit.is_none() && value >= 45.0);
            if fahrenheit {
                if value >= 104.0 {
                    VitalFlag::Critical
                } else if value >= 100.4 {
                    VitalFlag::High
                } else if value < 95.0 {
                    VitalFlag::Low
                } else {
                    VitalFlag::None
                }
            } else if value >= 40.0 {
                VitalFlag::Critical
            } else if value >= 38.0 {
                VitalFlag::High
            } else if value < 35.0 {
                VitalFlag::Low
            } else {
                VitalFlag::None
            }
        }
        VitalKind::SpO2 => {
            if value < 88.0 {
                VitalFlag::Critical
            } else if value < 92.0 {
                VitalFlag::Low
            } else {
                VitalFlag::None
            }
        }
        VitalKind::Bmi => {
            if value >= 30.0 {
                VitalFlag::High
            } else {
                VitalFlag::None
            }
        }
        _ => VitalFlag::None,
    }
}

// =============================================================================
// EXTRACTION
// =============================================================================

/// Byte span into the scanned text, used downstream to avoid double-counting.
pub type Span = (usize, usize);

fn overlaps_any(spans: &[Span], start: usize, end: usize) -> bool {
    spans.iter().any(|&(s, e)| start < e && s < end)
}

/// Extract all vitals from `text`. Never fails; unmatched text is ignored.
pub fn extract_vitals(text: &str) -> (Vec<Vital>, Vec<Span>) {
    let mut vitals: Vec<(usize, Vital)> = Vec::new();
    let mut spans: Vec<Span> = Vec::new();

    for caps in BP_RANGE_RE.captures_iter(text) {
        let whole = caps.get(0).expect("capture 0");
        let (Some(sl), Some(sh), Some(dl), Some(dh)) = (
            parse_num_ocr(&caps[1]),
            parse_num_ocr(&caps[2]),
            parse_num_ocr(&caps[3]),
            parse_num_ocr(&caps[4]),
        ) else {
            continue;
        };
        spans.push((whole.start(), whole.end()));
        vitals.push((
            whole.start(),
            Vital {
                kind: VitalKind::Bp,
                value: VitalValue::PressureRange {
                    systolic_low: sl as u16,
                    systolic_high: sh as u16,
                    diastolic_low: dl as u16,
                    diastolic_high: dh as u16,
                },
                unit: Some("mmHg".to_string()),
                flag: flag_pressure(sh as u16, dh as u16),
                raw: whole.as_str().to_string(),
            },
        ));
    }

    for caps in BP_RE.captures_iter(text) {
        let whole = caps.get(0).expect("capture 0");
        if overlaps_any(&spans, whole.start(), whole.end()) {
            continue;
        }
        let (Some(sys), Some(dia)) = (parse_num_ocr(&caps[1]), parse_num_ocr(&caps[2])) else {
            continue;
        };
        spans.push((whole.start(), whole.end()));
        vitals.push((
            whole.start(),
            Vital {
                kind: VitalKind::Bp,
                value: VitalValue::Pressure {
                    systolic: sys as u16,
                    diastolic: dia as u16,
                },
                unit: Some("mmHg".to_string()),
                flag: flag_pressure(sys as u16, dia as u16),
                raw: whole.as_str().to_string(),
            },
        ));
    }

    single_family(text, &HR_RE, VitalKind::Hr, &mut vitals, &mut spans, |caps| {
        caps.get(2)
            .filter(|m| !m.as_str().trim().is_empty())
            .map(|_| "bpm".to_string())
    });
    single_family(text, &RR_RE, VitalKind::Rr, &mut vitals, &mut spans, |_| None);

    for caps in TEMP_RE.captures_iter(text) {
        let whole = caps.get(0).expect("capture 0");
        if overlaps_any(&spans, whole.start(), whole.end()) {
            continue;
        }
        let Some(value) = parse_num_ocr(&caps[1]) else { continue };
        let unit = match caps.get(2).map(|m| m.as_str().to_ascii_uppercase()) {
            Some(u) => Some(u),
            None if value >= 45.0 => Some("F".to_string()),
            None => Some("C".to_string()),
        };
        spans.push((whole.start(), whole.end()));
        vitals.push((
            whole.start(),
            Vital {
                kind: VitalKind::Temp,
                value: VitalValue::Single { value },
                flag: flag_single(VitalKind::Temp, value, unit.as_deref()),
                unit,
                raw: whole.as_str().trim_end().to_string(),
            },
        ));
    }

    for caps in SPO2_RE.captures_iter(text) {
        let whole = caps.get(0).expect("capture 0");
        if overlaps_any(&spans, whole.start(), whole.end()) {
            continue;
        }
        let Some(value) = parse_num_ocr(&caps[1]) else { continue };
        spans.push((whole.start(), whole.end()));
        vitals.push((
            whole.start(),
            Vital {
                kind: VitalKind::SpO2,
                value: VitalValue::Single { value },
                unit: Some("%".to_string()),
                flag: flag_single(VitalKind::SpO2, value, None),
                // Modifier ("on RA", "on 2L NC") stays in raw.
                raw: whole.as_str().trim_end().to_string(),
            },
        ));
    }

    single_family(text, &WEIGHT_RE, VitalKind::Weight, &mut vitals, &mut spans, |caps| {
        caps.get(2).map(|m| normalize_weight_unit(m.as_str()))
    });
    single_family(text, &HEIGHT_RE, VitalKind::Height, &mut vitals, &mut spans, |caps| {
        caps.get(2).map(|m| m.as_str().to_ascii_lowercase())
    });
    single_family(text, &BMI_RE, VitalKind::Bmi, &mut vitals, &mut spans, |_| None);

    vitals.sort_by_key(|(start, _)| *start);
    spans.sort_unstable();
    (vitals.into_iter().map(|(_, v)| v).collect(), spans)
}

fn single_family<F>(
    text: &str,
    re: &Regex,
    kind: VitalKind,
    vitals: &mut Vec<(usize, Vital)>,
    spans: &mut Vec<Span>,
    unit_fn: F,
) where
    F: Fn(&regex::Captures<'_>) -> Option<String>,
{
    for caps in re.captures_iter(text) {
        let whole = caps.get(0).expect("capture 0");
        if overlaps_any(spans, whole.start(), whole.end()) {
            continue;
        }
        let Some(value) = parse_num_ocr(&caps[1]) else { continue };
        let unit = unit_fn(&caps);
        spans.push((whole.start(), whole.end()));
        vitals.push((
            whole.start(),
            Vital {
                kind,
                value: VitalValue::Single { value },
                flag: flag_single(kind, value, unit.as_deref()),
                unit,
                raw: whole.as_str().trim_end().to_string(),
            },
        ));
    }
}

fn normalize_weight_unit(unit: &str) -> String {
    match unit.to_ascii_lowercase().as_str() {
        "lb" | "lbs" | "pound" | "pounds" => "lb".to_string(),
        other => other.to_string(),
    }
}
