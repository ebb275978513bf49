use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default input cap: 256 KiB.
pub const DEFAULT_MAX_TEXT_BYTES: usize = 256 * 1024;

/// Output template selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TemplateId {
    #[default]
    Cis,
    Consult,
    Progress,
}

impl TemplateId {
    pub fn as_str(self) -> &'static str {
        match self {
            TemplateId::Cis => "CIS",
            TemplateId::Consult => "Consult",
            TemplateId::Progress => "Progress",
        }
    }

    /// Case-insensitive parse; unknown names are an `InvalidOption` error.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s.to_ascii_lowercase().as_str() {
            "cis" => Ok(TemplateId::Cis),
            "consult" => Ok(TemplateId::Consult),
            "progress" => Ok(TemplateId::Progress),
            _ => Err(CoreError::InvalidOption(format!("unknown template '{s}'"))),
        }
    }
}

/// Unit system applied at render time only. Parsing always stores what the
/// note said.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LocaleUnits {
    #[default]
    Us,
    Si,
}

/// Options for a single parse/render call.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub template: TemplateId,
    pub smart_phrase: bool,
    pub include_unmapped: bool,
    pub max_text_bytes: usize,
    pub locale_units: LocaleUnits,
    /// Substitute diagnosis allowlist for this call. `None` = built-in list.
    pub allowlist_override: Option<Vec<String>>,
    /// Substitute diagnosis blocklist for this call. `None` = built-in list.
    pub blocklist_override: Option<Vec<String>>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            template: TemplateId::default(),
            smart_phrase: false,
            include_unmapped: true,
            max_text_bytes: DEFAULT_MAX_TEXT_BYTES,
            locale_units: LocaleUnits::default(),
            allowlist_override: None,
            blocklist_override: None,
        }
    }
}
