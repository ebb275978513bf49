use thiserror::Error;

/// Fatal errors surfaced to callers. Everything else becomes a coded
/// warning on a successful `ParsedNote`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("input of {size} bytes exceeds the {max}-byte limit (INPUT_TOO_LARGE)")]
    InputTooLarge { size: usize, max: usize },

    #[error("invalid option: {0} (INVALID_OPTION)")]
    InvalidOption(String),

    #[error("static reference data unavailable: {0} (STATIC_DATA_MISSING)")]
    StaticDataMissing(String),
}

impl CoreError {
    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::InputTooLarge { .. } => "INPUT_TOO_LARGE",
            CoreError::InvalidOption(_) => "INVALID_OPTION",
            CoreError::StaticDataMissing(_) => "STATIC_DATA_MISSING",
        }
    }
}
