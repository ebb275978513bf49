//! corscribe: deterministic clinical note parsing and structured rendering.
//!
//! The core is a pure pipeline over its input text and immutable static
//! reference data: normalize -> detect sections -> extract entities ->
//! extract context -> disambiguate diagnoses -> validate safety -> render.
//! No I/O, no clock, no randomness; identical input yields byte-identical
//! output. Hosts that need to yield between phases can call the phase
//! functions directly instead of `parse_clinical_note`.

#![deny(clippy::all)]

pub mod allergies;
pub mod context;
pub mod demographics;
pub mod diagnoses;
pub mod disambiguate;
pub mod error;
pub mod headers;
pub mod labs;
pub mod meds;
pub mod normalize;
pub mod options;
pub mod pipeline;
pub mod plans;
pub mod refdata;
pub mod render;
pub mod safety;
pub mod sections;
pub mod types;
pub mod vitals;

pub use error::CoreError;
pub use options::{LocaleUnits, ParseOptions, TemplateId};
pub use pipeline::{parse_and_render, parse_clinical_note, parse_with, render_note, CancelToken};
pub use refdata::ReferenceData;
pub use types::{ParsedNote, RenderedNote};
