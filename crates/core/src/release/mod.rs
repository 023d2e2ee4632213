//! Release-title parsing.
//!
//! Extracts resolution, audio languages and a quality score from a raw
//! release title. Pure functions, no I/O.

mod languages;
mod parser;
mod types;

pub use languages::detect_languages;
pub use parser::{normalize_title, parse_release};
pub use types::{ParsedRelease, Resolution};
