//! Recurrence patterns: parsing pattern text and expanding it into instants.

mod generator;
mod parser;
mod pattern;

pub use generator::{Expansion, MAX_ITERATIONS, Window, expand};
pub use parser::{PatternError, parse_pattern};
pub use pattern::{RecurrenceKind, RecurrencePattern};
