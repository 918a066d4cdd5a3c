//! Parsing of CLI arguments that name ids and instants.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use uuid::Uuid;

/// Accepted timestamp layouts, tried in order.
const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse a UUID argument. `what` names the entity for the error message.
pub fn parse_id(what: &str, input: &str) -> Result<Uuid> {
    Uuid::parse_str(input.trim()).with_context(|| format!("invalid {what} ID: {input:?}"))
}

/// Parse a local timestamp such as `2024-01-31T09:00`.
pub fn parse_timestamp(input: &str) -> Result<NaiveDateTime> {
    let trimmed = input.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .with_context(|| {
            format!("invalid timestamp {input:?}: expected YYYY-MM-DDTHH:MM[:SS]")
        })
}

/// Parse an optional timestamp argument.
pub fn parse_opt_timestamp(input: Option<&str>) -> Result<Option<NaiveDateTime>> {
    input.map(parse_timestamp).transpose()
}
