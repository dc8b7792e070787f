//! Parses human-written byte sizes such as `100MB` or `512` used in rotation
//! config. Suffixes are matched longest-first so `KB` isn't mistaken for a
//! trailing `B` with `K` left dangling. Per the supervisor's size-parsing
//! contract, `GB`/`MB`/`KB` are binary multiples (1024-based) exactly like
//! their single-letter `G`/`M`/`K` spellings, not decimal ones.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid size `{0}`")]
pub struct SizeParseError(String);

const UNITS: &[(&str, u64)] = &[
    ("GB", 1024u64.pow(3)),
    ("MB", 1024u64.pow(2)),
    ("KB", 1024),
    ("G", 1024u64.pow(3)),
    ("M", 1024u64.pow(2)),
    ("K", 1024),
    ("B", 1),
];

/// Parses a size string into a byte count. Bare numbers are taken as bytes.
pub fn parse_size(input: &str) -> Result<u64, SizeParseError> {
    let trimmed = input.trim();
    for (suffix, multiplier) in UNITS {
        if let Some(number) = trimmed
            .strip_suffix(suffix)
            .filter(|_| trimmed.len() > suffix.len() || *suffix == "B")
        {
            let number = number.trim();
            let value: f64 = number
                .parse()
                .map_err(|_| SizeParseError(input.to_string()))?;
            if value < 0.0 {
                return Err(SizeParseError(input.to_string()));
            }
            return Ok((value * *multiplier as f64).round() as u64);
        }
    }
    trimmed
        .parse::<u64>()
        .map_err(|_| SizeParseError(input.to_string()))
}
