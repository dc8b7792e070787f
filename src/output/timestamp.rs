//! Renders the timestamp prefix written ahead of each captured output line.
//!
//! Two names are recognized as well-known formats (`iso8601`, `rfc3339`,
//! which are the same format under POSIX's definition); anything else is
//! treated as a `chrono` strftime template, so an operator can ask for
//! exactly the prefix their log shipper expects.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampFormat {
    Iso8601,
    Custom(String),
}

impl TimestampFormat {
    pub fn parse(spec: &str) -> Self {
        match spec {
            "iso8601" | "rfc3339" => TimestampFormat::Iso8601,
            other => TimestampFormat::Custom(other.to_string()),
        }
    }

    pub fn render(&self, at: DateTime<Utc>) -> String {
        match self {
            TimestampFormat::Iso8601 => at.to_rfc3339(),
            TimestampFormat::Custom(template) => at.format(template).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap()
    }

    #[test]
    fn iso8601_alias_renders_rfc3339() {
        let format = TimestampFormat::parse("iso8601");
        assert_eq!(format.render(sample()), sample().to_rfc3339());
    }

    #[test]
    fn rfc3339_is_an_alias_for_iso8601() {
        assert_eq!(TimestampFormat::parse("rfc3339"), TimestampFormat::Iso8601);
    }

    #[test]
    fn custom_template_uses_strftime_syntax() {
        let format = TimestampFormat::parse("%Y-%m-%d %H:%M:%S");
        assert_eq!(format.render(sample()), "2026-01-02 03:04:05");
    }
}
