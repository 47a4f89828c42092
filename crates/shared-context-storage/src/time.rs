//! UTC time helpers. All timestamps are UTC-with-offset instants;
//! parsers accept both the `Z` and `+00:00` forms.

use chrono::{DateTime, Utc};

#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

#[must_use]
pub fn format(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub fn parse(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_format_and_parse() {
        let instant = now();
        let formatted = format(instant);
        let parsed = parse(&formatted).expect("parses");
        assert_eq!(instant.timestamp_micros(), parsed.timestamp_micros());
    }

    #[test]
    fn parses_both_z_and_offset_forms() {
        assert!(parse("2024-01-01T00:00:00Z").is_ok());
        assert!(parse("2024-01-01T00:00:00+00:00").is_ok());
    }
}
