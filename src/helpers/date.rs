//! Date helper functions

use chrono::{DateTime, Datelike, FixedOffset, TimeZone};

/// Shown instead of a publication date the CMS did not provide
pub const DATE_PLACEHOLDER: &str = "—";

const MONTHS_PT_BR: [&str; 12] = [
    "Jan", "Fev", "Mar", "Abr", "Mai", "Jun", "Jul", "Ago", "Set", "Out", "Nov", "Dez",
];

const MONTHS_EN: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Parse a CMS timestamp
///
/// Accepts RFC 3339 as well as the `+0000` offsets Prismic emits.
pub fn parse_publication_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
}

/// Abbreviated month name, 1-based
pub fn month_abbrev(month: u32, language: &str) -> &'static str {
    let table = if language.to_ascii_lowercase().starts_with("pt") {
        &MONTHS_PT_BR
    } else {
        &MONTHS_EN
    };
    table[(month.clamp(1, 12) - 1) as usize]
}

/// Format a date as `dd MMM yyyy`
pub fn format_date<Tz: TimeZone>(date: &DateTime<Tz>, language: &str) -> String {
    format!(
        "{:02} {} {}",
        date.day(),
        month_abbrev(date.month(), language),
        date.year()
    )
}

/// Format a publication date in the display timezone, or the placeholder
pub fn format_publication_date(raw: Option<&str>, language: &str, tz: chrono_tz::Tz) -> String {
    let Some(raw) = raw else {
        return DATE_PLACEHOLDER.to_string();
    };
    match parse_publication_date(raw) {
        Some(date) => format_date(&date.with_timezone(&tz), language),
        None => {
            tracing::warn!("Unparseable publication date '{}'", raw);
            DATE_PLACEHOLDER.to_string()
        }
    }
}

/// Value for a `<time datetime>` attribute
pub fn date_xml(raw: Option<&str>) -> Option<String> {
    raw.and_then(parse_publication_date)
        .map(|date| date.format("%Y-%m-%dT%H:%M:%S%:z").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_publication_date() {
        assert_eq!(
            format_publication_date(Some("2021-03-15T00:00:00Z"), "pt-BR", chrono_tz::UTC),
            "15 Mar 2021"
        );
        assert_eq!(
            format_publication_date(Some("2021-04-19T19:25:28+0000"), "pt-BR", chrono_tz::UTC),
            "19 Abr 2021"
        );
        assert_eq!(
            format_publication_date(Some("2021-02-05T10:00:00.000+0000"), "en", chrono_tz::UTC),
            "05 Feb 2021"
        );
    }

    #[test]
    fn test_timezone_shifts_day() {
        assert_eq!(
            format_publication_date(
                Some("2021-03-15T01:00:00+0000"),
                "pt-BR",
                chrono_tz::America::Sao_Paulo
            ),
            "14 Mar 2021"
        );
    }

    #[test]
    fn test_missing_or_bad_date() {
        assert_eq!(
            format_publication_date(None, "pt-BR", chrono_tz::UTC),
            DATE_PLACEHOLDER
        );
        assert_eq!(
            format_publication_date(Some("yesterday"), "pt-BR", chrono_tz::UTC),
            DATE_PLACEHOLDER
        );
    }

    #[test]
    fn test_date_xml() {
        assert_eq!(
            date_xml(Some("2021-03-15T19:25:28+0000")).as_deref(),
            Some("2021-03-15T19:25:28+00:00")
        );
        assert_eq!(date_xml(None), None);
    }
}
