//! Expiration timestamps returned by the SSN
//!
//! The login endpoint answers with `fecha_expiracion` such as
//! `"15 jul 2025 20:40:34"`. We store it as `"15/07/2025 20:40:34"` and derive
//! an absolute instant from it when the pattern is recognised.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;

const FORMATTED_PATTERN: &str = "%d/%m/%Y %H:%M:%S";

const MONTHS: [(&str, &str); 12] = [
    ("ene", "01"),
    ("feb", "02"),
    ("mar", "03"),
    ("abr", "04"),
    ("may", "05"),
    ("jun", "06"),
    ("jul", "07"),
    ("ago", "08"),
    ("sep", "09"),
    ("oct", "10"),
    ("nov", "11"),
    ("dic", "12"),
];

fn spanish_timestamp() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(\d{1,2})\s+([A-Za-z]{3})\.?\s+(\d{4})\s+(\d{1,2}):(\d{2}):(\d{2})\s*$")
            .expect("expiration pattern compiles")
    })
}

fn month_number(abbreviation: &str) -> Option<&'static str> {
    let lower = abbreviation.to_lowercase();
    MONTHS
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, number)| *number)
}

/// Reformat a Spanish month-abbreviation timestamp as `DD/MM/YYYY HH:MM:SS`.
///
/// Anything that does not match is returned unchanged.
pub fn normalize_expiration(raw: &str) -> String {
    let Some(caps) = spanish_timestamp().captures(raw) else {
        return raw.to_string();
    };
    let Some(month) = month_number(&caps[2]) else {
        return raw.to_string();
    };

    format!(
        "{:0>2}/{}/{} {:0>2}:{}:{}",
        &caps[1], month, &caps[3], &caps[4], &caps[5], &caps[6]
    )
}

/// Interpret a normalized expiration in the regulator's offset.
///
/// `None` means the expiration is unknown (unparsed or impossible date).
pub fn expiration_instant(formatted: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(formatted.trim(), FORMATTED_PATTERN).ok()?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|local| local.with_timezone(&Utc))
}

/// Render an instant back in the regulator's wall-clock format
pub fn format_instant(instant: DateTime<Utc>, offset: FixedOffset) -> String {
    instant.with_timezone(&offset).format(FORMATTED_PATTERN).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn art() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    #[test]
    fn test_normalizes_spanish_timestamp() {
        assert_eq!(
            normalize_expiration("15 jul 2025 20:40:34"),
            "15/07/2025 20:40:34"
        );
    }

    #[test]
    fn test_pads_single_digits_and_ignores_case() {
        assert_eq!(
            normalize_expiration("3 DIC 2025 7:05:09"),
            "03/12/2025 07:05:09"
        );
        assert_eq!(
            normalize_expiration("1 ene. 2026 00:00:00"),
            "01/01/2026 00:00:00"
        );
    }

    #[test]
    fn test_every_month_maps() {
        for (i, (name, _)) in MONTHS.iter().enumerate() {
            let out = normalize_expiration(&format!("10 {} 2025 10:00:00", name));
            assert_eq!(out, format!("10/{:02}/2025 10:00:00", i + 1));
        }
    }

    #[test]
    fn test_unparseable_passes_through() {
        for raw in [
            "2025-07-15T20:40:34Z",
            "15 jly 2025 20:40:34",
            "",
            "mañana",
        ] {
            assert_eq!(normalize_expiration(raw), raw);
        }
    }

    #[test]
    fn test_instant_uses_regulator_offset() {
        let instant = expiration_instant("15/07/2025 20:40:34", art()).unwrap();
        assert_eq!(instant.to_rfc3339(), "2025-07-15T23:40:34+00:00");
        assert_eq!(format_instant(instant, art()), "15/07/2025 20:40:34");
    }

    #[test]
    fn test_instant_unknown_for_unparsed() {
        assert!(expiration_instant("15 jly 2025 20:40:34", art()).is_none());
        assert!(expiration_instant("31/02/2025 10:00:00", art()).is_none());
    }
}
