//! Primitive cell coercions shared by the row preparer and the validator.

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

static TRUE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)yes|true").unwrap());
static FALSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)no|false").unwrap());

/// Accepted input formats for Date cells, tried in order.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%Y/%m/%d",
    "%d-%b-%Y",
    "%B %d, %Y",
];

/// Accepted input formats for DateTime cells, tried in order.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Interpret a Boolean cell. `yes`/`true` and `no`/`false` match
/// case-insensitively anywhere in the cell; anything else is undecidable.
pub fn parse_bool(value: &str) -> Option<bool> {
    if TRUE_RE.is_match(value) {
        Some(true)
    } else if FALSE_RE.is_match(value) {
        Some(false)
    } else {
        None
    }
}

/// Reformat a Date cell to canonical ISO-8601 (`YYYY-MM-DD`).
pub fn reformat_date(value: &str) -> Option<String> {
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    None
}

/// Reformat a DateTime cell to canonical ISO-8601 (`YYYY-MM-DDTHH:MM:SS`).
/// A bare date is accepted and pinned to midnight.
pub fn reformat_datetime(value: &str) -> Option<String> {
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.format("%Y-%m-%dT%H:%M:%S").to_string());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return Some(format!("{}T00:00:00", date.format("%Y-%m-%d")));
        }
    }
    None
}

/// Split an Array cell on the list delimiter, trimming items and dropping
/// empty ones.
pub fn split_list(value: &str, delimiter: &str) -> Vec<String> {
    value
        .split(delimiter)
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("False"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn test_reformat_date() {
        assert_eq!(reformat_date("2021-03-05"), Some("2021-03-05".into()));
        assert_eq!(reformat_date("03/05/2021"), Some("2021-03-05".into()));
        assert_eq!(reformat_date("05-Mar-2021"), Some("2021-03-05".into()));
        assert_eq!(reformat_date("not a date"), None);
    }

    #[test]
    fn test_reformat_datetime() {
        assert_eq!(
            reformat_datetime("2021-03-05 13:45:00"),
            Some("2021-03-05T13:45:00".into())
        );
        assert_eq!(
            reformat_datetime("2021-03-05"),
            Some("2021-03-05T00:00:00".into())
        );
        assert_eq!(reformat_datetime("bogus"), None);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("a; b ;c", ";"), vec!["a", "b", "c"]);
        assert_eq!(split_list("", ";"), Vec::<String>::new());
        assert_eq!(split_list("solo", ";"), vec!["solo"]);
    }
}
