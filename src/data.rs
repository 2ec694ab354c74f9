use std::{fmt, sync::OnceLock};

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

/// Output representation for every date written to the destination.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A raw spreadsheet cell before any schema-driven coercion.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    DateTime(NaiveDateTime),
    /// Spreadsheet error marker such as `#DIV/0!` or `#REF!`.
    Error(String),
}

impl CellValue {
    pub fn from_text(value: &str) -> Self {
        if value.trim().is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Integer(i) => i.to_string(),
            CellValue::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            CellValue::Boolean(b) => b.to_string(),
            CellValue::DateTime(dt) => format_timestamp(dt),
            CellValue::Error(marker) => marker.clone(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

pub fn format_timestamp(value: &NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_naive_date(value: &str) -> Option<NaiveDate> {
    // Month-first before day-first for ambiguous `a/b/Y`.
    const DATE_FORMATS: &[&str] = &[
        "%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y", "%d.%m.%Y", "%Y%m%d",
        "%d-%b-%Y", "%b %d, %Y", "%d %b %Y", "%b %d %Y",
    ];
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

pub fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %I:%M:%S %p",
        "%Y-%m-%d %I:%M %p",
        "%Y-%m-%dT%I:%M:%S %p",
        "%Y/%m/%d %H:%M:%S",
        "%Y/%m/%d %H:%M",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
        "%m/%d/%Y %I:%M:%S %p",
        "%m/%d/%Y %I:%M %p",
        "%d/%m/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
        "%d-%m-%Y %H:%M:%S",
        "%d-%m-%Y %H:%M",
    ];
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

fn zone_suffix() -> &'static Regex {
    static ZONE: OnceLock<Regex> = OnceLock::new();
    ZONE.get_or_init(|| {
        Regex::new(r"(\d{2}:\d{2}(?::\d{2})?)(?:\.\d+)?\s*(?:Z|UTC|[+-]\d{2}:?\d{2})?$")
            .expect("static timestamp suffix pattern")
    })
}

/// Parses spreadsheet date text leniently, returning `None` instead of an error.
///
/// Fractional seconds and a trailing zone designator are dropped; the wall
/// clock value is kept as written.
pub fn parse_date_text(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let cleaned = zone_suffix().replace(trimmed, "$1");
    let cleaned = cleaned.trim();
    parse_naive_datetime(cleaned).or_else(|| {
        parse_naive_date(cleaned).and_then(|date| date.and_hms_opt(0, 0, 0))
    })
}

/// Keeps at most `max` characters of `value`.
pub fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((byte_idx, _)) => value[..byte_idx].to_string(),
        None => value.to_string(),
    }
}
