//! Record Normalizer
//!
//! Pure coercions from raw ERP driver values into canonical buffer types.
//! Every function here is total: unparsable input becomes `None`, never an
//! error, so a single malformed field cannot abort a batch.

use crate::erp::ErpValue;
use chrono::{NaiveDate, NaiveDateTime};

/// Date string formats accepted from the ERP, tried in order
const DATE_FORMATS: [&str; 4] = [
    "%Y-%m-%d",
    "%Y-%m-%d %H:%M:%S",
    "%d/%m/%Y",
    "%d/%m/%Y %H:%M:%S",
];

/// Coerce a driver value to a date. Native dates pass through, native
/// timestamps truncate to their date, strings go through `DATE_FORMATS`.
pub fn normalize_date(value: &ErpValue) -> Option<NaiveDate> {
    match value {
        ErpValue::Date(d) => Some(*d),
        ErpValue::Timestamp(ts) => Some(ts.date()),
        ErpValue::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            for format in DATE_FORMATS {
                if format.contains("%H") {
                    if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
                        return Some(ts.date());
                    }
                } else if let Ok(d) = NaiveDate::parse_from_str(trimmed, format) {
                    return Some(d);
                }
            }
            None
        }
        _ => None,
    }
}

/// Coerce a driver value to a float. Comma decimal separators in strings are
/// accepted ("1234,56" and "1234.56" both parse to the same value).
pub fn normalize_number(value: &ErpValue) -> Option<f64> {
    match value {
        ErpValue::Float(f) => Some(*f),
        ErpValue::Int(i) => Some(*i as f64),
        ErpValue::Text(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    }
}

/// Coerce a driver value to trimmed text. Whitespace-only strings collapse to
/// `None` so absent data has a single representation.
pub fn normalize_text(value: &ErpValue) -> Option<String> {
    match value {
        ErpValue::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        ErpValue::Int(i) => Some(i.to_string()),
        _ => None,
    }
}

/// Case-insensitive view over one result row.
///
/// Column lookup is two-phase: an ordered exact-alias pass, then a
/// substring-contains fallback. ERP schemas name the same column differently
/// across versions and localizations; the fallback is what keeps one rename
/// from silently dropping a field.
pub struct RowView<'a> {
    columns: &'a [String],
    values: &'a [ErpValue],
}

impl<'a> RowView<'a> {
    pub fn new(columns: &'a [String], values: &'a [ErpValue]) -> Self {
        Self { columns, values }
    }

    /// Exact column match, ignoring case
    pub fn get(&self, name: &str) -> Option<&'a ErpValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|i| self.values.get(i))
    }

    /// First present non-empty value among `aliases` (exact pass), then among
    /// columns whose name contains one of `contains` (fallback pass)
    pub fn lookup(&self, aliases: &[&str], contains: &[&str]) -> Option<&'a ErpValue> {
        for alias in aliases {
            if let Some(value) = self.get(alias) {
                if !value.is_empty() {
                    return Some(value);
                }
            }
        }
        for token in contains {
            let token = token.to_ascii_lowercase();
            for (i, column) in self.columns.iter().enumerate() {
                if column.to_ascii_lowercase().contains(&token) {
                    if let Some(value) = self.values.get(i) {
                        if !value.is_empty() {
                            return Some(value);
                        }
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_formats_agree() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let iso = ErpValue::Text("2024-01-05".to_string());
        let french = ErpValue::Text("05/01/2024".to_string());
        let native = ErpValue::Date(expected);
        assert_eq!(normalize_date(&iso), Some(expected));
        assert_eq!(normalize_date(&french), Some(expected));
        assert_eq!(normalize_date(&native), Some(expected));
    }

    #[test]
    fn test_datetime_truncates_to_date() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        let text = ErpValue::Text("14/03/2024 08:30:00".to_string());
        let native = ErpValue::Timestamp(expected.and_hms_opt(8, 30, 0).unwrap());
        assert_eq!(normalize_date(&text), Some(expected));
        assert_eq!(normalize_date(&native), Some(expected));
    }

    #[test]
    fn test_unparsable_date_is_none() {
        assert_eq!(normalize_date(&ErpValue::Text("not a date".to_string())), None);
        assert_eq!(normalize_date(&ErpValue::Text("2024-13-40".to_string())), None);
        assert_eq!(normalize_date(&ErpValue::Null), None);
    }

    #[test]
    fn test_comma_decimal_separator() {
        assert_eq!(
            normalize_number(&ErpValue::Text("1234,56".to_string())),
            Some(1234.56)
        );
        assert_eq!(
            normalize_number(&ErpValue::Text(" 1234.56 ".to_string())),
            Some(1234.56)
        );
        assert_eq!(normalize_number(&ErpValue::Int(12)), Some(12.0));
        assert_eq!(normalize_number(&ErpValue::Text("abc".to_string())), None);
    }

    #[test]
    fn test_empty_text_is_none() {
        assert_eq!(normalize_text(&ErpValue::Text("   ".to_string())), None);
        assert_eq!(normalize_text(&ErpValue::Text(String::new())), None);
        assert_eq!(
            normalize_text(&ErpValue::Text("  Montpellier ".to_string())),
            Some("Montpellier".to_string())
        );
        assert_eq!(normalize_text(&ErpValue::Null), None);
    }

    #[test]
    fn test_lookup_prefers_exact_alias() {
        let columns = vec!["CPChantier".to_string(), "VilleChantier".to_string()];
        let values = vec![
            ErpValue::Text("34000".to_string()),
            ErpValue::Text("Montpellier".to_string()),
        ];
        let view = RowView::new(&columns, &values);
        assert_eq!(
            view.lookup(&["CPChantier"], &["cp"]),
            Some(&ErpValue::Text("34000".to_string()))
        );
    }

    #[test]
    fn test_lookup_falls_back_to_substring() {
        let columns = vec!["Code".to_string(), "AdresseDuChantier".to_string()];
        let values = vec![
            ErpValue::Text("CH-01".to_string()),
            ErpValue::Text("12 rue des Arceaux".to_string()),
        ];
        let view = RowView::new(&columns, &values);
        // No exact alias matches, the substring pass finds the renamed column
        assert_eq!(
            view.lookup(&["AdrChantier"], &["adr"]),
            Some(&ErpValue::Text("12 rue des Arceaux".to_string()))
        );
    }

    #[test]
    fn test_lookup_skips_empty_values() {
        let columns = vec!["NomClient".to_string(), "Client".to_string()];
        let values = vec![
            ErpValue::Text("  ".to_string()),
            ErpValue::Text("Dupont BTP".to_string()),
        ];
        let view = RowView::new(&columns, &values);
        assert_eq!(
            view.lookup(&["NomClient"], &["client"]),
            Some(&ErpValue::Text("Dupont BTP".to_string()))
        );
    }
}
