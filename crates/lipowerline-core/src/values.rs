//! Permissive readers for the JSON property bags held in staging rows.
//!
//! Every reader returns `None` when a value is missing or cannot be
//! interpreted; none of them fail.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

const TRUE_LABELS: &[&str] = &["true", "1", "sim", "yes"];
const FALSE_LABELS: &[&str] = &["false", "0", "nao", "não", "no"];

/// The feature properties of a staged KML row (`raw.properties`), or the row
/// itself when it was staged flat.
pub fn raw_properties(raw: &Value) -> &Value {
    match raw.get("properties") {
        Some(props) if props.is_object() => props,
        _ => raw,
    }
}

/// Returns the first alias holding a non-blank value. Exact key matches are
/// tried before case-insensitive ones for each alias.
pub fn pick_value<'a>(record: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    let map = record.as_object()?;
    for alias in aliases {
        if let Some(value) = map.get(*alias).filter(|v| is_present(v)) {
            return Some(value);
        }
        let folded = map
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(alias))
            .map(|(_, value)| value);
        if let Some(value) = folded.filter(|v| is_present(v)) {
            return Some(value);
        }
    }
    None
}

/// [`pick_value`] rendered as trimmed text.
pub fn pick_text(record: &Value, aliases: &[&str]) -> Option<String> {
    pick_value(record, aliases).and_then(value_text)
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(text) => !text.trim().is_empty(),
        _ => true,
    }
}

/// Scalar JSON values as trimmed text. Arrays and objects have no textual form.
pub fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Accepts JSON numbers, booleans and numeric strings with either `.` or `,`
/// as the decimal separator. Non-finite results are rejected.
pub fn to_number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(number) => number.as_f64(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::String(text) => parse_decimal(text),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

fn parse_decimal(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.contains(',') && !trimmed.contains('.') {
        trimmed.replace(',', ".").parse::<f64>().ok()
    } else {
        trimmed.parse::<f64>().ok()
    }
}

/// Whole numbers only; `"2.0"` is accepted, `"2.5"` is not.
pub fn to_integer(value: Option<&Value>) -> Option<i32> {
    let number = to_number(value)?;
    if number.fract() != 0.0 || number < i32::MIN as f64 || number > i32::MAX as f64 {
        return None;
    }
    Some(number as i32)
}

pub fn to_boolean(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(flag) => Some(*flag),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
        other => {
            let label = value_text(other)?.to_lowercase();
            if TRUE_LABELS.contains(&label.as_str()) {
                Some(true)
            } else if FALSE_LABELS.contains(&label.as_str()) {
                Some(false)
            } else {
                None
            }
        }
    }
}

/// Calendar dates in ISO (`2024-03-15`), Brazilian (`15/03/2024`) or
/// timestamp form (RFC 3339 or `2024-03-15 10:30:00`).
pub fn to_date(value: Option<&Value>) -> Option<NaiveDate> {
    let text = value_text(value?)?;
    if let Ok(date) = NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(&text, "%d/%m/%Y") {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(&text) {
        return Some(ts.date_naive());
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&text, fmt).ok())
        .map(|ts| ts.date())
}

pub fn sanitize_class(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Lookup key for span codes: whitespace removed, lowercased.
pub fn normalize_span_key(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pick_value_skips_blank_and_folds_case() {
        let record = json!({ "codigo": "  ", "ID": "T-01", "tipo": null });
        assert_eq!(pick_value(&record, &["codigo", "id"]), Some(&json!("T-01")));
        assert_eq!(pick_value(&record, &["tipo"]), None);
        assert_eq!(pick_value(&json!("not an object"), &["id"]), None);
    }

    #[test]
    fn raw_properties_prefers_nested_bag() {
        let nested = json!({ "properties": { "codigo": "E1" }, "geometry": null });
        assert_eq!(raw_properties(&nested), &json!({ "codigo": "E1" }));
        let flat = json!({ "codigo": "E2" });
        assert_eq!(raw_properties(&flat), &flat);
    }

    #[test]
    fn to_number_accepts_both_decimal_separators() {
        assert_eq!(to_number(Some(&json!("12,5"))), Some(12.5));
        assert_eq!(to_number(Some(&json!(" 7.25 "))), Some(7.25));
        assert_eq!(to_number(Some(&json!(3))), Some(3.0));
        assert_eq!(to_number(Some(&json!("abc"))), None);
        assert_eq!(to_number(Some(&json!("inf"))), None);
        assert_eq!(to_number(Some(&Value::Null)), None);
        assert_eq!(to_number(None), None);
    }

    #[test]
    fn to_integer_rejects_fractions() {
        assert_eq!(to_integer(Some(&json!("2"))), Some(2));
        assert_eq!(to_integer(Some(&json!("2.0"))), Some(2));
        assert_eq!(to_integer(Some(&json!(2.5))), None);
    }

    #[test]
    fn to_boolean_understands_portuguese_labels() {
        assert_eq!(to_boolean(Some(&json!("Sim"))), Some(true));
        assert_eq!(to_boolean(Some(&json!("não"))), Some(false));
        assert_eq!(to_boolean(Some(&json!(1))), Some(true));
        assert_eq!(to_boolean(Some(&json!("talvez"))), None);
    }

    #[test]
    fn to_date_reads_common_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15);
        assert_eq!(to_date(Some(&json!("2024-03-15"))), expected);
        assert_eq!(to_date(Some(&json!("15/03/2024"))), expected);
        assert_eq!(to_date(Some(&json!("2024-03-15T10:00:00Z"))), expected);
        assert_eq!(to_date(Some(&json!("2024-03-15 08:45:00"))), expected);
        assert_eq!(to_date(Some(&json!("ontem"))), None);
    }

    #[test]
    fn span_keys_ignore_case_and_whitespace() {
        assert_eq!(normalize_span_key(" e1-e2 "), "e1-e2");
        assert_eq!(normalize_span_key("E1 - E2"), "e1-e2");
    }
}
