//! Shared value helpers for raw and canonical rows.
//!
//! Raw rows arrive from an external parser as JSON objects whose values are
//! heterogeneous (strings, numbers, nested objects, JSON encoded as strings).
//! Everything in this crate reads them through the helpers below so that
//! stringification, numeric coercion and "missing" detection behave the same
//! in every pipeline stage.

use std::collections::BTreeMap;

use evalexpr::Value as EvalValue;
use serde_json::{Map, Number, Value};

/// A record as parsed from the source file, keyed by original column names.
pub type RawRow = Map<String, Value>;

/// Metric name to numeric score.
pub type ScoreMap = BTreeMap<String, f64>;

pub fn normalize_column_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' => c,
            _ => '_',
        })
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Formats a float the way a browser stringifies numbers: integral values
/// lose their fractional part.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else {
        value.to_string()
    }
}

/// String form of an optional cell, as filters and sorts compare it. An
/// absent cell renders as `undefined` and JSON null as `null`, so filters can
/// tell the two apart. Arrays join their elements with `,` (null elements
/// render empty) and objects render as `[object Object]`.
pub fn display_string(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => display_string(Some(other)),
            })
            .collect::<Vec<_>>()
            .join(","),
        Some(Value::Object(_)) => "[object Object]".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.as_f64().map(format_number).unwrap_or_else(|| n.to_string()),
    }
}

/// Returns the text of a value that identifies something (a question, a model,
/// a cluster). Empty strings and null count as absent.
pub fn identifier_text(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(other) => Some(display_string(Some(other))),
    }
}

pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

/// Parses a finite number out of a JSON number or a numeric string.
pub fn finite_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_finite(s),
        _ => None,
    }
}

pub fn parse_finite(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
}

pub fn number_value(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

pub fn score_map_to_json(scores: &ScoreMap) -> Value {
    Value::Object(
        scores
            .iter()
            .map(|(metric, value)| (metric.clone(), number_value(*value)))
            .collect(),
    )
}

/// Reads a metric map back from its JSON form, skipping non-numeric entries.
pub fn score_map_from_json(value: Option<&Value>) -> ScoreMap {
    match value {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(metric, value)| finite_number(value).map(|v| (metric.clone(), v)))
            .collect(),
        _ => ScoreMap::new(),
    }
}

pub fn json_to_evalexpr(value: &Value) -> EvalValue {
    match value {
        Value::Null => EvalValue::Empty,
        Value::Bool(b) => EvalValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => EvalValue::Int(i),
            None => EvalValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => EvalValue::String(s.clone()),
        Value::Array(items) => EvalValue::Tuple(items.iter().map(json_to_evalexpr).collect()),
        Value::Object(_) => EvalValue::String(value.to_string()),
    }
}

pub fn evalexpr_to_json(value: EvalValue) -> Value {
    match value {
        EvalValue::String(s) => Value::String(s),
        EvalValue::Int(i) => Value::Number(i.into()),
        EvalValue::Float(f) => number_value(f),
        EvalValue::Boolean(b) => Value::Bool(b),
        EvalValue::Tuple(values) => Value::Array(values.into_iter().map(evalexpr_to_json).collect()),
        EvalValue::Empty => Value::Null,
    }
}
