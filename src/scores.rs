//! Score cell parsing and score-column routing.
//!
//! A score cell may hold an inline dictionary (`{"accuracy": 0.9}`, or the
//! Python literal `{'accuracy': 0.9}`), a nested JSON object, or a scalar.
//! Dictionaries contribute every numeric entry; scalars are keyed by the column
//! name with its `score` tokens stripped.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::{
    data::{ScoreMap, finite_number, parse_finite},
    mapping::Method,
};

const SCORE_TOKEN: &str = "score";
const FALLBACK_METRIC: &str = "value";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

/// How one selected score column feeds the canonical score dictionaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreColumn {
    pub name: String,
    /// `None` in side-by-side mode means the metric is written to both sides.
    pub side: Option<Side>,
    /// Key used when the cell holds a scalar.
    pub metric_key: String,
}

impl ScoreColumn {
    pub fn classify(name: &str, method: Method) -> Self {
        let mut tokens = name.split('_').filter(|t| !t.is_empty()).collect::<Vec<_>>();
        let mut side = None;
        if method == Method::SideBySide
            && let Some(pos) = tokens
                .iter()
                .rposition(|t| t.eq_ignore_ascii_case("a") || t.eq_ignore_ascii_case("b"))
        {
            side = Some(if tokens[pos].eq_ignore_ascii_case("a") {
                Side::A
            } else {
                Side::B
            });
            tokens.remove(pos);
        }
        Self {
            name: name.to_string(),
            side,
            metric_key: metric_key_from_tokens(tokens),
        }
    }
}

/// Metric key a scalar cell is stored under when it comes from `column`.
pub fn scalar_metric_key(column: &str) -> String {
    metric_key_from_tokens(column.split('_').filter(|t| !t.is_empty()).collect())
}

fn metric_key_from_tokens(mut tokens: Vec<&str>) -> String {
    if tokens
        .first()
        .is_some_and(|t| t.eq_ignore_ascii_case(SCORE_TOKEN))
    {
        tokens.remove(0);
    }
    if tokens
        .last()
        .is_some_and(|t| t.eq_ignore_ascii_case(SCORE_TOKEN))
    {
        tokens.pop();
    }
    if tokens.is_empty() {
        FALLBACK_METRIC.to_string()
    } else {
        tokens.join("_")
    }
}

/// Parses one score cell. Returns `None` when the cell is missing: absent,
/// null, blank, non-numeric, NaN, or a dictionary without numeric entries.
pub fn parse_score_cell(value: Option<&Value>, metric_key: &str) -> Option<ScoreMap> {
    let parsed = match value? {
        Value::Object(map) => numeric_entries(map),
        Value::String(raw) => {
            let trimmed = raw.trim();
            match parse_inline_dict(trimmed) {
                Some(map) => numeric_entries(&map),
                None => scalar(parse_finite(trimmed)?, metric_key),
            }
        }
        other => scalar(finite_number(other)?, metric_key),
    };
    (!parsed.is_empty()).then_some(parsed)
}

fn scalar(value: f64, metric_key: &str) -> ScoreMap {
    ScoreMap::from([(metric_key.to_string(), value)])
}

fn numeric_entries(map: &Map<String, Value>) -> ScoreMap {
    map.iter()
        .filter_map(|(metric, value)| finite_number(value).map(|v| (metric.clone(), v)))
        .collect()
}

/// Parses `{...}` text as JSON, falling back to a Python dict literal.
pub fn parse_inline_dict(raw: &str) -> Option<Map<String, Value>> {
    if !(raw.starts_with('{') && raw.ends_with('}')) {
        return None;
    }
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw) {
        return Some(map);
    }
    match serde_json::from_str::<Value>(&python_literal_to_json(raw)) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn python_literal_to_json(raw: &str) -> String {
    static KEYWORDS: OnceLock<Regex> = OnceLock::new();
    let keywords = KEYWORDS.get_or_init(|| {
        Regex::new(r"\b(True|False|None)\b").expect("valid keyword pattern")
    });
    let quoted = raw.replace('\'', "\"");
    keywords
        .replace_all(&quoted, |caps: &regex::Captures<'_>| match &caps[1] {
            "True" => "true",
            "False" => "false",
            _ => "null",
        })
        .into_owned()
}
