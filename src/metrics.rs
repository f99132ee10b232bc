//! Reconciles metric column naming conventions.
//!
//! Some producers emit deltas as `quality_<metric>_delta[_variant]`, others as
//! `quality_delta_<metric>[_variant]`. Everything downstream reads the prefix
//! form, so rows are renamed into it before enrichment.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

const PREFIX_FORM: &str = "quality_delta_";

fn suffix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^quality_(?P<metric>.+)_delta(?P<variant>_significant|_ci_lower|_ci_upper|_ci_mean)?$")
            .expect("valid metric suffix pattern")
    })
}

/// Prefix-form name for `column`, or `None` when it needs no renaming.
pub fn canonical_metric_name(column: &str) -> Option<String> {
    if column.starts_with(PREFIX_FORM) {
        return None;
    }
    let caps = suffix_pattern().captures(column)?;
    let variant = caps.name("variant").map_or("", |m| m.as_str());
    Some(format!("{PREFIX_FORM}{}{variant}", &caps["metric"]))
}

pub fn normalize_metric_names(row: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (column, value) in row {
        match canonical_metric_name(column) {
            Some(renamed) => {
                out.insert(renamed, value.clone());
            }
            None => {
                out.entry(column.clone()).or_insert_with(|| value.clone());
            }
        }
    }
    out
}

pub fn normalize_metric_rows(rows: &[Map<String, Value>]) -> Vec<Map<String, Value>> {
    rows.iter().map(normalize_metric_names).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn suffix_variants_move_to_prefix_form() {
        assert_eq!(
            canonical_metric_name("quality_accuracy_delta").as_deref(),
            Some("quality_delta_accuracy")
        );
        assert_eq!(
            canonical_metric_name("quality_helpful_rate_delta_ci_upper").as_deref(),
            Some("quality_delta_helpful_rate_ci_upper")
        );
        assert_eq!(
            canonical_metric_name("quality_accuracy_delta_significant").as_deref(),
            Some("quality_delta_accuracy_significant")
        );
        assert_eq!(canonical_metric_name("quality_delta_accuracy"), None);
        assert_eq!(canonical_metric_name("quality_accuracy"), None);
        assert_eq!(canonical_metric_name("quality_accuracy_delta_pvalue"), None);
    }

    #[test]
    fn renamed_value_wins_over_an_existing_prefix_column() {
        let row = json!({"quality_delta_accuracy": 0.3, "quality_accuracy_delta": 0.1, "model": "m"});
        let out = normalize_metric_names(row.as_object().unwrap());
        assert_eq!(out["quality_delta_accuracy"], json!(0.1));
        assert_eq!(out["model"], json!("m"));
        assert!(!out.contains_key("quality_accuracy_delta"));
    }
}
