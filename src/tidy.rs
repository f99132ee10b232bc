//! Pairing of tidy (one row per question and model) data into side-by-side rows.

use std::collections::HashMap;

use log::{debug, info};

use crate::{
    data::{RawRow, ScoreMap, identifier_text},
    error::PairingError,
    mapping::ColumnMapping,
    normalize::{cell_text, unmapped_columns},
    rows::{OperationalRow, QUESTION_ID_FIELD, RowPayload},
    scores::{parse_score_cell, scalar_metric_key},
};

#[derive(Default)]
struct Group<'a> {
    a: Vec<&'a RawRow>,
    b: Vec<&'a RawRow>,
}

/// Pairs the rows of the two selected models by question.
///
/// Only questions answered exactly once by each model produce a pair; other
/// groups are dropped without error. Indices are reassigned over the pairs,
/// and a pair grouped under a blank key takes its index as question id.
pub fn pair_tidy_rows(
    raw: &[RawRow],
    mapping: &ColumnMapping,
) -> Result<Vec<OperationalRow>, PairingError> {
    let selected = mapping
        .selected_models
        .as_ref()
        .ok_or(PairingError::MissingSelection)?;
    let prompt_col = mapping.prompt_col.as_deref();

    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Group<'_>> = HashMap::new();

    for record in raw {
        let Some(model) = identifier_text(record.get(&selected.column)) else {
            continue;
        };
        let is_a = model == selected.model_a;
        if !is_a && model != selected.model_b {
            continue;
        }
        let key = identifier_text(record.get(QUESTION_ID_FIELD))
            .or_else(|| prompt_col.map(|col| cell_text(record.get(col))))
            .unwrap_or_default();
        let group = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            Group::default()
        });
        if is_a {
            group.a.push(record);
        } else {
            group.b.push(record);
        }
    }

    let mut pairs = Vec::new();
    let mut dropped = 0usize;
    for key in order {
        let group = &groups[&key];
        let (&[row_a], &[row_b]) = (group.a.as_slice(), group.b.as_slice()) else {
            dropped += 1;
            continue;
        };
        let response = |record: &RawRow| {
            mapping
                .response_cols
                .first()
                .map(|col| cell_text(record.get(col)))
                .unwrap_or_default()
        };
        let question_id = if key.trim().is_empty() {
            pairs.len().to_string()
        } else {
            key
        };
        pairs.push(OperationalRow {
            index: pairs.len(),
            question_id,
            prompt: prompt_col
                .map(|col| cell_text(row_a.get(col)))
                .unwrap_or_default(),
            payload: RowPayload::SideBySide {
                model_a: selected.model_a.clone(),
                model_b: selected.model_b.clone(),
                model_a_response: response(row_a),
                model_b_response: response(row_b),
                score_a: row_scores(row_a, mapping),
                score_b: row_scores(row_b, mapping),
            },
            extra: unmapped_columns(row_a, mapping, &[selected.column.as_str()]),
        });
    }

    if dropped > 0 {
        debug!("Dropped {dropped} question group(s) without exactly one row per model");
    }
    if pairs.is_empty() {
        return Err(PairingError::NoPairs {
            model_a: selected.model_a.clone(),
            model_b: selected.model_b.clone(),
        });
    }
    info!(
        "Paired {} question(s) for '{}' vs '{}'",
        pairs.len(),
        selected.model_a,
        selected.model_b
    );
    Ok(pairs)
}

/// One model's scores; a missing cell contributes no metric.
fn row_scores(record: &RawRow, mapping: &ColumnMapping) -> ScoreMap {
    let mut scores = ScoreMap::new();
    for column in &mapping.score_cols {
        if let Some(parsed) = parse_score_cell(record.get(column), &scalar_metric_key(column)) {
            scores.extend(parsed);
        }
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{Method, SelectedModels};
    use serde_json::json;

    fn mapping() -> ColumnMapping {
        ColumnMapping {
            prompt_col: Some("prompt".into()),
            response_cols: vec!["response".into()],
            model_cols: vec!["model".into()],
            score_cols: vec!["score".into()],
            method: Method::SideBySide,
            selected_models: Some(SelectedModels {
                column: "model".into(),
                model_a: "A".into(),
                model_b: "B".into(),
            }),
        }
    }

    fn rows(values: Vec<serde_json::Value>) -> Vec<RawRow> {
        values
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn groups_by_prompt_when_question_id_is_missing() {
        let raw = rows(vec![
            json!({"prompt": "p1", "model": "A", "response": "ra", "score": 1}),
            json!({"prompt": "p1", "model": "B", "response": "rb", "score": "0.5"}),
            json!({"prompt": "p1", "model": "C", "response": "rc", "score": 0}),
        ]);
        let pairs = pair_tidy_rows(&raw, &mapping()).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].question_id, "p1");
        let RowPayload::SideBySide {
            model_b_response,
            score_a,
            score_b,
            ..
        } = &pairs[0].payload
        else {
            panic!("expected side-by-side payload");
        };
        assert_eq!(model_b_response, "rb");
        assert_eq!(score_a, &ScoreMap::from([("value".into(), 1.0)]));
        assert_eq!(score_b, &ScoreMap::from([("value".into(), 0.5)]));
    }

    #[test]
    fn duplicate_model_rows_drop_the_group() {
        let raw = rows(vec![
            json!({"question_id": "1", "prompt": "p", "model": "A", "response": "x"}),
            json!({"question_id": "1", "prompt": "p", "model": "A", "response": "y"}),
            json!({"question_id": "1", "prompt": "p", "model": "B", "response": "z"}),
            json!({"question_id": "2", "prompt": "q", "model": "A", "response": "x"}),
            json!({"question_id": "2", "prompt": "q", "model": "B", "response": "z"}),
        ]);
        let pairs = pair_tidy_rows(&raw, &mapping()).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].question_id, "2");
        assert_eq!(pairs[0].index, 0);
    }

    #[test]
    fn no_pairs_names_both_models() {
        let raw = rows(vec![json!({"question_id": "1", "model": "A", "response": "x"})]);
        let err = pair_tidy_rows(&raw, &mapping()).unwrap_err();
        assert_eq!(
            err,
            PairingError::NoPairs {
                model_a: "A".into(),
                model_b: "B".into()
            }
        );
        assert!(err.to_string().contains("'A' and 'B'"));
    }
}
