//! Conversion of raw rows into canonical [`OperationalRow`]s.
//!
//! Rows whose selected score columns are missing are excluded and reported
//! through a single aggregate [`ExclusionNotice`] rather than one message per
//! row.

use std::fmt;

use itertools::Itertools;
use log::{debug, info};
use serde_json::{Map, Value};

use crate::{
    data::{RawRow, ScoreMap, display_string, identifier_text},
    error::MappingError,
    mapping::{ColumnMapping, Method, ensure_valid},
    rows::{OperationalRow, QUESTION_ID_FIELD, RowPayload},
    scores::{ScoreColumn, Side, parse_score_cell},
};

pub const DEFAULT_MODEL_A: &str = "model_a";
pub const DEFAULT_MODEL_B: &str = "model_b";

/// Rows dropped because at least one selected score column had no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionNotice {
    pub excluded: usize,
    /// Score columns that were missing on at least one dropped row, in
    /// mapping order.
    pub columns: Vec<String>,
}

impl fmt::Display for ExclusionNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Filtered out {} row(s) with missing values in score column(s): {}",
            self.excluded,
            self.columns.join(", ")
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeOutcome {
    pub rows: Vec<OperationalRow>,
    pub notice: Option<ExclusionNotice>,
}

/// Normalizes `raw` under `mapping`, validating the mapping first.
pub fn normalize_rows(
    raw: &[RawRow],
    mapping: &ColumnMapping,
) -> Result<NormalizeOutcome, MappingError> {
    ensure_valid(mapping)?;
    Ok(normalize_validated(raw, mapping))
}

/// Normalizes rows under a mapping the caller has already validated.
pub fn normalize_validated(raw: &[RawRow], mapping: &ColumnMapping) -> NormalizeOutcome {
    let score_columns = mapping
        .score_cols
        .iter()
        .map(|name| ScoreColumn::classify(name, mapping.method))
        .collect::<Vec<_>>();

    let mut rows = Vec::with_capacity(raw.len());
    let mut excluded = 0usize;
    let mut missing_columns = vec![false; score_columns.len()];

    for (index, record) in raw.iter().enumerate() {
        let mut parsed = Vec::with_capacity(score_columns.len());
        let mut row_missing = false;
        for (pos, column) in score_columns.iter().enumerate() {
            match parse_score_cell(record.get(&column.name), &column.metric_key) {
                Some(scores) => parsed.push(scores),
                None => {
                    row_missing = true;
                    missing_columns[pos] = true;
                }
            }
        }
        if row_missing {
            excluded += 1;
            continue;
        }

        let payload = build_payload(record, mapping, &score_columns, parsed);
        rows.push(OperationalRow {
            index,
            question_id: question_id(record, index),
            prompt: mapping
                .prompt_col
                .as_ref()
                .map(|col| cell_text(record.get(col)))
                .unwrap_or_default(),
            payload,
            extra: unmapped_columns(record, mapping, &[]),
        });
    }

    let notice = (excluded > 0).then(|| ExclusionNotice {
        excluded,
        columns: score_columns
            .iter()
            .zip(&missing_columns)
            .filter(|(_, missing)| **missing)
            .map(|(column, _)| column.name.clone())
            .collect(),
    });

    match &notice {
        Some(notice) => info!("{notice}"),
        None => debug!("All {} row(s) had complete score columns", raw.len()),
    }
    info!(
        "Normalized {} of {} row(s) as {:?}",
        rows.len(),
        raw.len(),
        mapping.method
    );

    NormalizeOutcome { rows, notice }
}

fn build_payload(
    record: &RawRow,
    mapping: &ColumnMapping,
    score_columns: &[ScoreColumn],
    parsed: Vec<ScoreMap>,
) -> RowPayload {
    match mapping.method {
        Method::SingleModel => {
            let mut score = ScoreMap::new();
            for scores in parsed {
                score.extend(scores);
            }
            RowPayload::SingleModel {
                model: mapping
                    .model_cols
                    .first()
                    .and_then(|col| identifier_text(record.get(col))),
                model_response: mapping
                    .response_cols
                    .first()
                    .map(|col| cell_text(record.get(col)))
                    .unwrap_or_default(),
                score,
            }
        }
        Method::SideBySide => {
            let mut score_a = ScoreMap::new();
            let mut score_b = ScoreMap::new();
            for (column, scores) in score_columns.iter().zip(parsed) {
                match column.side {
                    Some(Side::A) => score_a.extend(scores),
                    Some(Side::B) => score_b.extend(scores),
                    None => {
                        score_a.extend(scores.clone());
                        score_b.extend(scores);
                    }
                }
            }
            let model_name = |pos: usize, fallback: &str| {
                mapping
                    .model_cols
                    .get(pos)
                    .and_then(|col| identifier_text(record.get(col)))
                    .unwrap_or_else(|| fallback.to_string())
            };
            let response = |pos: usize| {
                mapping
                    .response_cols
                    .get(pos)
                    .map(|col| cell_text(record.get(col)))
                    .unwrap_or_default()
            };
            RowPayload::SideBySide {
                model_a: model_name(0, DEFAULT_MODEL_A),
                model_b: model_name(1, DEFAULT_MODEL_B),
                model_a_response: response(0),
                model_b_response: response(1),
                score_a,
                score_b,
            }
        }
    }
}

pub(crate) fn question_id(record: &RawRow, index: usize) -> String {
    identifier_text(record.get(QUESTION_ID_FIELD)).unwrap_or_else(|| index.to_string())
}

/// Text of a prompt or response cell. Nested values keep their JSON form.
pub(crate) fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(nested @ (Value::Array(_) | Value::Object(_))) => nested.to_string(),
        Some(other) => display_string(Some(other)),
    }
}

/// Source columns the mapping leaves unassigned, carried through untouched.
pub(crate) fn unmapped_columns(
    record: &RawRow,
    mapping: &ColumnMapping,
    also_skip: &[&str],
) -> Map<String, Value> {
    let mapped = mapping
        .mapped_columns()
        .chain(also_skip.iter().copied())
        .chain([QUESTION_ID_FIELD])
        .collect_vec();
    record
        .iter()
        .filter(|(key, _)| !mapped.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
