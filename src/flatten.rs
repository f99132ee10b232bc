//! Flattening of nested score dictionaries into display columns.
//!
//! The transform is one-directional: a [`DisplayRow`] is never converted back.
//! Numeric work keeps reading the [`OperationalRow`] it came from.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    data::{ScoreMap, number_value},
    rows::{OperationalRow, RowPayload},
};

pub const SCORE_PREFIX: &str = "score";

/// Display names that override the models recorded on side-by-side rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelNames {
    pub model_a: String,
    pub model_b: String,
}

/// Render-only row; an absent key is an undefined cell.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayRow(pub Map<String, Value>);

impl DisplayRow {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Flattened {
    pub rows: Vec<DisplayRow>,
    /// Every generated score column, in first-seen order.
    pub score_columns: Vec<String>,
}

pub fn score_column(model: Option<&str>, metric: &str) -> String {
    match model {
        Some(model) => format!("{SCORE_PREFIX}_{model}_{metric}"),
        None => format!("{SCORE_PREFIX}_{metric}"),
    }
}

pub fn flatten_rows(rows: &[OperationalRow], names: Option<&ModelNames>) -> Flattened {
    let mut single_keys = BTreeSet::new();
    let mut paired_keys = BTreeSet::new();
    for row in rows {
        match &row.payload {
            RowPayload::SingleModel { score, .. } => single_keys.extend(score.keys().cloned()),
            RowPayload::SideBySide {
                score_a, score_b, ..
            } => {
                paired_keys.extend(score_a.keys().cloned());
                paired_keys.extend(score_b.keys().cloned());
            }
        }
    }

    let mut seen = HashSet::new();
    let mut score_columns = Vec::new();
    let mut flat = Vec::with_capacity(rows.len());

    for row in rows {
        let mut fields = row.to_json();
        let mut put = |fields: &mut Map<String, Value>, column: String, scores: &ScoreMap, key: &str| {
            if let Some(value) = scores.get(key) {
                fields.insert(column.clone(), number_value(*value));
            }
            if seen.insert(column.clone()) {
                score_columns.push(column);
            }
        };
        match &row.payload {
            RowPayload::SingleModel { score, .. } => {
                fields.remove("score");
                for key in &single_keys {
                    put(&mut fields, score_column(None, key), score, key);
                }
            }
            RowPayload::SideBySide {
                model_a,
                model_b,
                score_a,
                score_b,
                ..
            } => {
                fields.remove("score_a");
                fields.remove("score_b");
                let label_a = names.map_or(model_a.as_str(), |n| n.model_a.as_str());
                let label_b = names.map_or(model_b.as_str(), |n| n.model_b.as_str());
                for key in &paired_keys {
                    put(&mut fields, score_column(Some(label_a), key), score_a, key);
                    put(&mut fields, score_column(Some(label_b), key), score_b, key);
                }
            }
        }
        flat.push(DisplayRow(fields));
    }

    Flattened {
        rows: flat,
        score_columns,
    }
}
