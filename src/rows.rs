//! Canonical row representation.
//!
//! An [`OperationalRow`] is the source of truth for every numeric or backend
//! operation. Its score dictionaries stay nested; only the display layer
//! flattens them. The JSON form produced by [`OperationalRow::to_json`] is what
//! crosses the boundary to external row-transform executors.

use serde_json::{Map, Value};

use crate::{
    data::{ScoreMap, display_string, identifier_text, score_map_from_json, score_map_to_json},
    error::RowShapeError,
    mapping::Method,
};

pub const INDEX_FIELD: &str = "__index";
pub const QUESTION_ID_FIELD: &str = "question_id";
pub const PROMPT_FIELD: &str = "prompt";

const SINGLE_FIELDS: &[&str] = &["model", "model_response", "score"];
const SIDE_BY_SIDE_FIELDS: &[&str] = &[
    "model_a",
    "model_b",
    "model_a_response",
    "model_b_response",
    "score_a",
    "score_b",
];

#[derive(Debug, Clone, PartialEq)]
pub enum RowPayload {
    SingleModel {
        model: Option<String>,
        model_response: String,
        score: ScoreMap,
    },
    SideBySide {
        model_a: String,
        model_b: String,
        model_a_response: String,
        model_b_response: String,
        score_a: ScoreMap,
        score_b: ScoreMap,
    },
}

impl RowPayload {
    pub fn method(&self) -> Method {
        match self {
            RowPayload::SingleModel { .. } => Method::SingleModel,
            RowPayload::SideBySide { .. } => Method::SideBySide,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationalRow {
    /// Stable identity assigned once at normalization time.
    pub index: usize,
    /// Never empty; falls back to the stringified index.
    pub question_id: String,
    pub prompt: String,
    pub payload: RowPayload,
    /// Unmapped source columns and fields added by custom transforms.
    pub extra: Map<String, Value>,
}

impl OperationalRow {
    pub fn method(&self) -> Method {
        self.payload.method()
    }

    pub fn to_json(&self) -> Map<String, Value> {
        let mut map = self.extra.clone();
        map.insert(INDEX_FIELD.to_string(), Value::from(self.index as u64));
        map.insert(
            QUESTION_ID_FIELD.to_string(),
            Value::String(self.question_id.clone()),
        );
        map.insert(PROMPT_FIELD.to_string(), Value::String(self.prompt.clone()));
        match &self.payload {
            RowPayload::SingleModel {
                model,
                model_response,
                score,
            } => {
                map.insert(
                    "model".to_string(),
                    model.clone().map(Value::String).unwrap_or(Value::Null),
                );
                map.insert(
                    "model_response".to_string(),
                    Value::String(model_response.clone()),
                );
                map.insert("score".to_string(), score_map_to_json(score));
            }
            RowPayload::SideBySide {
                model_a,
                model_b,
                model_a_response,
                model_b_response,
                score_a,
                score_b,
            } => {
                map.insert("model_a".to_string(), Value::String(model_a.clone()));
                map.insert("model_b".to_string(), Value::String(model_b.clone()));
                map.insert(
                    "model_a_response".to_string(),
                    Value::String(model_a_response.clone()),
                );
                map.insert(
                    "model_b_response".to_string(),
                    Value::String(model_b_response.clone()),
                );
                map.insert("score_a".to_string(), score_map_to_json(score_a));
                map.insert("score_b".to_string(), score_map_to_json(score_b));
            }
        }
        map
    }

    /// Reads a row back from its JSON form. The shape is dictated by the
    /// dataset's method rather than guessed from which keys are present.
    pub fn from_json(value: &Value, method: Method) -> Result<Self, RowShapeError> {
        let Value::Object(map) = value else {
            return Err(RowShapeError::NotAnObject);
        };
        let mut extra = map.clone();

        let index = match extra.remove(INDEX_FIELD) {
            Some(Value::Number(n)) => n.as_u64().ok_or_else(|| RowShapeError::InvalidField {
                field: INDEX_FIELD,
                detail: n.to_string(),
            })? as usize,
            Some(other) => {
                return Err(RowShapeError::InvalidField {
                    field: INDEX_FIELD,
                    detail: other.to_string(),
                });
            }
            None => return Err(RowShapeError::MissingField(INDEX_FIELD)),
        };
        let question_id = identifier_text(extra.remove(QUESTION_ID_FIELD).as_ref())
            .unwrap_or_else(|| index.to_string());
        let prompt = text_field(extra.remove(PROMPT_FIELD));

        let payload = match method {
            Method::SingleModel => {
                let model = identifier_text(extra.get("model"));
                let model_response = text_field(extra.get("model_response").cloned());
                let score = score_map_from_json(extra.get("score"));
                for field in SINGLE_FIELDS {
                    extra.remove(*field);
                }
                RowPayload::SingleModel {
                    model,
                    model_response,
                    score,
                }
            }
            Method::SideBySide => {
                let model_a = identifier_text(extra.get("model_a"))
                    .ok_or(RowShapeError::MissingField("model_a"))?;
                let model_b = identifier_text(extra.get("model_b"))
                    .ok_or(RowShapeError::MissingField("model_b"))?;
                let payload = RowPayload::SideBySide {
                    model_a,
                    model_b,
                    model_a_response: text_field(extra.get("model_a_response").cloned()),
                    model_b_response: text_field(extra.get("model_b_response").cloned()),
                    score_a: score_map_from_json(extra.get("score_a")),
                    score_b: score_map_from_json(extra.get("score_b")),
                };
                for field in SIDE_BY_SIDE_FIELDS {
                    extra.remove(*field);
                }
                payload
            }
        };

        Ok(OperationalRow {
            index,
            question_id,
            prompt,
            payload,
            extra,
        })
    }
}

fn text_field(value: Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(nested @ (Value::Array(_) | Value::Object(_))) => nested.to_string(),
        Some(other) => display_string(Some(&other)),
    }
}
