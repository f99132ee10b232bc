//! Column mapping model and validation.
//!
//! A [`ColumnMapping`] assigns raw columns to semantic roles. Mappings are
//! usually seeded by [`crate::detect::detect_mapping`] and then edited by the
//! user; [`validate`] reports every cardinality rule the edited mapping
//! breaks so the caller can gate "apply" on an empty error list.

use serde::{Deserialize, Serialize};

use crate::error::MappingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    #[default]
    SingleModel,
    SideBySide,
}

/// The two models compared when side-by-side data is stored one row per model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedModels {
    pub column: String,
    pub model_a: String,
    pub model_b: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnMapping {
    pub prompt_col: Option<String>,
    pub response_cols: Vec<String>,
    pub model_cols: Vec<String>,
    pub score_cols: Vec<String>,
    pub method: Method,
    pub selected_models: Option<SelectedModels>,
}

impl ColumnMapping {
    /// Tidy pairing applies when side-by-side data names its two models
    /// through a single model column.
    pub fn is_tidy(&self) -> bool {
        self.method == Method::SideBySide && self.selected_models.is_some()
    }

    /// Every raw column this mapping assigns a role to.
    pub fn mapped_columns(&self) -> impl Iterator<Item = &str> {
        self.prompt_col
            .iter()
            .chain(self.response_cols.iter())
            .chain(self.model_cols.iter())
            .chain(self.score_cols.iter())
            .map(String::as_str)
    }

    pub fn with_score_cols(&self, score_cols: Vec<String>) -> Self {
        Self {
            score_cols,
            ..self.clone()
        }
    }
}

pub fn validate(mapping: &ColumnMapping) -> Vec<String> {
    let mut errors = Vec::new();

    if mapping
        .prompt_col
        .as_deref()
        .is_none_or(|col| col.trim().is_empty())
    {
        errors.push("Select a prompt column".to_string());
    }

    match mapping.method {
        Method::SingleModel => {
            if mapping.response_cols.len() != 1 {
                errors.push(format!(
                    "Single model mode requires exactly 1 response column (found {})",
                    mapping.response_cols.len()
                ));
            }
            if mapping.model_cols.len() > 1 {
                errors.push(format!(
                    "Single model mode allows at most 1 model column (found {})",
                    mapping.model_cols.len()
                ));
            }
            if mapping.selected_models.is_some() {
                errors.push("Selected models only apply to side-by-side mode".to_string());
            }
        }
        Method::SideBySide => match &mapping.selected_models {
            Some(selected) => validate_tidy(mapping, selected, &mut errors),
            None => {
                if mapping.response_cols.len() != 2 {
                    errors.push(format!(
                        "Side-by-side mode requires exactly 2 response columns (found {})",
                        mapping.response_cols.len()
                    ));
                }
                if !matches!(mapping.model_cols.len(), 0 | 2) {
                    errors.push(format!(
                        "Side-by-side mode requires 0 or 2 model columns (found {})",
                        mapping.model_cols.len()
                    ));
                }
            }
        },
    }

    errors
}

fn validate_tidy(mapping: &ColumnMapping, selected: &SelectedModels, errors: &mut Vec<String>) {
    if mapping.model_cols.len() != 1 {
        errors.push(format!(
            "Pairing by model requires exactly 1 model column (found {})",
            mapping.model_cols.len()
        ));
    } else if mapping.model_cols[0] != selected.column {
        errors.push(format!(
            "Selected models refer to column '{}' but the model column is '{}'",
            selected.column, mapping.model_cols[0]
        ));
    }
    if mapping.response_cols.len() != 1 {
        errors.push(format!(
            "Pairing by model requires exactly 1 response column (found {})",
            mapping.response_cols.len()
        ));
    }
    if selected.model_a.trim().is_empty() || selected.model_b.trim().is_empty() {
        errors.push("Select both models to compare".to_string());
    } else if selected.model_a == selected.model_b {
        errors.push("Model A and Model B must be different".to_string());
    }
}

pub fn ensure_valid(mapping: &ColumnMapping) -> Result<(), MappingError> {
    let errors = validate(mapping);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(MappingError { errors })
    }
}
