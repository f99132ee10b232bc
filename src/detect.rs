//! Initial column-mapping guess from column names alone.

use crate::{
    config::DetectionConfig,
    mapping::{ColumnMapping, Method},
};

pub fn detect_mapping(columns: &[String]) -> ColumnMapping {
    detect_mapping_with(columns, &DetectionConfig::default())
}

pub fn detect_mapping_with(columns: &[String], config: &DetectionConfig) -> ColumnMapping {
    let a_response = config.model_a_response_marker();
    let b_response = config.model_b_response_marker();
    let first_containing =
        |marker: &str| columns.iter().find(|c| c.contains(marker)).cloned();

    let side_by_side = first_containing(&a_response).is_some()
        && first_containing(&b_response).is_some();

    let prompt_col = columns
        .iter()
        .find(|c| c.eq_ignore_ascii_case(&config.prompt_column))
        .cloned();

    let score_marker = config.score_marker.to_ascii_lowercase();
    let score_cols = columns
        .iter()
        .filter(|c| c.to_ascii_lowercase().contains(&score_marker))
        .cloned()
        .collect();

    let (method, response_cols, model_cols) = if side_by_side {
        let responses = [first_containing(&a_response), first_containing(&b_response)]
            .into_iter()
            .flatten()
            .collect();
        let model_for = |marker: &str| {
            columns
                .iter()
                .find(|c| c.contains(marker) && !c.contains("response"))
                .cloned()
        };
        let models = [
            model_for(&config.model_a_marker),
            model_for(&config.model_b_marker),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();
        // Half a model pair is worse than none for validation.
        let models = if models.len() == 2 { models } else { Vec::new() };
        (Method::SideBySide, responses, models)
    } else {
        let responses = first_containing(&config.response_marker)
            .into_iter()
            .collect();
        let models = columns
            .iter()
            .find(|c| c.eq_ignore_ascii_case(&config.model_column))
            .cloned()
            .into_iter()
            .collect();
        (Method::SingleModel, responses, models)
    };

    ColumnMapping {
        prompt_col,
        response_cols,
        model_cols,
        score_cols,
        method,
        selected_models: None,
    }
}
