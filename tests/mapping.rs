mod common;

use common::{side_by_side_mapping, single_model_mapping, strings, tidy_mapping};
use eval_explorer::{
    config::DetectionConfig,
    detect::{detect_mapping, detect_mapping_with},
    mapping::{Method, ensure_valid, validate},
};

#[test]
fn single_model_columns_are_detected() {
    let columns = strings(&["prompt", "Model", "model_response", "score_accuracy", "notes"]);
    let mapping = detect_mapping(&columns);
    assert_eq!(mapping.method, Method::SingleModel);
    assert_eq!(mapping.prompt_col.as_deref(), Some("prompt"));
    assert_eq!(mapping.response_cols, strings(&["model_response"]));
    assert_eq!(mapping.model_cols, strings(&["Model"]));
    assert_eq!(mapping.score_cols, strings(&["score_accuracy"]));
    assert!(validate(&mapping).is_empty());
}

#[test]
fn side_by_side_columns_are_detected() {
    let columns = strings(&[
        "question_id",
        "Prompt",
        "model_a",
        "model_b",
        "model_a_response",
        "model_b_response",
        "score_a",
        "score_b",
    ]);
    let mapping = detect_mapping(&columns);
    assert_eq!(mapping.method, Method::SideBySide);
    assert_eq!(mapping.prompt_col.as_deref(), Some("Prompt"));
    assert_eq!(
        mapping.response_cols,
        strings(&["model_a_response", "model_b_response"])
    );
    assert_eq!(mapping.model_cols, strings(&["model_a", "model_b"]));
    assert_eq!(mapping.score_cols, strings(&["score_a", "score_b"]));
    assert!(ensure_valid(&mapping).is_ok());
}

#[test]
fn detection_markers_are_configurable() {
    let config = DetectionConfig {
        prompt_column: "question".into(),
        score_marker: "rating".into(),
        ..DetectionConfig::default()
    };
    let columns = strings(&["Question", "model_response", "helpfulness_rating"]);
    let mapping = detect_mapping_with(&columns, &config);
    assert_eq!(mapping.prompt_col.as_deref(), Some("Question"));
    assert_eq!(mapping.score_cols, strings(&["helpfulness_rating"]));
}

#[test]
fn missing_prompt_is_reported() {
    let mut mapping = single_model_mapping(&[]);
    mapping.prompt_col = None;
    let err = ensure_valid(&mapping).unwrap_err();
    assert!(err.errors.iter().any(|e| e.contains("prompt")));
}

#[test]
fn side_by_side_needs_two_responses() {
    let mut mapping = side_by_side_mapping(&[]);
    mapping.response_cols.pop();
    let errors = validate(&mapping);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("exactly 2 response columns"));
}

#[test]
fn tidy_mapping_rules() {
    assert!(validate(&tidy_mapping("A", "B", &[])).is_empty());

    let same = validate(&tidy_mapping("A", "A", &[]));
    assert!(same.iter().any(|e| e.contains("must be different")));

    let mut wrong_column = tidy_mapping("A", "B", &[]);
    wrong_column.model_cols = strings(&["system"]);
    assert!(validate(&wrong_column).iter().any(|e| e.contains("'model'")));
}
