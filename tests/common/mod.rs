#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use eval_explorer::{
    data::RawRow,
    mapping::{ColumnMapping, Method, SelectedModels},
};
use serde_json::Value;
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

/// Converts a JSON array of objects into raw rows.
pub fn raw_rows(value: Value) -> Vec<RawRow> {
    value
        .as_array()
        .expect("array of rows")
        .iter()
        .map(|row| row.as_object().cloned().expect("object row"))
        .collect()
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

pub fn single_model_mapping(score_cols: &[&str]) -> ColumnMapping {
    ColumnMapping {
        prompt_col: Some("prompt".into()),
        response_cols: strings(&["model_response"]),
        model_cols: strings(&["model"]),
        score_cols: strings(score_cols),
        method: Method::SingleModel,
        selected_models: None,
    }
}

pub fn side_by_side_mapping(score_cols: &[&str]) -> ColumnMapping {
    ColumnMapping {
        prompt_col: Some("prompt".into()),
        response_cols: strings(&["model_a_response", "model_b_response"]),
        model_cols: strings(&["model_a", "model_b"]),
        score_cols: strings(score_cols),
        method: Method::SideBySide,
        selected_models: None,
    }
}

pub fn tidy_mapping(model_a: &str, model_b: &str, score_cols: &[&str]) -> ColumnMapping {
    ColumnMapping {
        prompt_col: Some("prompt".into()),
        response_cols: strings(&["model_response"]),
        model_cols: strings(&["model"]),
        score_cols: strings(score_cols),
        method: Method::SideBySide,
        selected_models: Some(SelectedModels {
            column: "model".into(),
            model_a: model_a.into(),
            model_b: model_b.into(),
        }),
    }
}
