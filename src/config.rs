//! Tunable markers used by column detection and metric enrichment.
//!
//! The defaults reproduce the naming conventions of the evaluation tooling
//! that produces these datasets. A YAML document can override any subset:
//!
//! ```yaml
//! detection:
//!   prompt_column: question
//!   score_marker: rating
//! enrichment:
//!   excluded_markers: ["_ci_", "_significant", "_pvalue"]
//! ```

use std::{fs::File, io::Read, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExplorerConfig {
    pub detection: DetectionConfig,
    pub enrichment: EnrichmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DetectionConfig {
    /// Column name (case-insensitive) treated as the prompt.
    pub prompt_column: String,
    /// Column name (case-insensitive) treated as the model in single-model data.
    pub model_column: String,
    /// Substring identifying single-model response columns.
    pub response_marker: String,
    pub model_a_marker: String,
    pub model_b_marker: String,
    /// Substring (case-insensitive) identifying score columns.
    pub score_marker: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            prompt_column: "prompt".to_string(),
            model_column: "model".to_string(),
            response_marker: "model_response".to_string(),
            model_a_marker: "model_a".to_string(),
            model_b_marker: "model_b".to_string(),
            score_marker: "score".to_string(),
        }
    }
}

impl DetectionConfig {
    pub fn model_a_response_marker(&self) -> String {
        format!("{}_response", self.model_a_marker)
    }

    pub fn model_b_response_marker(&self) -> String {
        format!("{}_response", self.model_b_marker)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Flat metric columns containing any of these substrings are ignored.
    pub excluded_markers: Vec<String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            excluded_markers: vec!["_ci_".to_string(), "_significant".to_string()],
        }
    }
}

impl EnrichmentConfig {
    pub fn is_excluded(&self, column: &str) -> bool {
        self.excluded_markers
            .iter()
            .any(|marker| column.contains(marker.as_str()))
    }
}

impl ExplorerConfig {
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(input).context("Parsing explorer configuration YAML")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut file =
            File::open(path).with_context(|| format!("Opening configuration file {path:?}"))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)
            .with_context(|| format!("Reading configuration file {path:?}"))?;
        Self::from_yaml_str(&buf).with_context(|| format!("Loading configuration from {path:?}"))
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing explorer configuration")
    }
}
