use thiserror::Error;

/// A column mapping failed validation; carries every rule it broke.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid column mapping: {}", .errors.join("; "))]
pub struct MappingError {
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairingError {
    #[error(
        "No paired rows found for models '{model_a}' and '{model_b}'. Each question needs exactly one row per model."
    )]
    NoPairs { model_a: String, model_b: String },
    #[error("Tidy pairing requires selected models in the column mapping")]
    MissingSelection,
}

/// A JSON record could not be read back as a canonical row.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowShapeError {
    #[error("Row is not a JSON object")]
    NotAnObject,
    #[error("Row is missing required field '{0}'")]
    MissingField(&'static str),
    #[error("Row field '{field}' has an unexpected value: {detail}")]
    InvalidField { field: &'static str, detail: String },
}

/// Transport-level failure of a row-transform executor or external service. Failures reported
/// through the response's `error` field are not errors in this sense.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
