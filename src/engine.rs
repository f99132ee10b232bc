//! Replays an operation chain over canonical rows.
//!
//! Evaluation order is fixed regardless of the order operations were added:
//! every custom transform (in chain order) against operational rows, then
//! flattening, then all filters, then the single sort. Nothing is memoized;
//! removing an operation means replaying the whole chain from the base rows.

use log::{debug, warn};
use serde_json::Value;

use crate::{
    error::RowShapeError,
    executor::{RowTransformExecutor, TransformRequest},
    flatten::{DisplayRow, ModelNames, flatten_rows},
    operations::{DataOperation, OperationKind, apply_filters, apply_sort},
    rows::OperationalRow,
};

/// A custom operation that failed and was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomFailure {
    pub operation_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChainOutput {
    pub rows: Vec<DisplayRow>,
    pub score_columns: Vec<String>,
    /// Operational rows after custom transforms, before flatten/filter/sort.
    pub transformed: Vec<OperationalRow>,
    pub failures: Vec<CustomFailure>,
}

pub async fn apply_chain<E>(
    base: &[OperationalRow],
    operations: &[DataOperation],
    names: Option<&ModelNames>,
    executor: &E,
) -> ChainOutput
where
    E: RowTransformExecutor + ?Sized,
{
    let mut rows = base.to_vec();
    let mut failures = Vec::new();

    for operation in operations {
        let OperationKind::Custom { code } = &operation.kind else {
            continue;
        };
        match run_custom(&rows, code, executor).await {
            Ok(transformed) => {
                debug!(
                    "Custom operation {} produced {} row(s) from {}",
                    operation.id,
                    transformed.len(),
                    rows.len()
                );
                rows = transformed;
            }
            Err(message) => {
                warn!("Custom operation {} failed: {message}", operation.id);
                failures.push(CustomFailure {
                    operation_id: operation.id.clone(),
                    message,
                });
            }
        }
    }

    let (display, score_columns) = apply_view(&rows, operations, names);
    ChainOutput {
        rows: display,
        score_columns,
        transformed: rows,
        failures,
    }
}

/// Flattens `rows` and applies the chain's filters and sort.
pub fn apply_view(
    rows: &[OperationalRow],
    operations: &[DataOperation],
    names: Option<&ModelNames>,
) -> (Vec<DisplayRow>, Vec<String>) {
    let flat = flatten_rows(rows, names);
    let filtered = apply_filters(flat.rows, operations);
    (apply_sort(filtered, operations), flat.score_columns)
}

async fn run_custom<E>(
    rows: &[OperationalRow],
    code: &str,
    executor: &E,
) -> Result<Vec<OperationalRow>, String>
where
    E: RowTransformExecutor + ?Sized,
{
    let Some(method) = rows.first().map(OperationalRow::method) else {
        return Ok(Vec::new());
    };
    let request = TransformRequest {
        rows: rows.iter().map(OperationalRow::to_json).collect(),
        code: code.to_string(),
    };
    let response = executor
        .execute(request)
        .await
        .map_err(|err| err.to_string())?;
    if let Some(error) = response.failed() {
        return Err(error.to_string());
    }
    response
        .rows
        .into_iter()
        .map(|row| OperationalRow::from_json(&Value::Object(row), method))
        .collect::<Result<Vec<_>, RowShapeError>>()
        .map_err(|err| format!("Transform returned a malformed row: {err}"))
}
