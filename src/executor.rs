//! Row-transform executors for custom operations.
//!
//! A custom operation hands the current rows and its code to an executor and
//! gets rows back. Failures of the code itself travel in
//! [`TransformResponse::error`]; only transport problems are `Err`.
//!
//! [`ExpressionExecutor`] runs in-process. Its code is one statement per line:
//!
//! ```text
//! # keep long answers from the larger model
//! filter word_count(model_response) > 50
//! answer_length = len(model_response)
//! ```

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use evalexpr::{
    ContextWithMutableFunctions, ContextWithMutableVariables, EvalexprError, Function,
    HashMapContext, Value as EvalValue, eval_with_context,
};
use heck::ToSnakeCase;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    data::{evalexpr_to_json, json_to_evalexpr, normalize_column_name},
    error::ExecutorError,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformRequest {
    pub rows: Vec<Map<String, Value>>,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformResponse {
    pub rows: Vec<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransformResponse {
    pub fn failed(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.trim().is_empty())
    }
}

#[async_trait(?Send)]
pub trait RowTransformExecutor {
    async fn execute(&self, request: TransformRequest) -> Result<TransformResponse, ExecutorError>;
}

/// Executor for sessions without custom-code support; every call fails softly.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExecutor;

#[async_trait(?Send)]
impl RowTransformExecutor for NoopExecutor {
    async fn execute(&self, request: TransformRequest) -> Result<TransformResponse, ExecutorError> {
        Ok(TransformResponse {
            rows: request.rows,
            error: Some("Custom code execution is not available".to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Statement {
    Filter(String),
    Assign { name: String, expression: String },
}

fn parse_program(code: &str) -> Result<Vec<Statement>> {
    let mut statements = Vec::new();
    for (line_no, line) in code.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("filter ") {
            let expression = rest.trim();
            if expression.is_empty() {
                bail!("Line {}: filter is missing an expression", line_no + 1);
            }
            statements.push(Statement::Filter(expression.to_string()));
            continue;
        }
        let (name, expression) = trimmed
            .split_once('=')
            .ok_or_else(|| anyhow!("Line {}: expected `filter <expr>` or `name = <expr>`", line_no + 1))?;
        let name = name.trim();
        let expression = expression.trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            bail!("Line {}: invalid field name '{name}'", line_no + 1);
        }
        if expression.is_empty() || expression.starts_with('=') {
            bail!("Line {}: field '{name}' is missing an expression", line_no + 1);
        }
        statements.push(Statement::Assign {
            name: name.to_string(),
            expression: expression.to_string(),
        });
    }
    Ok(statements)
}

/// In-process executor evaluating `filter` and assignment statements with
/// `evalexpr`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionExecutor;

impl ExpressionExecutor {
    pub fn run(&self, rows: &[Map<String, Value>], code: &str) -> Result<Vec<Map<String, Value>>> {
        let program = parse_program(code)?;
        let mut output = Vec::with_capacity(rows.len());
        'rows: for (idx, row) in rows.iter().enumerate() {
            let mut row = row.clone();
            for statement in &program {
                let context = build_context(&row, idx + 1)?;
                match statement {
                    Statement::Filter(expression) => {
                        let result = eval_with_context(expression, &context)
                            .with_context(|| format!("Evaluating filter '{expression}'"))?;
                        if !eval_value_truthy(result) {
                            continue 'rows;
                        }
                    }
                    Statement::Assign { name, expression } => {
                        let result = eval_with_context(expression, &context)
                            .with_context(|| format!("Evaluating expression for field '{name}'"))?;
                        row.insert(name.clone(), evalexpr_to_json(result));
                    }
                }
            }
            output.push(row);
        }
        Ok(output)
    }
}

#[async_trait(?Send)]
impl RowTransformExecutor for ExpressionExecutor {
    async fn execute(&self, request: TransformRequest) -> Result<TransformResponse, ExecutorError> {
        match self.run(&request.rows, &request.code) {
            Ok(rows) => Ok(TransformResponse { rows, error: None }),
            Err(err) => Ok(TransformResponse {
                rows: request.rows,
                error: Some(format!("{err:#}")),
            }),
        }
    }
}

/// Binds every field of `row` by normalized name. Nested objects such as score
/// dictionaries bind one variable per entry as `<field>_<key>`.
pub fn build_context(row: &Map<String, Value>, row_number: usize) -> Result<HashMapContext> {
    let mut context = HashMapContext::new();
    register_functions(&mut context)?;
    for (field, value) in row {
        let canon = normalize_column_name(field);
        if let Value::Object(nested) = value {
            for (key, inner) in nested {
                let name = format!("{canon}_{}", normalize_column_name(key));
                context
                    .set_value(name, json_to_evalexpr(inner))
                    .with_context(|| format!("Binding field '{field}.{key}'"))?;
            }
        } else {
            context
                .set_value(canon, json_to_evalexpr(value))
                .with_context(|| format!("Binding field '{field}'"))?;
        }
    }
    context
        .set_value("row_number".to_string(), EvalValue::Int(row_number as i64))
        .context("Binding row_number")?;
    Ok(context)
}

fn register_functions(context: &mut HashMapContext) -> Result<()> {
    context
        .set_function(
            "lowercase".into(),
            Function::new(|arguments| {
                let args = expect_args(arguments, 1, "lowercase")?;
                Ok(EvalValue::String(expect_string(&args[0], "value")?.to_lowercase()))
            }),
        )
        .map_err(anyhow::Error::from)?;

    context
        .set_function(
            "uppercase".into(),
            Function::new(|arguments| {
                let args = expect_args(arguments, 1, "uppercase")?;
                Ok(EvalValue::String(expect_string(&args[0], "value")?.to_uppercase()))
            }),
        )
        .map_err(anyhow::Error::from)?;

    context
        .set_function(
            "trim".into(),
            Function::new(|arguments| {
                let args = expect_args(arguments, 1, "trim")?;
                Ok(EvalValue::String(expect_string(&args[0], "value")?.trim().to_string()))
            }),
        )
        .map_err(anyhow::Error::from)?;

    context
        .set_function(
            "snake_case".into(),
            Function::new(|arguments| {
                let args = expect_args(arguments, 1, "snake_case")?;
                Ok(EvalValue::String(expect_string(&args[0], "value")?.to_snake_case()))
            }),
        )
        .map_err(anyhow::Error::from)?;

    context
        .set_function(
            "contains".into(),
            Function::new(|arguments| {
                let args = expect_args(arguments, 2, "contains")?;
                let haystack = expect_string(&args[0], "value")?;
                let needle = expect_string(&args[1], "needle")?;
                Ok(EvalValue::Boolean(haystack.contains(needle)))
            }),
        )
        .map_err(anyhow::Error::from)?;

    context
        .set_function(
            "regex_match".into(),
            Function::new(|arguments| {
                let args = expect_args(arguments, 2, "regex_match")?;
                let value = expect_string(&args[0], "value")?;
                let pattern = expect_string(&args[1], "pattern")?;
                let regex = Regex::new(pattern)
                    .map_err(|err| eval_error(&format!("Invalid regex: {err}")))?;
                Ok(EvalValue::Boolean(regex.is_match(value)))
            }),
        )
        .map_err(anyhow::Error::from)?;

    context
        .set_function(
            "word_count".into(),
            Function::new(|arguments| {
                let args = expect_args(arguments, 1, "word_count")?;
                let value = expect_string(&args[0], "value")?;
                Ok(EvalValue::Int(value.split_whitespace().count() as i64))
            }),
        )
        .map_err(anyhow::Error::from)?;

    Ok(())
}

fn expect_args(
    arguments: &EvalValue,
    expected: usize,
    name: &str,
) -> Result<Vec<EvalValue>, EvalexprError> {
    match arguments {
        value if expected == 1 && !matches!(value, EvalValue::Tuple(_)) => Ok(vec![value.clone()]),
        EvalValue::Tuple(values) if values.len() == expected => Ok(values.clone()),
        _ => Err(eval_error(&format!("{name} expects {expected} argument(s)"))),
    }
}

fn eval_error(message: &str) -> EvalexprError {
    EvalexprError::CustomMessage(message.to_string())
}

fn expect_string<'a>(value: &'a EvalValue, name: &str) -> Result<&'a str, EvalexprError> {
    if let EvalValue::String(s) = value {
        Ok(s)
    } else {
        Err(eval_error(&format!("Expected string for {name}")))
    }
}

pub fn eval_value_truthy(value: EvalValue) -> bool {
    match value {
        EvalValue::Boolean(b) => b,
        EvalValue::Int(i) => i != 0,
        EvalValue::Float(f) => f != 0.0,
        EvalValue::String(s) => !s.is_empty(),
        EvalValue::Tuple(values) => values.into_iter().any(eval_value_truthy),
        EvalValue::Empty => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows() -> Vec<Map<String, Value>> {
        vec![
            json!({"__index": 0, "model_response": "Paris is the capital", "score": {"accuracy": 1.0}}),
            json!({"__index": 1, "model_response": "No idea", "score": {"accuracy": 0.0}}),
        ]
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect()
    }

    #[test]
    fn filter_and_assign_statements_apply_in_order() {
        let code = "# keep accurate rows\nfilter score_accuracy > 0.5\nwords = word_count(model_response)";
        let out = ExpressionExecutor.run(&rows(), code).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["words"], json!(4));
        assert_eq!(out[0]["__index"], json!(0));
    }

    #[test]
    fn assignments_can_feed_later_filters() {
        let code = "shouty = uppercase(model_response)\nfilter contains(shouty, \"NO\")";
        let out = ExpressionExecutor.run(&rows(), code).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["shouty"], json!("NO IDEA"));
    }

    #[test]
    fn row_number_is_one_based() {
        let out = ExpressionExecutor.run(&rows(), "n = row_number").unwrap();
        assert_eq!(out[1]["n"], json!(2));
    }

    #[test]
    fn malformed_programs_are_rejected() {
        assert!(parse_program("just words").is_err());
        assert!(parse_program("bad name = 1").is_err());
        assert!(parse_program("filter ").is_err());
        assert!(parse_program("x == 1").is_err());
        assert_eq!(
            parse_program("\n# only comments\n").unwrap(),
            Vec::<Statement>::new()
        );
    }

    #[test]
    fn unknown_variables_surface_as_errors() {
        assert!(ExpressionExecutor.run(&rows(), "filter missing_field > 1").is_err());
    }
}
