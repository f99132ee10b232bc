//! Filter, sort and custom-transform operations and the ordered chain that
//! holds them.

use std::cmp::Ordering;

use anyhow::{Result, anyhow};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    data::{display_string, parse_finite},
    flatten::DisplayRow,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationKind {
    Filter {
        column: String,
        values: Vec<String>,
        #[serde(default)]
        negated: bool,
    },
    Custom {
        code: String,
    },
    Sort {
        column: String,
        direction: SortDirection,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataOperation {
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(flatten)]
    pub kind: OperationKind,
}

impl DataOperation {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().timestamp_millis(),
            kind,
        }
    }

    pub fn filter(column: impl Into<String>, values: Vec<String>, negated: bool) -> Self {
        Self::new(OperationKind::Filter {
            column: column.into(),
            values,
            negated,
        })
    }

    pub fn sort(column: impl Into<String>, direction: SortDirection) -> Self {
        Self::new(OperationKind::Sort {
            column: column.into(),
            direction,
        })
    }

    pub fn custom(code: impl Into<String>) -> Self {
        Self::new(OperationKind::Custom { code: code.into() })
    }

    pub fn is_sort(&self) -> bool {
        matches!(self.kind, OperationKind::Sort { .. })
    }
}

/// Parses `column[:asc|desc]` into a sort operation.
pub fn parse_sort(spec: &str) -> Result<DataOperation> {
    let mut parts = spec.split(':');
    let column = parts
        .next()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("Sort directive is missing a column"))?;
    let direction = match parts.next().unwrap_or("asc").trim().to_ascii_lowercase().as_str() {
        "asc" => SortDirection::Asc,
        "desc" => SortDirection::Desc,
        other => return Err(anyhow!("Unknown sort direction '{other}'")),
    };
    Ok(DataOperation::sort(column, direction))
}

/// Ordered operation list. Holds at most one sort.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationChain {
    operations: Vec<DataOperation>,
}

impl OperationChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an operation. A new sort replaces any existing one.
    pub fn push(&mut self, operation: DataOperation) {
        if operation.is_sort() {
            self.operations.retain(|op| !op.is_sort());
        }
        self.operations.push(operation);
    }

    /// Removes the operation with `id`; returns whether one was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.operations.len();
        self.operations.retain(|op| op.id != id);
        self.operations.len() != before
    }

    pub fn clear(&mut self) {
        self.operations.clear();
    }

    pub fn operations(&self) -> &[DataOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl FromIterator<DataOperation> for OperationChain {
    fn from_iter<T: IntoIterator<Item = DataOperation>>(iter: T) -> Self {
        let mut chain = OperationChain::new();
        for op in iter {
            chain.push(op);
        }
        chain
    }
}

/// Keeps rows matching every filter. A row matches one filter when its cell's
/// string form is among the filter values, inverted for negated filters.
pub fn apply_filters(rows: Vec<DisplayRow>, operations: &[DataOperation]) -> Vec<DisplayRow> {
    let filters = operations
        .iter()
        .filter_map(|op| match &op.kind {
            OperationKind::Filter {
                column,
                values,
                negated,
            } => Some((column.as_str(), values.as_slice(), *negated)),
            _ => None,
        })
        .collect::<Vec<_>>();
    if filters.is_empty() {
        return rows;
    }
    rows.into_iter()
        .filter(|row| {
            filters.iter().all(|(column, values, negated)| {
                let cell = display_string(row.get(column));
                values.contains(&cell) != *negated
            })
        })
        .collect()
}

/// Applies the last sort in `operations`, if any. The sort is stable.
pub fn apply_sort(rows: Vec<DisplayRow>, operations: &[DataOperation]) -> Vec<DisplayRow> {
    let sort = operations.iter().rev().find_map(|op| match &op.kind {
        OperationKind::Sort { column, direction } => Some((column.as_str(), *direction)),
        _ => None,
    });
    let Some((column, direction)) = sort else {
        return rows;
    };
    let mut keyed = rows
        .into_iter()
        .map(|row| (SortKey::of(row.get(column)), row))
        .collect::<Vec<_>>();
    keyed.sort_by(|(a, _), (b, _)| compare_keys(a.as_ref(), b.as_ref(), direction));
    keyed.into_iter().map(|(_, row)| row).collect()
}

/// Orderable form of a present cell. Numbers sort before text.
#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    Number(f64),
    Text(String),
}

impl SortKey {
    /// `None` for absent and null cells.
    pub fn of(value: Option<&Value>) -> Option<Self> {
        let value = value.filter(|v| !v.is_null())?;
        let text = display_string(Some(value));
        Some(match parse_finite(&text) {
            Some(number) => SortKey::Number(number),
            None => SortKey::Text(text.to_lowercase()),
        })
    }

    fn rank(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            (SortKey::Number(_), SortKey::Text(_)) => Ordering::Less,
            (SortKey::Text(_), SortKey::Number(_)) => Ordering::Greater,
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
        }
    }
}

fn compare_keys(left: Option<&SortKey>, right: Option<&SortKey>, direction: SortDirection) -> Ordering {
    let ordering = match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(l), Some(r)) => l.rank(r),
    };
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

/// Missing cells trail in ascending order and lead in descending order.
/// Numeric cells compare numerically and come before text, which compares
/// case-insensitively.
pub fn compare_cells(
    left: Option<&Value>,
    right: Option<&Value>,
    direction: SortDirection,
) -> Ordering {
    compare_keys(
        SortKey::of(left).as_ref(),
        SortKey::of(right).as_ref(),
        direction,
    )
}
