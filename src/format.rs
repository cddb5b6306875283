use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::backend::{CellValue, QueryResult};
use crate::catalog::ViewDefinition;
use crate::output_mode::OutputMode;

/// JSON body for a table-mode response.
#[derive(Debug, Clone, Serialize)]
pub struct TableResponse {
    pub prompt: String,
    pub title: String,
    /// The sanitized statement that was executed.
    pub sql: String,
    pub output_mode: OutputMode,
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub row_count: usize,
    pub unlimited: bool,
    pub human_readable: bool,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaView {
    pub name: String,
    pub description: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaResponse {
    pub enabled: bool,
    pub max_rows: usize,
    pub views: Vec<SchemaView>,
}

impl From<&ViewDefinition> for SchemaView {
    fn from(view: &ViewDefinition) -> Self {
        Self {
            name: view.name.to_string(),
            description: view.description.to_string(),
            columns: view.columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Convert rows into JSON objects keyed by column, preserving column order.
pub fn rows_to_json(result: &QueryResult) -> Vec<serde_json::Map<String, serde_json::Value>> {
    result
        .rows
        .iter()
        .map(|row| {
            let mut map = serde_json::Map::new();
            for (i, column) in result.columns.iter().enumerate() {
                let value = row.get(i).unwrap_or(&CellValue::Null);
                map.insert(column.clone(), cell_to_json(value));
            }
            map
        })
        .collect()
}

fn cell_to_json(value: &CellValue) -> serde_json::Value {
    match value {
        CellValue::Null => serde_json::Value::Null,
        CellValue::Bool(b) => serde_json::Value::Bool(*b),
        CellValue::Integer(i) => serde_json::Value::from(*i),
        // NaN and infinities have no JSON form.
        CellValue::Real(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        CellValue::Text(s) => serde_json::Value::String(s.clone()),
    }
}

pub fn timestamp_rfc3339(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}
