pub mod sqlite;

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::Serialize;

use crate::error::GatewayError;

/// A single cell value, already normalized to a JSON-safe primitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl CellValue {
    /// String form used for spreadsheet cells. Null becomes empty.
    pub fn display_string(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Integer(i) => i.to_string(),
            CellValue::Real(f) => f.to_string(),
            CellValue::Text(s) => s.clone(),
        }
    }
}

/// Rows returned by the executor. `columns` are unique and each row holds
/// one value per column, in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    /// Row collection stopped at the row cap; the statement may have had more.
    pub truncated: bool,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Executes validated statements.
pub trait Backend {
    fn execute(
        &self,
        sql: &str,
        max_rows: usize,
        timeout: Duration,
    ) -> impl std::future::Future<Output = Result<QueryResult, GatewayError>> + Send;
}

/// Make column names unique by suffixing repeats with ` (n)`.
pub fn unique_column_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut occurrences = HashMap::<String, usize>::new();
    let mut used = HashSet::<String>::new();
    let mut out = Vec::new();
    for name in names {
        let base: String = name.into();
        let count = occurrences.entry(base.clone()).or_insert(0);
        *count += 1;
        let mut candidate = if *count == 1 {
            base.clone()
        } else {
            format!("{} ({})", base, count)
        };
        while used.contains(&candidate) {
            *count += 1;
            candidate = format!("{} ({})", base, count);
        }
        used.insert(candidate.clone());
        out.push(candidate);
    }
    out
}
