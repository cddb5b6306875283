use crate::error::GatewayError;
use crate::gateway::SpreadsheetResponse;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Print a value to stdout as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<(), GatewayError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| GatewayError::Format {
        message: e.to_string(),
    })?;
    println!("{}", text);
    Ok(())
}

/// Print error to stderr in the contract format: error: <category>: <message>
pub fn print_error(err: &GatewayError) {
    eprintln!("error: {}", err);
}

/// Where a spreadsheet lands: a directory (or nothing, meaning the current
/// directory) gets the derived filename; any other path is used as-is.
pub fn spreadsheet_path(destination: Option<&Path>, filename: &str) -> PathBuf {
    match destination {
        Some(path) if path.is_dir() => path.join(filename),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(filename),
    }
}

/// Write the spreadsheet bytes and return the path written.
pub fn write_spreadsheet(
    response: &SpreadsheetResponse,
    destination: Option<&Path>,
) -> Result<PathBuf, GatewayError> {
    let path = spreadsheet_path(destination, &response.filename);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        return Err(GatewayError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("parent directory does not exist: {}", parent.display()),
        )));
    }
    std::fs::write(&path, &response.bytes)?;
    Ok(path)
}

/// Print the file summary to stdout. `sql` is the statement that produced it.
pub fn print_summary(path: &Path, rows: usize, sql: &str) -> Result<(), GatewayError> {
    let mut map = serde_json::Map::new();
    map.insert(
        "file".to_string(),
        serde_json::Value::String(path.display().to_string()),
    );
    map.insert(
        "rows_written".to_string(),
        serde_json::Value::Number(serde_json::Number::from(rows)),
    );
    map.insert("sql".to_string(), serde_json::Value::String(sql.to_string()));
    print_json(&serde_json::Value::Object(map))
}
