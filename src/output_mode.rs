use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// How a result is delivered to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Table,
    Xlsx,
}

/// What the caller asked for. `Auto` defers to the generator and the prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestedMode {
    #[default]
    Auto,
    Table,
    Xlsx,
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Table => f.write_str("table"),
            OutputMode::Xlsx => f.write_str("xlsx"),
        }
    }
}

impl FromStr for RequestedMode {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(RequestedMode::Auto),
            "table" => Ok(RequestedMode::Table),
            "xlsx" => Ok(RequestedMode::Xlsx),
            other => Err(GatewayError::Input {
                message: format!(
                    "unsupported output mode \"{other}\"; supported: auto, table, xlsx"
                ),
            }),
        }
    }
}

/// Prompt fragments that ask for a file rather than an on-screen table.
const FILE_KEYWORDS: &[&str] = &[
    "xlsx",
    "excel",
    "spreadsheet",
    "export",
    "download",
    "выгруз",
    "скач",
    "файл",
];

/// Pick the delivery mode.
///
/// An explicit `table`/`xlsx` hint wins; anything else falls back to keyword
/// matching on the prompt.
pub fn detect_output_mode(prompt: &str, hint: &str) -> OutputMode {
    match hint.trim().to_ascii_lowercase().as_str() {
        "table" => return OutputMode::Table,
        "xlsx" => return OutputMode::Xlsx,
        _ => {}
    }

    let lower = prompt.to_lowercase();
    if FILE_KEYWORDS.iter().any(|keyword| lower.contains(keyword)) {
        OutputMode::Xlsx
    } else {
        OutputMode::Table
    }
}

/// Final mode for a prompt request: the caller's explicit choice, else the
/// generator's suggestion, else the prompt keywords.
pub fn resolve_output_mode(prompt: &str, requested: RequestedMode, suggested: &str) -> OutputMode {
    match requested {
        RequestedMode::Table => OutputMode::Table,
        RequestedMode::Xlsx => OutputMode::Xlsx,
        RequestedMode::Auto => detect_output_mode(prompt, suggested),
    }
}
