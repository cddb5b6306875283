use rust_xlsxwriter::{Workbook, XlsxError};

use crate::backend::QueryResult;
use crate::error::GatewayError;

pub const SHEET_NAME: &str = "AI Query";
pub const CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Render a result as a single-sheet workbook.
///
/// Row 0 holds the column names; every value is written as text, and nulls
/// become empty cells.
pub fn to_xlsx(result: &QueryResult) -> Result<Vec<u8>, GatewayError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME).map_err(format_error)?;

    for (col, name) in result.columns.iter().enumerate() {
        sheet
            .write_string(0, column_index(col)?, name.as_str())
            .map_err(format_error)?;
    }

    for (i, row) in result.rows.iter().enumerate() {
        let row_idx = u32::try_from(i + 1).map_err(|_| GatewayError::Format {
            message: "too many rows for a worksheet".to_string(),
        })?;
        for col in 0..result.columns.len() {
            let text = row.get(col).map(|v| v.display_string()).unwrap_or_default();
            sheet
                .write_string(row_idx, column_index(col)?, text)
                .map_err(format_error)?;
        }
    }

    workbook.save_to_buffer().map_err(format_error)
}

fn column_index(col: usize) -> Result<u16, GatewayError> {
    u16::try_from(col).map_err(|_| GatewayError::Format {
        message: "too many columns for a worksheet".to_string(),
    })
}

fn format_error(e: XlsxError) -> GatewayError {
    GatewayError::Format {
        message: format!("xlsx build failed: {}", e),
    }
}
