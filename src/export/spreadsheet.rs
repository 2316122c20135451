//! Workbook encoder: one worksheet per table, typed cells, styled header.

use crate::error::PipelineError;
use crate::export::coerce::CellValue;
use crate::table::TableSet;
use chrono::Datelike;
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook, XlsxError};

/// Worksheet-name length limit imposed by the workbook format.
const SHEET_NAME_MAX: usize = 31;

/// Column width bounds (character units) for autosizing.
const MIN_COL_WIDTH: f64 = 10.0;
const MAX_COL_WIDTH: f64 = 60.0;

pub(super) fn encode(tables: &TableSet) -> Result<Vec<u8>, PipelineError> {
    build(tables).map_err(|e| PipelineError::Generation {
        detail: format!("workbook encoding failed: {e}"),
    })
}

fn build(tables: &TableSet) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");

    let mut used_names: Vec<String> = Vec::new();
    for table in &tables.tables {
        let name = sheet_name(&table.name, &mut used_names);
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&name)?;

        for (col, header) in table.headers.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, header, &header_format)?;
        }
        if !table.headers.is_empty() {
            worksheet.set_freeze_panes(1, 0)?;
        }

        let header_rows = if table.headers.is_empty() { 0 } else { 1 };
        for (r, row) in table.rows.iter().enumerate() {
            let row_idx = (r + header_rows) as u32;
            for (c, cell) in row.iter().enumerate() {
                let col = c as u16;
                match CellValue::from_cell(cell) {
                    CellValue::Number(n) => {
                        worksheet.write_number(row_idx, col, n)?;
                    }
                    CellValue::Date(d) => {
                        let dt =
                            ExcelDateTime::from_ymd(d.year() as u16, d.month() as u8, d.day() as u8)?;
                        worksheet.write_datetime_with_format(row_idx, col, &dt, &date_format)?;
                    }
                    CellValue::Text(s) => {
                        worksheet.write_string(row_idx, col, &s)?;
                    }
                }
            }
        }

        for col in 0..table.column_count() {
            let header_len = table.headers.get(col).map(String::len).unwrap_or(0);
            let content_len = table
                .rows
                .iter()
                .filter_map(|row| row.get(col))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0);
            let width = (header_len.max(content_len) as f64 + 2.0)
                .clamp(MIN_COL_WIDTH, MAX_COL_WIDTH);
            worksheet.set_column_width(col as u16, width)?;
        }
    }

    // A workbook must carry at least one sheet to open.
    if tables.tables.is_empty() {
        workbook.add_worksheet().set_name("main")?;
    }

    workbook.save_to_buffer()
}

/// Sanitize a table name into a legal, unique worksheet name.
fn sheet_name(raw: &str, used: &mut Vec<String>) -> String {
    let mut cleaned: String = raw
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' | '\'' => '_',
            c => c,
        })
        .collect();
    if cleaned.trim().is_empty() {
        cleaned = "sheet".to_string();
    }
    let mut truncated: String = cleaned.chars().take(SHEET_NAME_MAX).collect();
    let mut counter = 2;
    while used.iter().any(|n| n == &truncated) {
        let suffix = format!("_{counter}");
        let keep = SHEET_NAME_MAX - suffix.len();
        truncated = cleaned.chars().take(keep).collect::<String>() + &suffix;
        counter += 1;
    }
    used.push(truncated.clone());
    truncated
}
