//! Reflowable document encoder.
//!
//! Emits one word-processor table per structured table, with a bold header
//! row, preceded by the table name as a heading paragraph. Cell text is
//! carried verbatim; only the spreadsheet encoder re-types values.

use crate::error::PipelineError;
use crate::table::TableSet;
use docx_rs::{Docx, Paragraph, Run, Table, TableCell, TableRow};
use std::io::Cursor;

pub(super) fn encode(tables: &TableSet) -> Result<Vec<u8>, PipelineError> {
    let mut doc = Docx::new();

    for table in &tables.tables {
        doc = doc.add_paragraph(
            Paragraph::new().add_run(Run::new().add_text(table.name.as_str()).bold().size(28)),
        );

        let mut rows: Vec<TableRow> = Vec::new();
        if !table.headers.is_empty() {
            let cells = table
                .headers
                .iter()
                .map(|h| {
                    TableCell::new().add_paragraph(
                        Paragraph::new().add_run(Run::new().add_text(h.as_str()).bold()),
                    )
                })
                .collect();
            rows.push(TableRow::new(cells));
        }
        for row in &table.rows {
            let cells = row
                .iter()
                .map(|cell| {
                    TableCell::new().add_paragraph(
                        Paragraph::new().add_run(Run::new().add_text(cell.as_str())),
                    )
                })
                .collect();
            rows.push(TableRow::new(cells));
        }

        if !rows.is_empty() {
            doc = doc.add_table(Table::new(rows));
        }
        // Spacer so consecutive tables do not merge visually.
        doc = doc.add_paragraph(Paragraph::new());
    }

    let mut buffer = Cursor::new(Vec::new());
    doc.build()
        .pack(&mut buffer)
        .map_err(|e| PipelineError::Generation {
            detail: format!("flow document packing failed: {e}"),
        })?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::StructuredTable;

    #[test]
    fn document_packs_as_zip_container() {
        let tables = TableSet::new(vec![StructuredTable::new(
            "main",
            vec!["Key".into(), "Value".into()],
            vec![vec!["Account".into(), "1000123".into()]],
        )]);
        let bytes = encode(&tables).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn headerless_table_still_packs() {
        let tables = TableSet::new(vec![StructuredTable::new(
            "raw",
            Vec::new(),
            vec![vec!["line one".into()], vec!["line two".into()]],
        )]);
        assert!(encode(&tables).is_ok());
    }
}
