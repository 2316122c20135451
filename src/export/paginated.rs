//! Fixed-layout page encoder.
//!
//! Renders each table as a column grid on A4 pages. Layout is deliberately
//! simple: fixed line height, equal column widths, automatic page breaks.
//! Cell text is rendered exactly as it appears in the table model; only the
//! spreadsheet encoder re-types values.
//!
//! The builtin Helvetica faces cover Latin-1 only, so the encoder embeds a
//! Unicode TTF when one can be found (a configured path, then known system
//! locations with Ethiopic coverage) and falls back to Helvetica as a last
//! resort. Amharic statement cells would otherwise render as undefined
//! glyphs.

use crate::error::PipelineError;
use crate::table::TableSet;
use printpdf::{
    BuiltinFont, FontId, Mm, Op, ParsedFont, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg,
    Point, Pt, TextItem,
};
use std::path::PathBuf;
use tracing::debug;

const PAGE_W_MM: f32 = 210.0;
const PAGE_H_MM: f32 = 297.0;
const MARGIN_MM: f32 = 15.0;
const TITLE_SIZE_PT: f32 = 13.0;
const BODY_SIZE_PT: f32 = 9.0;
const LINE_HEIGHT_PT: f32 = 13.0;

/// Overrides the embedded page font with an explicit TTF path.
const FONT_PATH_ENV: &str = "DOC2TABLE_PDF_FONT";

/// Fonts with Ethiopic coverage, tried in order.
const SYSTEM_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/abyssinica/AbyssinicaSIL-Regular.ttf",
    "/usr/share/fonts/truetype/noto/NotoSansEthiopic-Regular.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
];

/// Font selection for one line of text: a builtin face or an embedded one.
#[derive(Clone)]
enum Face {
    Builtin(BuiltinFont),
    Embedded(FontId),
}

pub(super) fn encode(tables: &TableSet) -> Result<Vec<u8>, PipelineError> {
    let page_w = Mm(PAGE_W_MM);
    let page_h = Mm(PAGE_H_MM);
    let margin_pt = Mm(MARGIN_MM).into_pt().0;
    let page_h_pt = page_h.into_pt().0;
    let usable_w_pt = Mm(PAGE_W_MM - 2.0 * MARGIN_MM).into_pt().0;

    let mut doc = PdfDocument::new("Extracted Tables");
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();

    // Embedded fonts carry no bold variant here, so titles and headers are
    // set apart by size alone when one is in use.
    let (title_face, header_face, body_face) = match load_unicode_font(&mut doc, &mut warnings) {
        Some(id) => (
            Face::Embedded(id.clone()),
            Face::Embedded(id.clone()),
            Face::Embedded(id),
        ),
        None => (
            Face::Builtin(BuiltinFont::HelveticaBold),
            Face::Builtin(BuiltinFont::HelveticaBold),
            Face::Builtin(BuiltinFont::Helvetica),
        ),
    };

    let mut pages: Vec<PdfPage> = Vec::new();
    let mut ops: Vec<Op> = Vec::new();
    // Cursor measured in lines from the top of the usable area.
    let mut line: usize = 0;
    let lines_per_page = ((page_h_pt - 2.0 * margin_pt) / LINE_HEIGHT_PT) as usize;

    let flush_page = |ops: &mut Vec<Op>, pages: &mut Vec<PdfPage>| {
        pages.push(PdfPage::new(page_w, page_h, std::mem::take(ops)));
    };

    for table in &tables.tables {
        let columns = table.column_count().max(1);
        let col_w_pt = usable_w_pt / columns as f32;

        // Table title, header row, then data rows. Each needs a line; break
        // the page first when fewer than three lines remain so a title is
        // never orphaned at the bottom.
        if line + 3 > lines_per_page && line > 0 {
            flush_page(&mut ops, &mut pages);
            line = 0;
        }

        let y_for = |line: usize| page_h_pt - margin_pt - (line as f32 * LINE_HEIGHT_PT);

        write_line(
            &mut ops,
            margin_pt,
            y_for(line),
            TITLE_SIZE_PT,
            &title_face,
            &table.name,
        );
        line += 1;

        if !table.headers.is_empty() {
            for (c, header) in table.headers.iter().enumerate() {
                write_line(
                    &mut ops,
                    margin_pt + c as f32 * col_w_pt,
                    y_for(line),
                    BODY_SIZE_PT,
                    &header_face,
                    &clip(header, col_w_pt),
                );
            }
            line += 1;
            // Separator under the header in lieu of ruled borders.
            let dashes = "-".repeat((usable_w_pt / 4.0) as usize);
            write_line(
                &mut ops,
                margin_pt,
                y_for(line),
                BODY_SIZE_PT,
                &body_face,
                &clip(&dashes, usable_w_pt),
            );
            line += 1;
        }

        for row in &table.rows {
            if line >= lines_per_page {
                flush_page(&mut ops, &mut pages);
                line = 0;
            }
            for (c, cell) in row.iter().enumerate() {
                // Cells render as-is: only the spreadsheet re-types values.
                write_line(
                    &mut ops,
                    margin_pt + c as f32 * col_w_pt,
                    y_for(line),
                    BODY_SIZE_PT,
                    &body_face,
                    &clip(cell, col_w_pt),
                );
            }
            line += 1;
        }

        // Blank line between tables.
        line += 1;
    }

    if !ops.is_empty() || pages.is_empty() {
        pages.push(PdfPage::new(page_w, page_h, std::mem::take(&mut ops)));
    }
    doc.with_pages(pages);

    let bytes = doc.save(&PdfSaveOptions::default(), &mut warnings);
    if bytes.is_empty() {
        return Err(PipelineError::Generation {
            detail: "page document serialization produced no bytes".to_string(),
        });
    }
    Ok(bytes)
}

/// Register the first usable Unicode font with the document.
///
/// Returns `None` when no candidate path holds a parseable font, in which
/// case the caller stays on the builtin faces.
fn load_unicode_font(doc: &mut PdfDocument, warnings: &mut Vec<PdfWarnMsg>) -> Option<FontId> {
    for path in font_candidates(std::env::var(FONT_PATH_ENV).ok().as_deref()) {
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        if let Some(parsed) = ParsedFont::from_bytes(&bytes, 0, warnings) {
            debug!(path = %path.display(), "embedding page font");
            return Some(doc.add_font(&parsed));
        }
        debug!(path = %path.display(), "font file present but unparseable, trying next");
    }
    None
}

/// Candidate font paths in priority order: the configured override first,
/// then the known system locations.
fn font_candidates(custom: Option<&str>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(path) = custom {
        if !path.trim().is_empty() {
            candidates.push(PathBuf::from(path));
        }
    }
    candidates.extend(SYSTEM_FONT_PATHS.iter().map(PathBuf::from));
    candidates
}

fn write_line(ops: &mut Vec<Op>, x_pt: f32, y_pt: f32, size_pt: f32, face: &Face, text: &str) {
    if text.is_empty() {
        return;
    }
    ops.push(Op::StartTextSection);
    ops.push(Op::SetTextCursor {
        pos: Point {
            x: Pt(x_pt),
            y: Pt(y_pt),
        },
    });
    match face {
        Face::Builtin(font) => {
            ops.push(Op::SetFontSizeBuiltinFont {
                size: Pt(size_pt),
                font: *font,
            });
            ops.push(Op::WriteTextBuiltinFont {
                items: vec![TextItem::Text(text.to_string())],
                font: *font,
            });
        }
        Face::Embedded(font) => {
            ops.push(Op::SetFontSize {
                size: Pt(size_pt),
                font: font.clone(),
            });
            ops.push(Op::WriteText {
                items: vec![TextItem::Text(text.to_string())],
                font: font.clone(),
            });
        }
    }
    ops.push(Op::EndTextSection);
}

/// Clip text to roughly fit a column, with an ellipsis when truncated.
///
/// Helvetica at 9pt averages about 0.5 * size in pt per glyph; good enough
/// for keeping columns from overlapping.
fn clip(text: &str, width_pt: f32) -> String {
    let max_chars = ((width_pt / (0.5 * BODY_SIZE_PT)) as usize).max(1);
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{kept}…")
}
