use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, Event};
use serde::Serialize;
use zip::ZipArchive;

/// Format-dependent metadata attached to an extraction envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_names: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slide_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paragraph_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Text and metadata produced by one format reader
#[derive(Debug, Clone, Default)]
pub struct ExtractedDocument {
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// Read one XML part out of an OOXML package
pub(crate) fn read_zip_part(path: &Path, part_name: &str, kind: &str) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open {} file: {}", kind, path.display()))?;

    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("Failed to read {} file as ZIP archive", kind))?;

    let mut part = archive
        .by_name(part_name)
        .with_context(|| format!("{} file has no {} part", kind, part_name))?;

    let mut contents = String::new();
    part.read_to_string(&mut contents)
        .with_context(|| format!("Failed to read {} from {} file", part_name, kind))?;

    Ok(contents)
}

/// Resolve `&amp;`-style and numeric character references inside text runs
pub(crate) fn push_entity(out: &mut String, entity: &BytesRef) {
    if let Ok(Some(ch)) = entity.resolve_char_ref() {
        out.push(ch);
    } else if let Ok(name) = entity.decode() {
        if let Some(resolved) = resolve_predefined_entity(&name) {
            out.push_str(resolved);
        }
    }
}

/// Read a DOCX file: body paragraphs one per line, table rows as ` | `-joined cells
pub fn read_docx(path: &Path) -> Result<ExtractedDocument> {
    let xml = read_zip_part(path, "word/document.xml", "DOCX")?;
    parse_document_xml(&xml)
}

fn parse_document_xml(xml_content: &str) -> Result<ExtractedDocument> {
    let mut reader = Reader::from_str(xml_content);
    reader.config_mut().trim_text(false);

    let mut lines: Vec<String> = Vec::new();
    let mut paragraph = String::new();
    let mut cell = String::new();
    let mut row_cells: Vec<String> = Vec::new();
    let mut in_text_element = false;
    let mut table_depth = 0usize;
    let mut paragraph_count = 0usize;
    let mut table_count = 0usize;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"w:p" => paragraph.clear(),
                b"w:t" => in_text_element = true,
                b"w:tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        table_count += 1;
                    }
                }
                b"w:tr" => row_cells.clear(),
                b"w:tc" => cell.clear(),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"w:tab" => paragraph.push('\t'),
                b"w:br" | b"w:cr" => paragraph.push('\n'),
                b"w:p" if table_depth == 0 => lines.push(String::new()),
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"w:t" => in_text_element = false,
                b"w:p" => {
                    let text = paragraph.trim();
                    if table_depth > 0 {
                        if !text.is_empty() {
                            if !cell.is_empty() {
                                cell.push(' ');
                            }
                            cell.push_str(text);
                        }
                    } else {
                        // Body paragraphs keep their whitespace; empty ones become blank lines
                        if !text.is_empty() {
                            paragraph_count += 1;
                        }
                        lines.push(std::mem::take(&mut paragraph));
                    }
                    paragraph.clear();
                }
                b"w:tc" => {
                    let text = cell.trim();
                    if !text.is_empty() {
                        row_cells.push(text.to_string());
                    }
                    cell.clear();
                }
                b"w:tr" => {
                    if !row_cells.is_empty() {
                        lines.push(row_cells.join(" | "));
                    }
                    row_cells.clear();
                }
                b"w:tbl" => table_depth = table_depth.saturating_sub(1),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_element {
                    let text = std::str::from_utf8(&e)
                        .with_context(|| "DOCX text run is not valid UTF-8")?;
                    paragraph.push_str(text);
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if in_text_element {
                    push_entity(&mut paragraph, &e);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Error parsing DOCX XML at position {}: {}",
                    reader.buffer_position(),
                    e
                ));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(ExtractedDocument {
        text: lines.join("\n"),
        metadata: DocumentMetadata {
            paragraph_count: Some(paragraph_count),
            table_count: Some(table_count),
            ..Default::default()
        },
    })
}

/// Package a one-paragraph document in memory and read it back; used by the startup prober
pub fn probe() -> Result<()> {
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file("word/document.xml", SimpleFileOptions::default())?;
    writer.write_all(
        br#"<w:document xmlns:w="w"><w:body><w:p><w:r><w:t>probe</w:t></w:r></w:p></w:body></w:document>"#,
    )?;
    let cursor = writer.finish()?;

    let mut archive = ZipArchive::new(cursor)?;
    let mut xml = String::new();
    archive.by_name("word/document.xml")?.read_to_string(&mut xml)?;

    let doc = parse_document_xml(&xml)?;
    anyhow::ensure!(doc.text == "probe", "OOXML reader returned unexpected text");
    Ok(())
}

/// Read an XLSX workbook: per-sheet dimensions, columns, sample rows and a numeric summary
#[cfg(feature = "xlsx")]
pub fn read_xlsx(path: &Path, sample_rows: usize) -> Result<ExtractedDocument> {
    use calamine::{Reader as _, Xlsx, open_workbook};
    use crate::shared_utils::display_name;

    let mut workbook: Xlsx<_> = open_workbook(path)
        .with_context(|| format!("Failed to open Excel file: {}", path.display()))?;

    let sheet_names = workbook.sheet_names();

    let mut text = String::new();
    text.push_str(&format!("Excel Workbook: {}\n", display_name(path)));
    text.push_str(&format!("Number of sheets: {}\n", sheet_names.len()));
    text.push_str(&"=".repeat(50));
    text.push_str("\n\n");

    for sheet_name in &sheet_names {
        match workbook.worksheet_range(sheet_name) {
            Ok(range) => {
                let rows: Vec<Vec<String>> = range
                    .rows()
                    .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                    .collect();
                let numeric: Vec<Vec<Option<f64>>> = range
                    .rows()
                    .map(|row| row.iter().map(cell_as_number).collect())
                    .collect();
                text.push_str(&render_sheet(sheet_name, &rows, &numeric, sample_rows));
            }
            Err(e) => {
                log::warn!("Failed to read sheet '{}' of {}: {}", sheet_name, path.display(), e);
                text.push_str(&format!("Error reading sheet '{}': {}\n\n", sheet_name, e));
            }
        }
    }

    Ok(ExtractedDocument {
        text,
        metadata: DocumentMetadata {
            sheet_names: Some(sheet_names),
            ..Default::default()
        },
    })
}

#[cfg(feature = "xlsx")]
fn cell_as_number(cell: &calamine::Data) -> Option<f64> {
    match cell {
        calamine::Data::Int(i) => Some(*i as f64),
        calamine::Data::Float(f) => Some(*f),
        _ => None,
    }
}

/// Render one sheet; the first row is treated as the header
pub(crate) fn render_sheet(
    sheet_name: &str,
    rows: &[Vec<String>],
    numeric: &[Vec<Option<f64>>],
    sample_rows: usize,
) -> String {
    use crate::shared_utils::rows_to_markdown_table;

    let mut out = format!("=== Sheet: {} ===\n", sheet_name);

    let Some(header) = rows.first() else {
        out.push_str("Dimensions: 0 rows x 0 columns\nSheet is empty\n\n");
        return out;
    };

    let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    let data_rows = rows.len() - 1;
    out.push_str(&format!("Dimensions: {} rows x {} columns\n", data_rows, width));

    let column_name = |col: usize| -> String {
        match header.get(col) {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("Column {}", col + 1),
        }
    };

    out.push_str("\nColumns:\n");
    out.push_str(&(0..width).map(column_name).collect::<Vec<_>>().join(", "));
    out.push('\n');

    if data_rows == 0 {
        out.push_str("\nSheet has a header row only\n\n");
        return out;
    }

    let shown = data_rows.min(sample_rows);
    out.push_str(&format!("\nSample Data (first {} rows):\n", shown));
    out.push_str(&rows_to_markdown_table(&rows[..=shown]));

    let mut summary = Vec::new();
    for col in 0..width {
        let values: Vec<f64> = numeric
            .iter()
            .skip(1)
            .filter_map(|row| row.get(col).copied().flatten())
            .collect();
        if values.is_empty() {
            continue;
        }
        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        summary.push(format!(
            "{}: count={}, mean={:.2}, min={}, max={}",
            column_name(col),
            count,
            mean,
            min,
            max
        ));
    }
    if !summary.is_empty() {
        out.push_str("\nNumeric Summary:\n");
        out.push_str(&summary.join("\n"));
        out.push('\n');
    }

    out.push_str("\nNon-empty Values:\n");
    for col in 0..width {
        let non_empty = rows
            .iter()
            .skip(1)
            .filter(|row| row.get(col).is_some_and(|c| !c.is_empty()))
            .count();
        out.push_str(&format!("{}: {}/{}\n", column_name(col), non_empty, data_rows));
    }
    out.push('\n');

    out
}
