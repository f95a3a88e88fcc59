use crate::content::Row;

/// Header fill used by the default sheet formatting
pub const HEADER_FILL_ARGB: &str = "FF366092";
const HEADER_FONT_ARGB: &str = "FFFFFFFF";

/// Formatting applied to freshly written sheets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SheetFormatting {
    pub apply: bool,
    pub max_column_width: f64,
}

/// Result of appending rows to an existing workbook
#[derive(Debug)]
pub enum AppendResult {
    Appended {
        bytes: Vec<u8>,
        /// Name of the sheet as stored in the workbook
        sheet_name: String,
        first_row: u32,
        created_sheet: bool,
    },
    /// The sheet does not exist and creating it was not allowed
    MissingSheet,
}

/// Width for each column: longest displayed value plus padding, capped
pub fn column_widths(rows: &[Row], max_width: f64) -> Vec<f64> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    (0..width)
        .map(|col| {
            let longest = rows
                .iter()
                .filter_map(|row| row.get(col))
                .map(|cell| cell.display().chars().count())
                .max()
                .unwrap_or(0);
            ((longest + 2) as f64).min(max_width)
        })
        .collect()
}

#[cfg(feature = "xlsx")]
mod render {
    use std::io::Cursor;
    use std::path::Path;

    use anyhow::{Context, Result};
    use umya_spreadsheet::helper::coordinate::string_from_column_index;
    use umya_spreadsheet::{Border, HorizontalAlignmentValues, Spreadsheet, Worksheet};

    use super::{AppendResult, HEADER_FILL_ARGB, HEADER_FONT_ARGB, SheetFormatting, column_widths};
    use crate::content::{CellValue, ContentShape, ReportStructure, Row, SUMMARY_SHEET, SectionBody, TabularFrame};

    /// One sheet per entry, in order
    pub fn build_workbook(sheets: &[(String, ContentShape)], formatting: SheetFormatting) -> Result<Vec<u8>> {
        let mut book = umya_spreadsheet::new_file_empty_worksheet();
        for (name, shape) in sheets {
            write_sheet(&mut book, name, &shape.to_rows(false, true), formatting)?;
        }
        serialize(&book)
    }

    /// One sheet per frame, header row first and the index as column A when requested
    pub fn build_frames_workbook(
        frames: &[(String, TabularFrame)],
        include_index: bool,
        formatting: SheetFormatting,
    ) -> Result<Vec<u8>> {
        let mut book = umya_spreadsheet::new_file_empty_worksheet();
        for (name, frame) in frames {
            write_sheet(&mut book, name, &frame.to_rows(include_index, true), formatting)?;
        }
        serialize(&book)
    }

    /// Summary sheet (title, generation time, description) followed by one sheet per section
    pub fn build_report(report: &ReportStructure, formatting: SheetFormatting) -> Result<Vec<u8>> {
        let mut book = umya_spreadsheet::new_file_empty_worksheet();

        let summary = add_sheet(&mut book, SUMMARY_SHEET)?;
        summary.get_cell_mut((1, 1)).set_value_string(report.title.as_str());
        let title_font = summary.get_style_mut((1, 1)).get_font_mut();
        title_font.set_bold(true);
        title_font.set_size(16.0);
        summary.get_cell_mut((1, 2)).set_value_string(format!(
            "Generated: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        if let Some(description) = &report.summary {
            summary.get_cell_mut((1, 3)).set_value_string(description.as_str());
        }

        for section in &report.sections {
            let rows: Vec<Row> = match &section.body {
                SectionBody::None => Vec::new(),
                SectionBody::Text(text) => text
                    .lines()
                    .map(|line| vec![CellValue::Text(line.to_string())])
                    .collect(),
                SectionBody::Items(items) => items
                    .iter()
                    .map(|item| vec![CellValue::Text(item.clone())])
                    .collect(),
                SectionBody::Data(shape) => shape.to_rows(false, true),
            };
            write_sheet(&mut book, &section.title, &rows, formatting)?;
        }

        serialize(&book)
    }

    /// Add rows after the last used row of a sheet, leaving existing cells and styles alone
    pub fn append_rows(path: &Path, sheet_name: &str, rows: &[Row], create_missing: bool) -> Result<AppendResult> {
        let mut book = umya_spreadsheet::reader::xlsx::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to open workbook {}: {}", path.display(), e))?;

        let existing = book
            .get_sheet_collection()
            .iter()
            .map(|sheet| sheet.get_name().to_string())
            .find(|name| name.eq_ignore_ascii_case(sheet_name));

        let (sheet, stored_name, created_sheet) = match existing {
            Some(name) => {
                let sheet = book
                    .get_sheet_by_name_mut(&name)
                    .with_context(|| format!("Sheet '{}' disappeared while appending", name))?;
                (sheet, name, false)
            }
            None if create_missing => (add_sheet(&mut book, sheet_name)?, sheet_name.to_string(), true),
            None => return Ok(AppendResult::MissingSheet),
        };

        let first_row = sheet.get_highest_row() + 1;
        write_rows(sheet, rows, first_row);
        log::debug!(
            "Appending {} rows to sheet '{}' of {} at row {}",
            rows.len(),
            stored_name,
            path.display(),
            first_row
        );

        Ok(AppendResult::Appended {
            bytes: serialize(&book)?,
            sheet_name: stored_name,
            first_row,
            created_sheet,
        })
    }

    fn add_sheet<'a>(book: &'a mut Spreadsheet, name: &str) -> Result<&'a mut Worksheet> {
        book.new_sheet(name)
            .map_err(|e| anyhow::anyhow!("Failed to add sheet '{}': {}", name, e))
    }

    fn write_sheet(book: &mut Spreadsheet, name: &str, rows: &[Row], formatting: SheetFormatting) -> Result<()> {
        let sheet = add_sheet(book, name)?;
        write_rows(sheet, rows, 1);
        if formatting.apply {
            apply_default_formatting(sheet, rows, formatting.max_column_width);
        }
        Ok(())
    }

    fn write_rows(sheet: &mut Worksheet, rows: &[Row], first_row: u32) {
        for (r, row) in rows.iter().enumerate() {
            let row_num = first_row + r as u32;
            for (c, value) in row.iter().enumerate() {
                let coordinate = (c as u32 + 1, row_num);
                match value {
                    CellValue::Empty => {}
                    CellValue::Text(text) => {
                        sheet.get_cell_mut(coordinate).set_value_string(text.as_str());
                    }
                    CellValue::Number(n) => {
                        sheet.get_cell_mut(coordinate).set_value_number(*n);
                    }
                    CellValue::Bool(b) => {
                        sheet.get_cell_mut(coordinate).set_value_bool(*b);
                    }
                }
            }
        }
    }

    /// Bold white header on a blue fill, thin borders on every filled cell, auto column widths
    fn apply_default_formatting(sheet: &mut Worksheet, rows: &[Row], max_column_width: f64) {
        if let Some(header) = rows.first() {
            for col in 1..=header.len() as u32 {
                let style = sheet.get_style_mut((col, 1));
                let font = style.get_font_mut();
                font.set_bold(true);
                font.get_color_mut().set_argb(HEADER_FONT_ARGB);
                style.set_background_color(HEADER_FILL_ARGB);
                style
                    .get_alignment_mut()
                    .set_horizontal(HorizontalAlignmentValues::Center);
            }
        }

        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                let borders = sheet.get_style_mut((c as u32 + 1, r as u32 + 1)).get_borders_mut();
                borders.get_left_mut().set_border_style(Border::BORDER_THIN);
                borders.get_right_mut().set_border_style(Border::BORDER_THIN);
                borders.get_top_mut().set_border_style(Border::BORDER_THIN);
                borders.get_bottom_mut().set_border_style(Border::BORDER_THIN);
            }
        }

        for (index, width) in column_widths(rows, max_column_width).into_iter().enumerate() {
            let column = string_from_column_index(&(index as u32 + 1));
            sheet.get_column_dimension_mut(&column).set_width(width);
        }
    }

    fn serialize(book: &Spreadsheet) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        umya_spreadsheet::writer::xlsx::write_writer(book, &mut cursor)
            .map_err(|e| anyhow::anyhow!("Failed to serialize workbook: {}", e))?;
        Ok(cursor.into_inner())
    }

    /// Write a one-cell workbook in memory and read it back with calamine; used by the startup prober
    pub fn probe() -> Result<()> {
        use calamine::{Data, Reader, Xlsx};

        let mut book = umya_spreadsheet::new_file_empty_worksheet();
        add_sheet(&mut book, "Probe")?
            .get_cell_mut((1, 1))
            .set_value_string("probe");
        let bytes = serialize(&book)?;

        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
            .with_context(|| "calamine could not open a generated workbook")?;
        let range = workbook
            .worksheet_range("Probe")
            .with_context(|| "Generated workbook has no Probe sheet")?;
        anyhow::ensure!(
            range.get_value((0, 0)) == Some(&Data::String("probe".to_string())),
            "Generated workbook lost its cell value"
        );
        Ok(())
    }
}

#[cfg(feature = "xlsx")]
pub use render::{append_rows, build_frames_workbook, build_report, build_workbook, probe};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::CellValue;

    #[test]
    fn test_column_widths_are_capped() {
        let rows = vec![
            vec![CellValue::Text("id".into()), CellValue::Text("x".repeat(80))],
            vec![CellValue::Number(12345.0)],
        ];
        assert_eq!(column_widths(&rows, 50.0), vec![7.0, 50.0]);
        assert!(column_widths(&[], 50.0).is_empty());
    }

    #[cfg(feature = "xlsx")]
    #[test]
    fn test_probe() {
        assert!(probe().is_ok());
    }

    #[cfg(feature = "xlsx")]
    #[test]
    fn test_append_to_missing_sheet_without_create() {
        use crate::content::ContentShape;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        let sheets = vec![("Data".to_string(), ContentShape::PlainText("a\nb".into()))];
        let formatting = SheetFormatting {
            apply: true,
            max_column_width: 50.0,
        };
        std::fs::write(&path, build_workbook(&sheets, formatting).unwrap()).unwrap();

        let rows = vec![vec![CellValue::Text("c".into())]];
        assert!(matches!(
            append_rows(&path, "Other", &rows, false).unwrap(),
            AppendResult::MissingSheet
        ));
        match append_rows(&path, "data", &rows, false).unwrap() {
            AppendResult::Appended {
                sheet_name,
                first_row,
                created_sheet,
                ..
            } => {
                assert_eq!(sheet_name, "Data");
                assert_eq!(first_row, 3);
                assert!(!created_sheet);
            }
            AppendResult::MissingSheet => panic!("sheet should exist"),
        }
    }
}
