use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::content::{self, ContentShape, ReportStructure, TabularFrame};
use crate::docx_writer::DocxOptions;
use crate::error::{ToolError, ToolResult};
use crate::registry::{Capability, DocumentFormat, FormatRegistry};
use crate::shared_utils::{display_name, extension_of, parent_dir, write_atomically};
use crate::xlsx_writer::{AppendResult, SheetFormatting};

/// What a successful write produced
#[derive(Debug, Clone, Serialize)]
pub struct WriteOutcome {
    pub file_path: String,
    pub message: String,
    pub bytes_written: u64,
    /// Sheet names or section titles written, in order
    pub sections: Vec<String>,
}

/// Builds DOCX and XLSX files fully in memory, then persists them atomically
#[derive(Debug, Clone)]
pub struct ConstructionFacade {
    registry: Arc<FormatRegistry>,
    max_column_width: f64,
}

impl ConstructionFacade {
    pub fn new(registry: Arc<FormatRegistry>, max_column_width: f64) -> Self {
        Self {
            registry,
            max_column_width,
        }
    }

    /// Create a DOCX document from line-oriented text
    pub fn create_document(&self, content: &str, target: &Path, options: &DocxOptions) -> ToolResult<WriteOutcome> {
        self.check_destination(target, DocumentFormat::Docx)?;
        options.validate()?;

        let bytes = render_docx(content, options).map_err(|e| ToolError::write_failed(&e))?;
        let sections = options.title.iter().cloned().collect();
        self.persist(target, &bytes, "DOCX document created", sections)
    }

    /// Create a DOCX report from `{title, summary?, sections}`
    pub fn create_docx_report(&self, report: &Value, target: &Path) -> ToolResult<WriteOutcome> {
        self.check_destination(target, DocumentFormat::Docx)?;
        let report = ReportStructure::from_docx_value(report)?;

        let bytes = render_docx_report(&report, &DocxOptions::default()).map_err(|e| ToolError::write_failed(&e))?;
        self.persist(target, &bytes, "DOCX report created", report.section_titles())
    }

    /// Create a workbook with one sheet per entry of a `{sheet: content}` mapping
    pub fn create_workbook(&self, data: &Value, target: &Path, apply_formatting: bool) -> ToolResult<WriteOutcome> {
        self.check_destination(target, DocumentFormat::Xlsx)?;
        let sheets = content::parse_sheets(data)?;

        let bytes = render_workbook(&sheets, self.formatting(apply_formatting)).map_err(|e| ToolError::write_failed(&e))?;
        let names = sheets.into_iter().map(|(name, _)| name).collect();
        self.persist(target, &bytes, "XLSX workbook created", names)
    }

    /// Create a workbook with one sheet per tabular frame
    pub fn create_from_frames(
        &self,
        frames: &Value,
        target: &Path,
        include_index: bool,
        apply_formatting: bool,
    ) -> ToolResult<WriteOutcome> {
        self.check_destination(target, DocumentFormat::Xlsx)?;
        if !self.registry.has_capability(Capability::TabularEngine) {
            return Err(ToolError::capability_unavailable("xlsx", "tabular engine"));
        }
        let frames = content::parse_frames(frames)?;

        let bytes = render_frames(&frames, include_index, self.formatting(apply_formatting))
            .map_err(|e| ToolError::write_failed(&e))?;
        let names = frames.into_iter().map(|(name, _)| name).collect();
        self.persist(target, &bytes, "XLSX workbook created from dataframes", names)
    }

    /// Append rows to a sheet of an existing workbook
    pub fn append(&self, target: &Path, sheet_name: &str, data: &Value, create_missing: bool) -> ToolResult<WriteOutcome> {
        self.check_writable(target, DocumentFormat::Xlsx)?;
        if !target.is_file() {
            return Err(ToolError::not_found(format!("Workbook not found: {}", target.display())));
        }
        content::validate_sheet_name(sheet_name)?;
        let rows = ContentShape::from_value(data)?.to_rows(false, false);

        match append_xlsx(target, sheet_name, &rows, create_missing).map_err(|e| ToolError::write_failed(&e))? {
            AppendResult::MissingSheet => Err(ToolError::section_not_found(format!(
                "Sheet '{}' not found in {}",
                sheet_name,
                display_name(target)
            ))),
            AppendResult::Appended {
                bytes,
                sheet_name,
                first_row,
                created_sheet,
            } => {
                let message = if created_sheet {
                    format!("Created sheet '{}' with {} rows", sheet_name, rows.len())
                } else {
                    format!(
                        "Appended {} rows to sheet '{}' starting at row {}",
                        rows.len(),
                        sheet_name,
                        first_row
                    )
                };
                self.persist(target, &bytes, &message, vec![sheet_name])
            }
        }
    }

    /// Create a workbook report: a Summary sheet and one sheet per section
    pub fn create_xlsx_report(&self, report: &Value, target: &Path) -> ToolResult<WriteOutcome> {
        self.check_destination(target, DocumentFormat::Xlsx)?;
        let report = ReportStructure::from_xlsx_value(report)?;

        let bytes = render_xlsx_report(&report, self.formatting(true)).map_err(|e| ToolError::write_failed(&e))?;
        let mut sheets = vec![content::SUMMARY_SHEET.to_string()];
        sheets.extend(report.section_titles());
        self.persist(target, &bytes, "XLSX report created", sheets)
    }

    fn formatting(&self, apply: bool) -> SheetFormatting {
        SheetFormatting {
            apply,
            max_column_width: self.max_column_width,
        }
    }

    /// Extension matches the requested format and a writer is available
    fn check_writable(&self, target: &Path, format: DocumentFormat) -> ToolResult<()> {
        let extension = extension_of(target).unwrap_or_default();
        let descriptor = match self.registry.lookup(&extension) {
            Some(descriptor) if descriptor.format == format => descriptor,
            _ => return Err(ToolError::unsupported_format(&extension, &[format.extension()])),
        };
        if !descriptor.write_available {
            return Err(ToolError::capability_unavailable(&descriptor.extension, "writer"));
        }
        Ok(())
    }

    /// Writable format and an existing parent directory; directories are never created
    fn check_destination(&self, target: &Path, format: DocumentFormat) -> ToolResult<()> {
        self.check_writable(target, format)?;

        let parent = parent_dir(target);
        if !parent.is_dir() {
            return Err(ToolError::invalid_destination(format!(
                "Directory does not exist: {}",
                parent.display()
            )));
        }
        if target.is_dir() {
            return Err(ToolError::invalid_destination(format!(
                "Target is a directory: {}",
                target.display()
            )));
        }
        Ok(())
    }

    fn persist(&self, target: &Path, bytes: &[u8], what: &str, sections: Vec<String>) -> ToolResult<WriteOutcome> {
        let bytes_written = write_atomically(target, bytes).map_err(|e| ToolError::write_failed(&e))?;
        log::info!("{}: {} ({} bytes)", what, target.display(), bytes_written);

        Ok(WriteOutcome {
            file_path: target.display().to_string(),
            message: format!("{}: {}", what, target.display()),
            bytes_written,
            sections,
        })
    }
}

fn render_docx(content: &str, options: &DocxOptions) -> anyhow::Result<Vec<u8>> {
    #[cfg(feature = "docx")]
    return crate::docx_writer::build_document(content, options);
    #[cfg(not(feature = "docx"))]
    {
        let _ = (content, options);
        anyhow::bail!("DOCX writer not available (feature \"docx\" not enabled)")
    }
}

fn render_docx_report(report: &ReportStructure, options: &DocxOptions) -> anyhow::Result<Vec<u8>> {
    #[cfg(feature = "docx")]
    return crate::docx_writer::build_report(report, options);
    #[cfg(not(feature = "docx"))]
    {
        let _ = (report, options);
        anyhow::bail!("DOCX writer not available (feature \"docx\" not enabled)")
    }
}

fn render_workbook(sheets: &[(String, ContentShape)], formatting: SheetFormatting) -> anyhow::Result<Vec<u8>> {
    #[cfg(feature = "xlsx")]
    return crate::xlsx_writer::build_workbook(sheets, formatting);
    #[cfg(not(feature = "xlsx"))]
    {
        let _ = (sheets, formatting);
        anyhow::bail!("Spreadsheet engine not available (feature \"xlsx\" not enabled)")
    }
}

fn render_frames(
    frames: &[(String, TabularFrame)],
    include_index: bool,
    formatting: SheetFormatting,
) -> anyhow::Result<Vec<u8>> {
    #[cfg(feature = "xlsx")]
    return crate::xlsx_writer::build_frames_workbook(frames, include_index, formatting);
    #[cfg(not(feature = "xlsx"))]
    {
        let _ = (frames, include_index, formatting);
        anyhow::bail!("Spreadsheet engine not available (feature \"xlsx\" not enabled)")
    }
}

fn render_xlsx_report(report: &ReportStructure, formatting: SheetFormatting) -> anyhow::Result<Vec<u8>> {
    #[cfg(feature = "xlsx")]
    return crate::xlsx_writer::build_report(report, formatting);
    #[cfg(not(feature = "xlsx"))]
    {
        let _ = (report, formatting);
        anyhow::bail!("Spreadsheet engine not available (feature \"xlsx\" not enabled)")
    }
}

fn append_xlsx(
    target: &Path,
    sheet_name: &str,
    rows: &[content::Row],
    create_missing: bool,
) -> anyhow::Result<AppendResult> {
    #[cfg(feature = "xlsx")]
    return crate::xlsx_writer::append_rows(target, sheet_name, rows, create_missing);
    #[cfg(not(feature = "xlsx"))]
    {
        let _ = (target, sheet_name, rows, create_missing);
        anyhow::bail!("Spreadsheet engine not available (feature \"xlsx\" not enabled)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;
    use tempfile::tempdir;

    fn facade() -> ConstructionFacade {
        ConstructionFacade::new(Arc::new(FormatRegistry::all_available()), 50.0)
    }

    #[test]
    fn test_missing_parent_is_invalid_destination() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("missing").join("out.docx");
        let err = facade()
            .create_document("text", &target, &DocxOptions::default())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidDestination);
        assert!(!dir.path().join("missing").exists());
    }

    #[test]
    fn test_wrong_extension_is_unsupported() {
        let dir = tempdir().unwrap();
        let err = facade()
            .create_document("text", &dir.path().join("out.pdf"), &DocxOptions::default())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedFormat);

        let err = facade()
            .create_workbook(&json!({"A": [[1]]}), &dir.path().join("out.docx"), true)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn test_writer_unavailable() {
        let dir = tempdir().unwrap();
        let registry = FormatRegistry::with_availability(|c| c != Capability::OoxmlWriter, &[]);
        let facade = ConstructionFacade::new(Arc::new(registry), 50.0);
        let err = facade
            .create_document("text", &dir.path().join("out.docx"), &DocxOptions::default())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::CapabilityUnavailable);
    }

    #[test]
    fn test_frames_need_tabular_engine() {
        let dir = tempdir().unwrap();
        let registry = FormatRegistry::with_availability(|c| c != Capability::TabularEngine, &[]);
        let facade = ConstructionFacade::new(Arc::new(registry), 50.0);
        let err = facade
            .create_from_frames(&json!({"A": {"x": [1]}}), &dir.path().join("f.xlsx"), true, true)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::CapabilityUnavailable);
    }

    #[test]
    fn test_append_missing_target_creates_nothing() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("absent.xlsx");
        let err = facade().append(&target, "Sheet1", &json!([[1, 2]]), true).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(!target.exists());
    }

    #[test]
    fn test_report_without_title_leaves_no_file() {
        let dir = tempdir().unwrap();

        let target = dir.path().join("report.docx");
        let err = facade()
            .create_docx_report(&json!({"sections": [{"title": "A"}]}), &target)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
        assert!(!target.exists());

        let target = dir.path().join("report.xlsx");
        let err = facade()
            .create_xlsx_report(&json!({"data": {"A": [[1]]}}), &target)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
        assert!(!target.exists());
    }

    #[test]
    fn test_invalid_options_rejected_before_write() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("out.docx");
        let options = DocxOptions {
            line_spacing: 0.0,
            ..Default::default()
        };
        let err = facade().create_document("text", &target, &options).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
        assert!(!target.exists());
    }
}
