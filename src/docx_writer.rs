use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{ToolError, ToolResult};

static SECTION_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^={3,}\s*(.*?)\s*={3,}$").expect("valid section heading pattern"));
static SUB_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:--|##)[-#\s]*(.*?)[-#\s]*$").expect("valid sub heading pattern"));
static BULLET_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-*•]\s+(.*?)\s*$").expect("valid bullet pattern"));
static NUMBERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[.)]\s+\S").expect("valid numbered item pattern"));

/// Page and text settings for a created document
#[derive(Debug, Clone, PartialEq)]
pub struct DocxOptions {
    pub title: Option<String>,
    pub font_name: String,
    /// Points
    pub font_size: f64,
    /// Multiple of single spacing
    pub line_spacing: f64,
    /// Inches, applied to all four sides
    pub margins: f64,
    pub add_page_numbers: bool,
}

impl Default for DocxOptions {
    fn default() -> Self {
        Self {
            title: None,
            font_name: "Calibri".to_string(),
            font_size: 11.0,
            line_spacing: 1.15,
            margins: 1.0,
            add_page_numbers: true,
        }
    }
}

impl DocxOptions {
    pub fn validate(&self) -> ToolResult<()> {
        if self.font_name.trim().is_empty() {
            return Err(ToolError::invalid_request("font_name must not be empty"));
        }
        if !(1.0..=400.0).contains(&self.font_size) {
            return Err(ToolError::invalid_request(format!(
                "font_size must be between 1 and 400 points, got {}",
                self.font_size
            )));
        }
        if !(0.5..=10.0).contains(&self.line_spacing) {
            return Err(ToolError::invalid_request(format!(
                "line_spacing must be between 0.5 and 10, got {}",
                self.line_spacing
            )));
        }
        if !(0.0..=5.0).contains(&self.margins) {
            return Err(ToolError::invalid_request(format!(
                "margins must be between 0 and 5 inches, got {}",
                self.margins
            )));
        }
        Ok(())
    }
}

/// How one line of document content is rendered
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContentLine<'a> {
    Heading2(&'a str),
    Heading3(&'a str),
    Bullet(&'a str),
    /// Numbered item, kept with its number as written
    Numbered(&'a str),
    Paragraph(&'a str),
    /// Empty or whitespace-only line
    Blank(&'a str),
}

/// Classify a line of content. Paragraph, numbered and blank lines carry the
/// line untouched so plain text survives a write and read back.
pub fn classify_line(line: &str) -> ContentLine<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ContentLine::Blank(line);
    }

    if let Some(text) = marker_text(&SECTION_HEADING, trimmed) {
        ContentLine::Heading2(text)
    } else if let Some(text) = marker_text(&SUB_HEADING, trimmed) {
        ContentLine::Heading3(text)
    } else if let Some(text) = marker_text(&BULLET_ITEM, trimmed) {
        ContentLine::Bullet(text)
    } else if NUMBERED_ITEM.is_match(trimmed) {
        ContentLine::Numbered(line)
    } else {
        ContentLine::Paragraph(line)
    }
}

/// Text after a markup marker; a bare marker has none
fn marker_text<'a>(pattern: &Regex, line: &'a str) -> Option<&'a str> {
    pattern
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|text| !text.is_empty())
}

/// Drop characters XML 1.0 cannot carry (C0 controls other than tab, newline
/// and carriage return, and the U+FFFE/U+FFFF noncharacters)
pub fn xml_safe(text: &str) -> Cow<'_, str> {
    let allowed = |c: char| matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}');
    if text.chars().all(allowed) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.chars().filter(|&c| allowed(c)).collect())
    }
}

/// Split `**bold**` markup into (text, bold) segments
pub fn split_bold(text: &str) -> Vec<(&str, bool)> {
    text.split("**")
        .enumerate()
        .filter(|(_, part)| !part.is_empty())
        .map(|(i, part)| (part, i % 2 == 1))
        .collect()
}

#[cfg(feature = "docx")]
mod render {
    use std::io::{Cursor, Read};

    use anyhow::{Context, Result};
    use docx_rs::{
        AbstractNumbering, AlignmentType, Docx, Footer, IndentLevel, Level, LevelJc, LevelText,
        LineSpacing, NumberFormat, Numbering, NumberingId, PageMargin, PageNum, Paragraph, Run,
        RunFonts, SpecialIndentType, Start, Style, StyleType,
    };

    use super::{ContentLine, DocxOptions, classify_line, split_bold, xml_safe};
    use crate::content::{ReportSection, ReportStructure, SectionBody};

    const BULLET_NUMBERING: usize = 1;
    /// Twips; the number hangs in the first half inch
    const NUMBERED_INDENT: i32 = 720;
    const TWIPS_PER_INCH: f64 = 1440.0;

    /// Build a document from line-oriented content
    pub fn build_document(content: &str, options: &DocxOptions) -> Result<Vec<u8>> {
        let mut docx = base_document(options);

        if let Some(title) = options.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            docx = docx.add_paragraph(title_paragraph(title, options));
        }

        for line in content.lines() {
            docx = docx.add_paragraph(render_line(classify_line(line), options));
        }

        pack(docx)
    }

    /// Build a report: centered title, executive summary, then sections with
    /// their subsections one heading level down
    pub fn build_report(report: &ReportStructure, options: &DocxOptions) -> Result<Vec<u8>> {
        let mut docx = base_document(options).add_paragraph(title_paragraph(&report.title, options));

        if let Some(summary) = &report.summary {
            docx = docx.add_paragraph(heading("Heading2", "Executive Summary", options));
            for line in summary.lines().map(str::trim).filter(|l| !l.is_empty()) {
                docx = docx.add_paragraph(body_paragraph(line, options));
            }
        }

        for section in &report.sections {
            docx = add_section(docx, section, "Heading2", options);
        }

        pack(docx)
    }

    fn add_section(mut docx: Docx, section: &ReportSection, style: &str, options: &DocxOptions) -> Docx {
        docx = docx.add_paragraph(heading(style, &section.title, options));

        match &section.body {
            SectionBody::None => {}
            SectionBody::Text(text) => {
                for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
                    docx = docx.add_paragraph(body_paragraph(line, options));
                }
            }
            SectionBody::Items(items) => {
                for item in items {
                    docx = docx.add_paragraph(list_paragraph(item, BULLET_NUMBERING, options));
                }
            }
            SectionBody::Data(data) => {
                for row in data.to_rows(false, true) {
                    let line = row.iter().map(|c| c.display()).collect::<Vec<_>>().join(" | ");
                    docx = docx.add_paragraph(body_paragraph(&line, options));
                }
            }
        }

        for subsection in &section.subsections {
            docx = add_section(docx, subsection, "Heading3", options);
        }
        docx
    }

    fn base_document(options: &DocxOptions) -> Docx {
        let margin = (options.margins * TWIPS_PER_INCH).round() as i32;

        let mut docx = Docx::new()
            .add_style(Style::new("Heading1", StyleType::Paragraph).name("Heading 1").size(32).bold())
            .add_style(Style::new("Heading2", StyleType::Paragraph).name("Heading 2").size(28).bold())
            .add_style(Style::new("Heading3", StyleType::Paragraph).name("Heading 3").size(24).bold())
            .add_abstract_numbering(AbstractNumbering::new(BULLET_NUMBERING).add_level(Level::new(
                0,
                Start::new(1),
                NumberFormat::new("bullet"),
                LevelText::new("•"),
                LevelJc::new("left"),
            )))
            .add_numbering(Numbering::new(BULLET_NUMBERING, BULLET_NUMBERING))
            .page_margin(
                PageMargin::new()
                    .top(margin as _)
                    .bottom(margin as _)
                    .left(margin as _)
                    .right(margin as _),
            );

        if options.add_page_numbers {
            docx = docx.footer(
                Footer::new().add_paragraph(
                    Paragraph::new()
                        .align(AlignmentType::Center)
                        .add_page_num(PageNum::new()),
                ),
            );
        }

        docx
    }

    fn render_line(kind: ContentLine<'_>, options: &DocxOptions) -> Paragraph {
        match kind {
            ContentLine::Heading2(text) => heading("Heading2", text, options),
            ContentLine::Heading3(text) => heading("Heading3", text, options),
            ContentLine::Bullet(text) => list_paragraph(text, BULLET_NUMBERING, options),
            ContentLine::Numbered(text) => body_paragraph(text, options).indent(
                Some(NUMBERED_INDENT),
                Some(SpecialIndentType::Hanging(NUMBERED_INDENT)),
                None,
                None,
            ),
            ContentLine::Paragraph(text) => body_paragraph(text, options),
            ContentLine::Blank(text) if text.is_empty() => Paragraph::new().line_spacing(spacing(options)),
            ContentLine::Blank(text) => body_paragraph(text, options),
        }
    }

    fn run(text: &str, options: &DocxOptions) -> Run {
        let font = options.font_name.as_str();
        Run::new()
            .add_text(xml_safe(text))
            .fonts(RunFonts::new().ascii(font).hi_ansi(font).cs(font))
    }

    fn spacing(options: &DocxOptions) -> LineSpacing {
        // 240 twips is single spacing, 120 twips is 6pt after
        let line = (options.line_spacing * 240.0).round() as i32;
        LineSpacing::new().line(line as _).after(120)
    }

    fn title_paragraph(title: &str, options: &DocxOptions) -> Paragraph {
        Paragraph::new()
            .style("Heading1")
            .align(AlignmentType::Center)
            .add_run(run(title, options).bold().size(32))
    }

    fn heading(style: &str, text: &str, options: &DocxOptions) -> Paragraph {
        Paragraph::new().style(style).add_run(run(text, options).bold())
    }

    fn body_paragraph(text: &str, options: &DocxOptions) -> Paragraph {
        let size = (options.font_size * 2.0).round() as usize;
        let mut paragraph = Paragraph::new().line_spacing(spacing(options));
        for (segment, bold) in split_bold(text) {
            let mut r = run(segment, options).size(size);
            if bold {
                r = r.bold();
            }
            paragraph = paragraph.add_run(r);
        }
        paragraph
    }

    fn list_paragraph(text: &str, numbering: usize, options: &DocxOptions) -> Paragraph {
        body_paragraph(text, options).numbering(NumberingId::new(numbering), IndentLevel::new(0))
    }

    fn pack(docx: Docx) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        docx.build()
            .pack(&mut cursor)
            .map_err(|e| anyhow::anyhow!("Failed to package DOCX: {}", e))?;
        Ok(cursor.into_inner())
    }

    /// Build a one-line document in memory and check the package; used by the startup prober
    pub fn probe() -> Result<()> {
        let bytes = build_document("probe", &DocxOptions::default())?;
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .with_context(|| "docx-rs produced an unreadable package")?;
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .with_context(|| "docx-rs package has no word/document.xml")?
            .read_to_string(&mut xml)?;
        anyhow::ensure!(xml.contains("probe"), "docx-rs dropped the document text");
        Ok(())
    }
}

#[cfg(feature = "docx")]
pub use render::{build_document, build_report, probe};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_headings() {
        assert_eq!(classify_line("=== Results ==="), ContentLine::Heading2("Results"));
        assert_eq!(classify_line("## Details"), ContentLine::Heading3("Details"));
        assert_eq!(classify_line("-- Notes"), ContentLine::Heading3("Notes"));
        assert_eq!(classify_line("--- Page 1 ---"), ContentLine::Heading3("Page 1"));
        assert_eq!(classify_line("## Summary ##"), ContentLine::Heading3("Summary"));
    }

    #[test]
    fn test_bare_markers_stay_text() {
        assert_eq!(classify_line("======"), ContentLine::Paragraph("======"));
        assert_eq!(classify_line("---"), ContentLine::Paragraph("---"));
    }

    #[test]
    fn test_classify_lists() {
        assert_eq!(classify_line("- apples"), ContentLine::Bullet("apples"));
        assert_eq!(classify_line("* pears"), ContentLine::Bullet("pears"));
        assert_eq!(classify_line("• plums"), ContentLine::Bullet("plums"));
        assert_eq!(classify_line("1. first"), ContentLine::Numbered("1. first"));
        assert_eq!(classify_line("12) twelfth"), ContentLine::Numbered("12) twelfth"));
    }

    #[test]
    fn test_classify_plain_lines() {
        assert_eq!(classify_line(""), ContentLine::Blank(""));
        assert_eq!(classify_line("   "), ContentLine::Blank("   "));
        assert_eq!(classify_line("  Hello world  "), ContentLine::Paragraph("  Hello world  "));
        assert_eq!(classify_line("**Bold** start"), ContentLine::Paragraph("**Bold** start"));
        assert_eq!(classify_line("3.14 is pi"), ContentLine::Paragraph("3.14 is pi"));
        assert_eq!(classify_line("-5 degrees"), ContentLine::Paragraph("-5 degrees"));
        assert_eq!(classify_line("Total - 5 items"), ContentLine::Paragraph("Total - 5 items"));
    }

    #[test]
    fn test_xml_safe() {
        assert_eq!(xml_safe("bell\u{7}char"), "bellchar");
        assert_eq!(xml_safe("tab\tstays"), "tab\tstays");
        assert_eq!(xml_safe("no\u{FFFF}char\u{0}"), "nochar");
        assert!(matches!(xml_safe("plain"), Cow::Borrowed("plain")));
    }

    #[test]
    fn test_split_bold() {
        assert_eq!(
            split_bold("Total: **42** units"),
            vec![("Total: ", false), ("42", true), (" units", false)]
        );
        assert_eq!(split_bold("plain"), vec![("plain", false)]);
        assert_eq!(split_bold("**all bold**"), vec![("all bold", true)]);
    }

    #[test]
    fn test_options_validation() {
        assert!(DocxOptions::default().validate().is_ok());
        let bad = DocxOptions {
            font_size: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = DocxOptions {
            margins: -1.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[cfg(feature = "docx")]
    #[test]
    fn test_probe() {
        assert!(probe().is_ok());
    }

    #[cfg(feature = "docx")]
    #[test]
    fn test_build_document_is_a_package() {
        let options = DocxOptions {
            title: Some("Title".to_string()),
            ..Default::default()
        };
        let bytes = build_document("=== Intro ===\n- item\n**bold** text", &options).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[cfg(feature = "docx")]
    #[test]
    fn test_control_characters_are_not_written() {
        use std::io::{Cursor, Read};

        let bytes = build_document("bell\u{7}char", &DocxOptions::default()).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        assert!(xml.contains("bellchar"));
        assert!(!xml.contains('\u{7}'));
    }
}
