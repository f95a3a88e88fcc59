use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use zip::ZipArchive;

use crate::document_parser::{DocumentMetadata, ExtractedDocument, push_entity};

/// Read a PPTX file: one `--- Slide N ---` block per slide that carries text
pub fn read_pptx(path: &Path) -> Result<ExtractedDocument> {
    let slide_texts = extract_powerpoint_text(path)?;
    let slide_count = slide_texts.len();

    let mut blocks = Vec::new();
    for (index, slide_text) in slide_texts.iter().enumerate() {
        if !slide_text.trim().is_empty() {
            blocks.push(format!("--- Slide {} ---\n{}\n", index + 1, slide_text));
        }
    }

    Ok(ExtractedDocument {
        text: blocks.join("\n"),
        metadata: DocumentMetadata {
            slide_count: Some(slide_count),
            ..Default::default()
        },
    })
}

/// Extract the text of every slide, in slide order
pub fn extract_powerpoint_text(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open PowerPoint file: {}", path.display()))?;

    let mut archive = ZipArchive::new(file)
        .with_context(|| "Failed to read PowerPoint file as ZIP archive")?;

    // Presentations always carry this part; plain zips do not
    archive
        .by_name("ppt/presentation.xml")
        .with_context(|| "PowerPoint file has no ppt/presentation.xml part")?;

    let mut slide_files: Vec<String> = archive
        .file_names()
        .filter(|name| is_slide_part(name))
        .map(|name| name.to_string())
        .collect();

    // slide10.xml must come after slide9.xml
    slide_files.sort_by_key(|name| extract_slide_number(name));

    let mut slide_texts = Vec::with_capacity(slide_files.len());
    for slide_file in &slide_files {
        let mut part = archive
            .by_name(slide_file)
            .with_context(|| format!("Failed to open slide part {}", slide_file))?;
        let mut contents = String::new();
        part.read_to_string(&mut contents)
            .with_context(|| format!("Failed to read slide part {}", slide_file))?;
        slide_texts.push(extract_text_from_slide_xml(&contents)?);
    }

    Ok(slide_texts)
}

fn is_slide_part(name: &str) -> bool {
    name.starts_with("ppt/slides/slide") && name.ends_with(".xml")
}

/// Extract slide number from slide file name
fn extract_slide_number(filename: &str) -> usize {
    // "ppt/slides/slide1.xml" -> 1
    if let Some(start) = filename.rfind("slide") {
        if let Some(end) = filename.rfind(".xml") {
            if start + 5 <= end {
                return filename[start + 5..end].parse().unwrap_or(0);
            }
        }
    }
    0
}

/// Extract text content from slide XML; each paragraph becomes one line
fn extract_text_from_slide_xml(xml_content: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml_content);
    reader.config_mut().trim_text(false);

    let mut lines: Vec<String> = Vec::new();
    let mut paragraph = String::new();
    let mut in_text_element = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if e.name().as_ref() == b"a:t" {
                    in_text_element = true;
                }
            }
            Ok(Event::Empty(ref e)) => {
                if e.name().as_ref() == b"a:br" {
                    paragraph.push('\n');
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"a:t" => in_text_element = false,
                b"a:p" => {
                    let text = paragraph.trim();
                    if !text.is_empty() {
                        lines.push(text.to_string());
                    }
                    paragraph.clear();
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_element {
                    let text = std::str::from_utf8(&e)
                        .with_context(|| "Slide text run is not valid UTF-8")?;
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
                return Err(anyhow::anyhow!("Error parsing slide XML: {}", e));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use zip::write::SimpleFileOptions;

    fn slide_xml(paragraphs: &[&str]) -> String {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<a:p><a:r><a:t>{}</a:t></a:r></a:p>", p))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><p:sld xmlns:a="a" xmlns:p="p"><p:cSld><p:spTree><p:sp><p:txBody>{}</p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#,
            body
        )
    }

    fn write_pptx(slides: &[Vec<&str>]) -> NamedTempFile {
        let temp_file = tempfile::Builder::new().suffix(".pptx").tempfile().unwrap();
        let mut zip = zip::ZipWriter::new(temp_file.reopen().unwrap());
        let options = SimpleFileOptions::default();

        zip.start_file("ppt/presentation.xml", options).unwrap();
        zip.write_all(b"<p:presentation xmlns:p=\"p\"/>").unwrap();

        // Written out of order on purpose
        for (index, paragraphs) in slides.iter().enumerate().rev() {
            zip.start_file(format!("ppt/slides/slide{}.xml", index + 1), options)
                .unwrap();
            zip.write_all(slide_xml(paragraphs).as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        temp_file
    }

    #[test]
    fn test_extract_slide_number() {
        assert_eq!(extract_slide_number("ppt/slides/slide1.xml"), 1);
        assert_eq!(extract_slide_number("ppt/slides/slide12.xml"), 12);
        assert_eq!(extract_slide_number("ppt/slides/slide.xml"), 0);
    }

    #[test]
    fn test_is_slide_part() {
        assert!(is_slide_part("ppt/slides/slide3.xml"));
        assert!(!is_slide_part("ppt/slides/_rels/slide3.xml.rels"));
        assert!(!is_slide_part("ppt/slideLayouts/slideLayout1.xml"));
    }

    #[test]
    fn test_extract_text_from_slide_xml() {
        let xml = slide_xml(&["Title", "Tom &amp; Jerry", ""]);
        let text = extract_text_from_slide_xml(&xml).unwrap();
        assert_eq!(text, "Title\nTom & Jerry");
    }

    #[test]
    fn test_read_pptx_orders_slides() {
        let mut slides: Vec<Vec<&str>> = (0..10).map(|_| vec!["filler"]).collect();
        slides[0] = vec!["Welcome"];
        slides[1] = vec![];
        slides[9] = vec!["Last slide"];
        let file = write_pptx(&slides);

        let doc = read_pptx(file.path()).unwrap();
        assert_eq!(doc.metadata.slide_count, Some(10));
        assert!(doc.text.starts_with("--- Slide 1 ---\nWelcome\n"));
        assert!(!doc.text.contains("--- Slide 2 ---"));
        assert!(doc.text.trim_end().ends_with("--- Slide 10 ---\nLast slide"));
    }

    #[test]
    fn test_read_pptx_invalid_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"not a presentation").unwrap();
        let result = read_pptx(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_read_pptx_nonexistent_file() {
        let result = read_pptx(Path::new("nonexistent.pptx"));
        assert!(format!("{:#}", result.unwrap_err()).contains("Failed to open PowerPoint file"));
    }
}
