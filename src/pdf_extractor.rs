use std::path::Path;

use anyhow::{Context, Result};

use crate::document_parser::{DocumentMetadata, ExtractedDocument};

/// PDF text extraction over the available backends.
/// pdf-extract gives the best text; lopdf is the per-page fallback and the page counter.
pub struct PdfExtractor;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PdfBackend {
    PdfExtract,
    Lopdf,
}

impl PdfExtractor {
    /// Backends in order of preference
    fn get_available_backends() -> Vec<PdfBackend> {
        vec![PdfBackend::PdfExtract, PdfBackend::Lopdf]
    }

    /// Extract per-page text, falling back through the backends
    pub fn extract_pages(file_path: &Path) -> Result<Vec<String>> {
        let total_pages = Self::get_page_count(file_path)?;

        for backend in Self::get_available_backends() {
            match Self::extract_pages_with_backend(file_path, total_pages, backend) {
                Ok(pages) => {
                    log::debug!(
                        "Extracted {} pages from {} using {:?}",
                        pages.len(),
                        file_path.display(),
                        backend
                    );
                    return Ok(pages);
                }
                Err(e) => {
                    log::warn!("Backend {:?} failed for {}: {:#}", backend, file_path.display(), e);
                    continue;
                }
            }
        }

        anyhow::bail!("All PDF extraction backends failed for file: {}", file_path.display());
    }

    /// Get the page count of a PDF file without extracting text
    pub fn get_page_count(file_path: &Path) -> Result<usize> {
        let document = lopdf::Document::load(file_path)
            .with_context(|| format!("Failed to load PDF: {}", file_path.display()))?;
        Ok(document.get_pages().len())
    }

    fn extract_pages_with_backend(
        file_path: &Path,
        total_pages: usize,
        backend: PdfBackend,
    ) -> Result<Vec<String>> {
        match backend {
            PdfBackend::PdfExtract => Self::extract_pages_with_pdf_extract(file_path, total_pages),
            PdfBackend::Lopdf => Self::extract_pages_with_lopdf(file_path, total_pages),
        }
    }

    fn extract_pages_with_pdf_extract(file_path: &Path, total_pages: usize) -> Result<Vec<String>> {
        // pdf-extract panics on some malformed inputs
        let outcome = std::panic::catch_unwind(|| pdf_extract::extract_text(file_path));
        let full_text = match outcome {
            Ok(result) => result.with_context(|| {
                format!("Failed to extract text with pdf-extract: {}", file_path.display())
            })?,
            Err(_) => anyhow::bail!("pdf-extract panicked on {}", file_path.display()),
        };

        // Form feeds mark page boundaries
        let mut pages: Vec<String> = full_text.split('\x0C').map(|p| p.to_string()).collect();
        if pages.len() > total_pages && pages.last().is_some_and(|p| p.trim().is_empty()) {
            pages.pop();
        }

        if pages.len() == total_pages {
            Ok(pages)
        } else if total_pages <= 1 {
            Ok(vec![full_text])
        } else {
            anyhow::bail!(
                "pdf-extract found {} page boundaries for {} pages",
                pages.len(),
                total_pages
            )
        }
    }

    fn extract_pages_with_lopdf(file_path: &Path, total_pages: usize) -> Result<Vec<String>> {
        let document = lopdf::Document::load(file_path)
            .with_context(|| format!("Failed to load PDF with lopdf: {}", file_path.display()))?;

        let mut pages = Vec::with_capacity(total_pages);
        for page_num in 1..=total_pages as u32 {
            let text = document
                .extract_text(&[page_num])
                .with_context(|| format!("Failed to extract text from page {} with lopdf", page_num))?;
            pages.push(text);
        }
        Ok(pages)
    }

    /// Build a one-page PDF in memory with the given text
    pub fn sample_document(text: &str) -> Result<Vec<u8>> {
        use lopdf::content::{Content, Operation};
        use lopdf::{Document, Object, Stream, dictionary};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .with_context(|| "Failed to encode PDF content stream")?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .with_context(|| "Failed to serialize PDF")?;
        Ok(buffer)
    }

    /// Trivial invocation used by the startup prober
    pub fn probe() -> Result<()> {
        let bytes = Self::sample_document("probe")?;
        let document = lopdf::Document::load_mem(&bytes)
            .with_context(|| "lopdf could not read back a generated PDF")?;
        anyhow::ensure!(document.get_pages().len() == 1, "Generated PDF has the wrong page count");
        Ok(())
    }
}

/// Read a PDF file: one `--- Page N ---` block per page that carries text
pub fn read_pdf(path: &Path) -> Result<ExtractedDocument> {
    let pages = PdfExtractor::extract_pages(path)?;
    let page_count = pages.len();

    let mut blocks = Vec::new();
    for (index, page_text) in pages.iter().enumerate() {
        let text = page_text.trim();
        if !text.is_empty() {
            blocks.push(format!("--- Page {} ---\n{}\n", index + 1, text));
        }
    }

    Ok(ExtractedDocument {
        text: blocks.join("\n"),
        metadata: DocumentMetadata {
            page_count: Some(page_count),
            ..Default::default()
        },
    })
}
