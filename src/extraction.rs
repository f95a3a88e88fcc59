use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use walkdir::WalkDir;

use crate::document_parser::{DocumentMetadata, ExtractedDocument};
use crate::error::{ErrorKind, ToolError, ToolResult};
use crate::registry::{CapabilityDescriptor, DocumentFormat, FormatRegistry};
use crate::shared_utils::{display_name, extension_of, format_system_time, size_in_mb};

/// Uniform result of one extraction
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub source_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<DocumentFormat>,
    pub text_content: String,
    pub structured_metadata: DocumentMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl ExtractionResult {
    fn failed(path: &Path, format: Option<DocumentFormat>, error: ToolError) -> Self {
        Self {
            source_path: path.display().to_string(),
            format,
            text_content: String::new(),
            structured_metadata: DocumentMetadata::default(),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// A scan problem that is not tied to a readable file
#[derive(Debug, Clone, Serialize)]
pub struct ScanError {
    pub path: String,
    pub error: ToolError,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectoryScanResult {
    pub directory: String,
    pub recursive: bool,
    pub results: Vec<ExtractionResult>,
    pub errors: Vec<ScanError>,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// A supported file found by a listing; built from filesystem metadata only
#[derive(Debug, Clone, Serialize)]
pub struct ListingEntry {
    pub path: String,
    pub name: String,
    pub extension: String,
    pub description: &'static str,
    pub available: bool,
    pub size_bytes: u64,
    pub size_mb: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectoryListing {
    pub directory: String,
    pub recursive: bool,
    pub files: Vec<ListingEntry>,
    pub errors: Vec<ScanError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub path: String,
    pub extension: String,
    pub description: String,
    pub supported: bool,
    pub available: bool,
    pub size_bytes: u64,
    pub size_mb: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

/// Resolves a path to the right reader and normalizes what comes back
#[derive(Debug, Clone)]
pub struct ExtractionFacade {
    registry: Arc<FormatRegistry>,
    xlsx_sample_rows: usize,
}

impl ExtractionFacade {
    pub fn new(registry: Arc<FormatRegistry>, xlsx_sample_rows: usize) -> Self {
        Self {
            registry,
            xlsx_sample_rows,
        }
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    /// Extract text and metadata from one file. Never panics or raises; every
    /// failure is reported in the envelope's `error`.
    pub fn extract_single(&self, path: &Path) -> ExtractionResult {
        let metadata = match fs::metadata(path) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => {
                return ExtractionResult::failed(
                    path,
                    None,
                    ToolError::not_found(format!("Path is not a file: {}", path.display())),
                );
            }
            Err(_) => {
                return ExtractionResult::failed(
                    path,
                    None,
                    ToolError::not_found(format!("File not found: {}", path.display())),
                );
            }
        };

        let descriptor = match self.resolve_readable(path) {
            Ok(descriptor) => descriptor,
            Err(error) => {
                let format = self.registry.lookup_path(path).map(|d| d.format);
                return ExtractionResult::failed(path, format, error);
            }
        };

        log::debug!("Extracting {} as {}", path.display(), descriptor.extension);
        let format = descriptor.format;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.read_with_delegate(format, path)));

        match outcome {
            Ok(Ok(mut document)) => {
                document.metadata.size_bytes = Some(metadata.len());
                ExtractionResult {
                    source_path: path.display().to_string(),
                    format: Some(format),
                    text_content: document.text,
                    structured_metadata: document.metadata,
                    error: None,
                }
            }
            Ok(Err(e)) => {
                log::warn!("Failed to extract {}: {:#}", path.display(), e);
                ExtractionResult::failed(path, Some(format), ToolError::extraction_failed(&e))
            }
            Err(_) => {
                log::warn!("Reader panicked on {}", path.display());
                ExtractionResult::failed(
                    path,
                    Some(format),
                    ToolError::new(
                        ErrorKind::ExtractionFailed,
                        format!("Reader panicked while processing {}", path.display()),
                    ),
                )
            }
        }
    }

    /// Extract every supported, available file under `directory`. Unsupported
    /// files are skipped and counted; nothing aborts the scan.
    pub fn extract_directory(&self, directory: &Path, recursive: bool) -> DirectoryScanResult {
        let mut scan = DirectoryScanResult {
            directory: directory.display().to_string(),
            recursive,
            results: Vec::new(),
            errors: Vec::new(),
            succeeded: 0,
            failed: 0,
            skipped: 0,
        };

        if let Err(error) = check_directory(directory) {
            scan.errors.push(ScanError {
                path: directory.display().to_string(),
                error,
            });
            return scan;
        }

        for entry in walk(directory, recursive) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping entry during scan of {}: {}", directory.display(), e);
                    scan.errors.push(walk_error(directory, &e));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            match self.registry.lookup_path(path) {
                Some(descriptor) if descriptor.available => {}
                _ => {
                    scan.skipped += 1;
                    continue;
                }
            }

            let result = self.extract_single(path);
            if result.is_ok() {
                scan.succeeded += 1;
            } else {
                scan.failed += 1;
            }
            scan.results.push(result);
        }

        log::info!(
            "Scanned {}: {} extracted, {} failed, {} skipped",
            directory.display(),
            scan.succeeded,
            scan.failed,
            scan.skipped
        );
        scan
    }

    /// List files with a registered extension without opening their contents
    pub fn list_supported(&self, directory: &Path, recursive: bool) -> ToolResult<DirectoryListing> {
        check_directory(directory)?;

        let mut listing = DirectoryListing {
            directory: directory.display().to_string(),
            recursive,
            files: Vec::new(),
            errors: Vec::new(),
        };

        for entry in walk(directory, recursive) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    listing.errors.push(walk_error(directory, &e));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let Some(descriptor) = self.registry.lookup_path(path) else {
                continue;
            };
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    listing.errors.push(walk_error(directory, &e));
                    continue;
                }
            };

            listing.files.push(ListingEntry {
                path: path.display().to_string(),
                name: display_name(path),
                extension: descriptor.extension.clone(),
                description: descriptor.description,
                available: descriptor.available,
                size_bytes: metadata.len(),
                size_mb: size_in_mb(metadata.len()),
                modified: metadata.modified().ok().map(format_system_time),
                created: metadata.created().ok().map(format_system_time),
            });
        }

        Ok(listing)
    }

    /// Describe one file from its metadata
    pub fn file_info(&self, path: &Path) -> ToolResult<FileInfo> {
        let metadata = fs::metadata(path)
            .map_err(|_| ToolError::not_found(format!("File not found: {}", path.display())))?;
        if !metadata.is_file() {
            return Err(ToolError::not_found(format!("Path is not a file: {}", path.display())));
        }

        let extension = extension_of(path).unwrap_or_default();
        let descriptor = self.registry.lookup(&extension);

        Ok(FileInfo {
            name: display_name(path),
            path: path.display().to_string(),
            extension,
            description: descriptor
                .map(|d| d.description.to_string())
                .unwrap_or_else(|| "Unsupported".to_string()),
            supported: descriptor.is_some(),
            available: descriptor.is_some_and(|d| d.available),
            size_bytes: metadata.len(),
            size_mb: size_in_mb(metadata.len()),
            modified: metadata.modified().ok().map(format_system_time),
            created: metadata.created().ok().map(format_system_time),
        })
    }

    fn resolve_readable(&self, path: &Path) -> ToolResult<&CapabilityDescriptor> {
        let extension = extension_of(path).unwrap_or_default();
        let descriptor = self
            .registry
            .lookup(&extension)
            .ok_or_else(|| ToolError::unsupported_format(&extension, &self.registry.supported_extensions()))?;
        if !descriptor.available {
            return Err(ToolError::capability_unavailable(&descriptor.extension, "reader"));
        }
        Ok(descriptor)
    }

    fn read_with_delegate(&self, format: DocumentFormat, path: &Path) -> anyhow::Result<ExtractedDocument> {
        match format {
            #[cfg(feature = "pdf")]
            DocumentFormat::Pdf => crate::pdf_extractor::read_pdf(path),
            #[cfg(not(feature = "pdf"))]
            DocumentFormat::Pdf => anyhow::bail!("PDF reader not available (feature \"pdf\" not enabled)"),

            DocumentFormat::Docx => crate::document_parser::read_docx(path),
            DocumentFormat::Pptx => crate::powerpoint_parser::read_pptx(path),

            #[cfg(feature = "xlsx")]
            DocumentFormat::Xlsx => crate::document_parser::read_xlsx(path, self.xlsx_sample_rows),
            #[cfg(not(feature = "xlsx"))]
            DocumentFormat::Xlsx => anyhow::bail!("Spreadsheet engine not available (feature \"xlsx\" not enabled)"),
        }
    }
}

fn check_directory(directory: &Path) -> ToolResult<()> {
    match fs::metadata(directory) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(ToolError::not_found(format!(
            "Path is not a directory: {}",
            directory.display()
        ))),
        Err(_) => Err(ToolError::not_found(format!(
            "Directory not found: {}",
            directory.display()
        ))),
    }
}

/// Entries sorted by file name; links are followed so that cycles surface as errors
fn walk(directory: &Path, recursive: bool) -> walkdir::IntoIter {
    let walker = WalkDir::new(directory)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name();
    if recursive {
        walker.into_iter()
    } else {
        walker.max_depth(1).into_iter()
    }
}

fn walk_error(directory: &Path, error: &walkdir::Error) -> ScanError {
    let path = error
        .path()
        .unwrap_or(directory)
        .display()
        .to_string();
    let message = match error.loop_ancestor() {
        Some(ancestor) => format!("Symlink loop back to {}", ancestor.display()),
        None => error.to_string(),
    };
    ScanError {
        path,
        error: ToolError::new(ErrorKind::ExtractionFailed, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Capability;
    use std::io::Write;
    use tempfile::tempdir;

    fn facade() -> ExtractionFacade {
        ExtractionFacade::new(Arc::new(FormatRegistry::all_available()), 10)
    }

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let result = facade().extract_single(Path::new("/definitely/missing/file.pdf"));
        assert_eq!(result.error.unwrap().kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let dir = tempdir().unwrap();
        let result = facade().extract_single(dir.path());
        assert_eq!(result.error.unwrap().kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_unregistered_extension() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "notes.txt", b"plain text");
        let result = facade().extract_single(&path);
        let error = result.error.unwrap();
        assert_eq!(error.kind, ErrorKind::UnsupportedFormat);
        assert!(error.message.contains(".txt"));
        assert!(result.text_content.is_empty());
    }

    #[test]
    fn test_registered_but_unavailable() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "deck.pptx", b"whatever");
        let registry = FormatRegistry::with_availability(|c| c != Capability::OoxmlReader, &[]);
        let facade = ExtractionFacade::new(Arc::new(registry), 10);
        let result = facade.extract_single(&path);
        assert_eq!(result.error.unwrap().kind, ErrorKind::CapabilityUnavailable);
        assert_eq!(result.format, Some(DocumentFormat::Pptx));
    }

    #[test]
    fn test_corrupt_file_is_extraction_failed() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "broken.docx", b"not a zip archive");
        let result = facade().extract_single(&path);
        let error = result.error.unwrap();
        assert_eq!(error.kind, ErrorKind::ExtractionFailed);
        assert!(error.message.contains("ZIP archive"));
    }

    #[test]
    fn test_directory_scan_reports_partial_success() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a_broken.pptx", b"garbage");
        write_file(dir.path(), "b_notes.txt", b"skip me");
        fs::create_dir(dir.path().join("nested")).unwrap();
        write_file(&dir.path().join("nested"), "c_deep.docx", b"garbage");

        let scan = facade().extract_directory(dir.path(), false);
        assert_eq!(scan.results.len(), 1);
        assert_eq!(scan.failed, 1);
        assert_eq!(scan.skipped, 1);
        assert!(scan.errors.is_empty());

        let scan = facade().extract_directory(dir.path(), true);
        assert_eq!(scan.results.len(), 2);
        assert!(scan.results[1].source_path.ends_with("c_deep.docx"));
    }

    #[test]
    fn test_directory_scan_missing_root() {
        let scan = facade().extract_directory(Path::new("/definitely/missing"), true);
        assert!(scan.results.is_empty());
        assert_eq!(scan.errors.len(), 1);
        assert_eq!(scan.errors[0].error.kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_list_supported_reads_metadata_only() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "corrupt.xlsx", b"not a workbook");
        write_file(dir.path(), "README.md", b"# readme");

        let listing = facade().list_supported(dir.path(), false).unwrap();
        assert_eq!(listing.files.len(), 1);
        let entry = &listing.files[0];
        assert_eq!(entry.name, "corrupt.xlsx");
        assert_eq!(entry.extension, "xlsx");
        assert_eq!(entry.size_bytes, 14);
        assert_eq!(entry.size_mb, 0.0);
        assert!(entry.modified.is_some());
    }

    #[test]
    fn test_listing_reports_size_in_mb_and_created() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "big.pdf", &vec![b'x'; 1536 * 1024]);

        let listing = facade().list_supported(dir.path(), false).unwrap();
        let entry = &listing.files[0];
        assert_eq!(entry.size_mb, 1.5);

        let json = serde_json::to_value(entry).unwrap();
        assert_eq!(json["size_mb"], 1.5);
        // Birth time is not recorded on every filesystem
        let created = fs::metadata(dir.path().join("big.pdf")).unwrap().created().is_ok();
        assert_eq!(entry.created.is_some(), created);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_recorded_and_scan_continues() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        symlink(dir.path(), dir.path().join("sub").join("loop")).unwrap();
        write_file(&dir.path().join("sub"), "deck.pptx", b"garbage");

        let scan = facade().extract_directory(dir.path(), true);
        assert_eq!(scan.results.len(), 1);
        assert!(scan.results[0].source_path.ends_with("deck.pptx"));
        assert_eq!(scan.errors.len(), 1);
        assert!(scan.errors[0].error.message.contains("Symlink loop"));
        assert_eq!(scan.errors[0].error.kind, ErrorKind::ExtractionFailed);

        let listing = facade().list_supported(dir.path(), true).unwrap();
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].name, "deck.pptx");
        assert_eq!(listing.errors.len(), 1);
        assert!(listing.errors[0].error.message.contains("Symlink loop"));
    }

    #[test]
    fn test_list_supported_missing_directory() {
        let err = facade().list_supported(Path::new("/definitely/missing"), false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_file_info() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "Report.DOCX", &[0u8; 2048]);
        let info = facade().file_info(&path).unwrap();
        assert_eq!(info.extension, "docx");
        assert_eq!(info.description, "Word Document");
        assert!(info.supported);
        assert_eq!(info.size_bytes, 2048);

        let path = write_file(dir.path(), "data.csv", b"a,b");
        let info = facade().file_info(&path).unwrap();
        assert!(!info.supported);
        assert_eq!(info.description, "Unsupported");
    }
}
