use std::path::Path;

use serde::Serialize;

use crate::config::ServerConfig;
use crate::prober::ProbeReport;
use crate::shared_utils::{extension_of, normalize_extension};

/// An external library's ability to read or write one family of formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    PdfReader,
    OoxmlReader,
    OoxmlWriter,
    SpreadsheetEngine,
    TabularEngine,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::PdfReader,
        Capability::OoxmlReader,
        Capability::OoxmlWriter,
        Capability::SpreadsheetEngine,
        Capability::TabularEngine,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::PdfReader => "pdf-reader",
            Capability::OoxmlReader => "ooxml-reader",
            Capability::OoxmlWriter => "ooxml-writer",
            Capability::SpreadsheetEngine => "spreadsheet-engine",
            Capability::TabularEngine => "tabular-engine",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Pptx,
    Xlsx,
}

impl DocumentFormat {
    pub const ALL: [DocumentFormat; 4] = [
        DocumentFormat::Pdf,
        DocumentFormat::Docx,
        DocumentFormat::Pptx,
        DocumentFormat::Xlsx,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Pptx => "pptx",
            DocumentFormat::Xlsx => "xlsx",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "PDF Document",
            DocumentFormat::Docx => "Word Document",
            DocumentFormat::Pptx => "PowerPoint Presentation",
            DocumentFormat::Xlsx => "Excel Spreadsheet",
        }
    }

    /// Capabilities required to read this format
    pub fn read_capabilities(&self) -> &'static [Capability] {
        match self {
            DocumentFormat::Pdf => &[Capability::PdfReader],
            DocumentFormat::Docx | DocumentFormat::Pptx => &[Capability::OoxmlReader],
            DocumentFormat::Xlsx => &[Capability::SpreadsheetEngine],
        }
    }

    /// Capabilities required to write this format; empty when the format is read-only
    pub fn write_capabilities(&self) -> &'static [Capability] {
        match self {
            DocumentFormat::Pdf | DocumentFormat::Pptx => &[],
            DocumentFormat::Docx => &[Capability::OoxmlWriter],
            DocumentFormat::Xlsx => &[Capability::SpreadsheetEngine],
        }
    }
}

/// What the server can do with one file extension
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityDescriptor {
    pub extension: String,
    pub description: &'static str,
    pub format: DocumentFormat,
    pub can_read: bool,
    pub can_write: bool,
    /// Reading capabilities were found at startup
    pub available: bool,
    /// Writing capabilities were found at startup
    pub write_available: bool,
}

/// Immutable extension -> capability table, built once from the probe report
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    descriptors: Vec<CapabilityDescriptor>,
    capabilities: Vec<Capability>,
}

impl FormatRegistry {
    /// Build the registry given which capabilities are present and which
    /// extensions are disabled by configuration
    pub fn with_availability<F>(is_available: F, disabled_formats: &[String]) -> Self
    where
        F: Fn(Capability) -> bool,
    {
        let descriptors = DocumentFormat::ALL
            .iter()
            .map(|&format| {
                let extension = format.extension();
                let enabled = !disabled_formats.iter().any(|d| d == extension);
                let read_caps = format.read_capabilities();
                let write_caps = format.write_capabilities();

                CapabilityDescriptor {
                    extension: extension.to_string(),
                    description: format.description(),
                    format,
                    can_read: !read_caps.is_empty(),
                    can_write: !write_caps.is_empty(),
                    available: enabled
                        && !read_caps.is_empty()
                        && read_caps.iter().all(|&c| is_available(c)),
                    write_available: enabled
                        && !write_caps.is_empty()
                        && write_caps.iter().all(|&c| is_available(c)),
                }
            })
            .collect();

        let capabilities = Capability::ALL
            .iter()
            .copied()
            .filter(|&c| is_available(c))
            .collect();

        Self {
            descriptors,
            capabilities,
        }
    }

    pub fn from_probe(report: &ProbeReport, config: &ServerConfig) -> Self {
        Self::with_availability(|c| report.is_available(c), &config.disabled_formats)
    }

    /// Every capability present, nothing disabled
    pub fn all_available() -> Self {
        Self::with_availability(|_| true, &[])
    }

    /// Case-insensitive lookup; a leading '.' is ignored
    pub fn lookup(&self, extension: &str) -> Option<&CapabilityDescriptor> {
        let ext = normalize_extension(extension);
        self.descriptors.iter().find(|d| d.extension == ext)
    }

    pub fn lookup_path(&self, path: &Path) -> Option<&CapabilityDescriptor> {
        extension_of(path).and_then(|ext| self.lookup(&ext))
    }

    /// Whether a single capability was found at startup
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn descriptors(&self) -> &[CapabilityDescriptor] {
        &self.descriptors
    }

    pub fn supported_extensions(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.extension.as_str()).collect()
    }

    /// Extensions that can be written at all, whether or not available
    pub fn writable_extensions(&self) -> Vec<&str> {
        self.descriptors
            .iter()
            .filter(|d| d.can_write)
            .map(|d| d.extension.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = FormatRegistry::all_available();
        for ext in ["pdf", "docx", "pptx", "xlsx"] {
            let lower = registry.lookup(ext).unwrap();
            assert_eq!(lower.extension, ext);

            let upper = registry.lookup(&ext.to_uppercase()).unwrap();
            assert_eq!(upper, lower);

            let dotted = registry.lookup(&format!(".{}", ext.to_uppercase())).unwrap();
            assert_eq!(dotted, lower);
        }
    }

    #[test]
    fn test_lookup_unregistered() {
        let registry = FormatRegistry::all_available();
        assert!(registry.lookup("txt").is_none());
        assert!(registry.lookup("").is_none());
        assert!(registry.lookup("doc").is_none());
        assert!(registry.lookup_path(Path::new("/tmp/notes")).is_none());
    }

    #[test]
    fn test_lookup_path() {
        let registry = FormatRegistry::all_available();
        let desc = registry.lookup_path(Path::new("/data/Report.XLSX")).unwrap();
        assert_eq!(desc.format, DocumentFormat::Xlsx);
    }

    #[test]
    fn test_read_write_support() {
        let registry = FormatRegistry::all_available();
        assert!(!registry.lookup("pdf").unwrap().can_write);
        assert!(!registry.lookup("pptx").unwrap().can_write);
        assert!(registry.lookup("docx").unwrap().can_write);
        assert!(registry.lookup("xlsx").unwrap().write_available);
        assert!(!registry.lookup("pdf").unwrap().write_available);
    }

    #[test]
    fn test_registered_but_unavailable() {
        let registry = FormatRegistry::with_availability(|c| c != Capability::PdfReader, &[]);
        let pdf = registry.lookup("pdf").unwrap();
        assert!(!pdf.available);
        assert!(registry.lookup("docx").unwrap().available);
        assert!(!registry.has_capability(Capability::PdfReader));
        assert!(registry.has_capability(Capability::TabularEngine));
    }

    #[test]
    fn test_disabled_formats() {
        let registry = FormatRegistry::with_availability(|_| true, &["xlsx".to_string()]);
        let xlsx = registry.lookup("xlsx").unwrap();
        assert!(!xlsx.available);
        assert!(!xlsx.write_available);
        assert!(xlsx.can_write);
    }

    #[test]
    fn test_fully_degraded_registry_is_valid() {
        let registry = FormatRegistry::with_availability(|_| false, &[]);
        assert_eq!(registry.descriptors().len(), 4);
        assert!(registry.descriptors().iter().all(|d| !d.available && !d.write_available));
        assert_eq!(registry.supported_extensions(), vec!["pdf", "docx", "pptx", "xlsx"]);
        assert_eq!(registry.writable_extensions(), vec!["docx", "xlsx"]);
    }
}
