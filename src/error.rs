use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared error kinds returned by the extraction and construction façades
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    UnsupportedFormat,
    CapabilityUnavailable,
    NotFound,
    InvalidDestination,
    SectionNotFound,
    ExtractionFailed,
    WriteFailed,
    InvalidRequest,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFormat => "unsupported-format",
            ErrorKind::CapabilityUnavailable => "capability-unavailable",
            ErrorKind::NotFound => "not-found",
            ErrorKind::InvalidDestination => "invalid-destination",
            ErrorKind::SectionNotFound => "section-not-found",
            ErrorKind::ExtractionFailed => "extraction-failed",
            ErrorKind::WriteFailed => "write-failed",
            ErrorKind::InvalidRequest => "invalid-request",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error carried inside every result envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ToolError {
    pub kind: ErrorKind,
    pub message: String,
}

pub type ToolResult<T> = Result<T, ToolError>;

impl ToolError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unsupported_format(extension: &str, supported: &[&str]) -> Self {
        let ext = if extension.is_empty() {
            "(no extension)".to_string()
        } else {
            format!(".{}", extension)
        };
        Self::new(
            ErrorKind::UnsupportedFormat,
            format!(
                "Unsupported file type: {}. Supported: {}",
                ext,
                supported
                    .iter()
                    .map(|e| format!(".{}", e))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        )
    }

    pub fn capability_unavailable(extension: &str, what: &str) -> Self {
        Self::new(
            ErrorKind::CapabilityUnavailable,
            format!("No {} available for .{} files", what, extension),
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn invalid_destination(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidDestination, message)
    }

    pub fn section_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SectionNotFound, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    /// Wrap a delegate failure, keeping the whole context chain
    pub fn extraction_failed(err: &anyhow::Error) -> Self {
        Self::new(ErrorKind::ExtractionFailed, format!("{:#}", err))
    }

    pub fn write_failed(err: &anyhow::Error) -> Self {
        Self::new(ErrorKind::WriteFailed, format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&ErrorKind::CapabilityUnavailable).unwrap();
        assert_eq!(json, "\"capability-unavailable\"");
        assert_eq!(ErrorKind::SectionNotFound.to_string(), "section-not-found");
    }

    #[test]
    fn test_extraction_failed_keeps_context_chain() {
        let err = anyhow::anyhow!("invalid zip header").context("Failed to open DOCX file");
        let tool_err = ToolError::extraction_failed(&err);
        assert_eq!(tool_err.kind, ErrorKind::ExtractionFailed);
        assert!(tool_err.message.contains("Failed to open DOCX file"));
        assert!(tool_err.message.contains("invalid zip header"));
    }

    #[test]
    fn test_unsupported_format_message() {
        let err = ToolError::unsupported_format("txt", &["pdf", "docx"]);
        assert_eq!(err.message, "Unsupported file type: .txt. Supported: .pdf, .docx");

        let err = ToolError::unsupported_format("", &["pdf"]);
        assert!(err.message.contains("(no extension)"));
    }
}
