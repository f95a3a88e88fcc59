/// Knowledge Base MCP - A Model Context Protocol server for document access
/// Extracts text and metadata from PDF, DOCX, PPTX and XLSX files and creates DOCX and XLSX files

pub mod config;
pub mod construction;
pub mod content;
pub mod document_parser;
pub mod docx_writer;
pub mod error;
pub mod extraction;
pub mod file_locks;
pub mod logging;
pub mod mcp_handler;
#[cfg(feature = "pdf")]
pub mod pdf_extractor;
pub mod powerpoint_parser;
pub mod prober;
pub mod registry;
pub mod shared_utils;
pub mod xlsx_writer;

/// Re-export the server for direct usage
pub use mcp_handler::{KnowledgeBaseServer, start_server};

/// Re-export the façades
pub use construction::{ConstructionFacade, WriteOutcome};
pub use extraction::{DirectoryListing, DirectoryScanResult, ExtractionFacade, ExtractionResult, FileInfo};

/// Re-export capability discovery
pub use prober::{ProbeReport, probe};
pub use registry::{Capability, CapabilityDescriptor, DocumentFormat, FormatRegistry};

pub use config::ServerConfig;
pub use docx_writer::DocxOptions;
pub use error::{ErrorKind, ToolError, ToolResult};
