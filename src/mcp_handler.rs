use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::tool::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo};
use rmcp::schemars;
use rmcp::{ErrorData as McpError, ServerHandler, ServiceExt, tool, tool_handler, tool_router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ServerConfig;
use crate::construction::ConstructionFacade;
use crate::docx_writer::DocxOptions;
use crate::error::{ToolError, ToolResult};
use crate::extraction::ExtractionFacade;
use crate::file_locks::FileLocks;
use crate::prober::{self, ProbeReport};
use crate::registry::FormatRegistry;

/// Document access server: extraction and construction tools over MCP
#[derive(Clone)]
pub struct KnowledgeBaseServer {
    extraction: ExtractionFacade,
    construction: ConstructionFacade,
    probe_report: Arc<ProbeReport>,
    file_locks: FileLocks,
    tool_router: ToolRouter<Self>,
}

/// Input for tools that take a single file
#[derive(Serialize, Deserialize, Debug, schemars::JsonSchema)]
pub struct FilePathInput {
    #[schemars(description = "Path to the document file")]
    pub file_path: String,
}

/// Input for tools that scan a directory
#[derive(Serialize, Deserialize, Debug, schemars::JsonSchema)]
pub struct DirectoryInput {
    #[schemars(description = "Path to the directory")]
    pub directory_path: String,
    #[schemars(description = "Descend into sub-directories (default: false)")]
    pub recursive: Option<bool>,
}

/// Input for the create_docx_document tool
#[derive(Serialize, Deserialize, Debug, schemars::JsonSchema)]
pub struct CreateDocxInput {
    #[schemars(
        description = "Document text. '=== x ===' is a heading, '## x' or '-- x' a sub-heading, '- x' a bullet, '1. x' a numbered item, **x** bold"
    )]
    pub content: String,
    #[schemars(description = "Output path (.docx)")]
    pub file_path: String,
    #[schemars(description = "Centered title at the top of the document")]
    pub title: Option<String>,
    #[schemars(description = "Font name (default: Calibri)")]
    pub font_name: Option<String>,
    #[schemars(description = "Font size in points (default: 11)")]
    pub font_size: Option<f64>,
    #[schemars(description = "Line spacing multiple (default: 1.15)")]
    pub line_spacing: Option<f64>,
    #[schemars(description = "Page margins in inches (default: 1.0)")]
    pub margins: Option<f64>,
    #[schemars(description = "Page numbers in the footer (default: true)")]
    pub add_page_numbers: Option<bool>,
}

/// Input for the report tools
#[derive(Serialize, Deserialize, Debug, schemars::JsonSchema)]
pub struct ReportInput {
    #[schemars(
        description = "Report structure: {title, summary|description, sections: [...]} or, for workbooks, {title, description, data: {sheet: rows}}"
    )]
    pub report_data: Value,
    #[schemars(description = "Output path")]
    pub file_path: String,
}

/// Input for the create_xlsx_workbook tool
#[derive(Serialize, Deserialize, Debug, schemars::JsonSchema)]
pub struct WorkbookInput {
    #[schemars(description = "Mapping of sheet name to sheet data (rows, records, key/value mapping or text)")]
    pub data: Value,
    #[schemars(description = "Output path (.xlsx)")]
    pub file_path: String,
    #[schemars(description = "Header styling, borders and column widths (default: true)")]
    pub apply_formatting: Option<bool>,
}

/// Input for the create_xlsx_from_dataframe tool
#[derive(Serialize, Deserialize, Debug, schemars::JsonSchema)]
pub struct DataframeInput {
    #[schemars(
        description = "Mapping of sheet name to frame: {columns, data, index?}, a list of records, or {column: [values]}"
    )]
    pub dataframes: Value,
    #[schemars(description = "Output path (.xlsx)")]
    pub file_path: String,
    #[schemars(description = "Write the index as the first column (default: true)")]
    pub include_index: Option<bool>,
    #[schemars(description = "Header styling, borders and column widths (default: true)")]
    pub apply_formatting: Option<bool>,
}

/// Input for the append_to_xlsx tool
#[derive(Serialize, Deserialize, Debug, schemars::JsonSchema)]
pub struct AppendInput {
    #[schemars(description = "Existing workbook (.xlsx)")]
    pub file_path: String,
    #[schemars(description = "Target sheet")]
    pub sheet_name: String,
    #[schemars(description = "Rows to append (list of rows, records, key/value mapping or text)")]
    pub data: Value,
    #[schemars(description = "Create the sheet when it does not exist (default: true)")]
    pub create_sheet: Option<bool>,
}

#[tool_router]
impl KnowledgeBaseServer {
    pub fn new(config: &ServerConfig, probe_report: ProbeReport) -> Self {
        let registry = Arc::new(FormatRegistry::from_probe(&probe_report, config));
        Self {
            extraction: ExtractionFacade::new(registry.clone(), config.xlsx_sample_rows),
            construction: ConstructionFacade::new(registry, config.max_column_width),
            probe_report: Arc::new(probe_report),
            file_locks: FileLocks::new(),
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Extract text and metadata from a PDF, DOCX, PPTX or XLSX file")]
    async fn extract_text_from_file(
        &self,
        Parameters(input): Parameters<FilePathInput>,
    ) -> Result<CallToolResult, McpError> {
        log::info!("extract_text_from_file: {}", input.file_path);
        let extraction = self.extraction.clone();
        let result = run_blocking(move || extraction.extract_single(Path::new(&input.file_path))).await?;

        match &result.error {
            Some(error) => error_result(error),
            None => json_result(&result),
        }
    }

    #[tool(description = "Extract text from every supported file in a directory")]
    async fn extract_text_from_directory(
        &self,
        Parameters(input): Parameters<DirectoryInput>,
    ) -> Result<CallToolResult, McpError> {
        log::info!("extract_text_from_directory: {}", input.directory_path);
        let extraction = self.extraction.clone();
        let recursive = input.recursive.unwrap_or(false);
        let scan = run_blocking(move || {
            extraction.extract_directory(Path::new(&input.directory_path), recursive)
        })
        .await?;
        json_result(&scan)
    }

    #[tool(description = "List supported files in a directory with size and modification time")]
    async fn list_supported_files(
        &self,
        Parameters(input): Parameters<DirectoryInput>,
    ) -> Result<CallToolResult, McpError> {
        log::info!("list_supported_files: {}", input.directory_path);
        let extraction = self.extraction.clone();
        let recursive = input.recursive.unwrap_or(false);
        let listing = run_blocking(move || {
            extraction.list_supported(Path::new(&input.directory_path), recursive)
        })
        .await?;
        outcome_result(listing)
    }

    #[tool(description = "Get name, type, size and timestamps of a file without reading it")]
    async fn get_file_info(
        &self,
        Parameters(input): Parameters<FilePathInput>,
    ) -> Result<CallToolResult, McpError> {
        log::info!("get_file_info: {}", input.file_path);
        let extraction = self.extraction.clone();
        let info = run_blocking(move || extraction.file_info(Path::new(&input.file_path))).await?;
        outcome_result(info)
    }

    #[tool(description = "Report which formats can be read and written, and which libraries were found")]
    async fn get_capabilities(&self) -> Result<CallToolResult, McpError> {
        json_result(&serde_json::json!({
            "probe": self.probe_report.as_ref(),
            "formats": self.extraction.registry().descriptors(),
        }))
    }

    #[tool(description = "Create a DOCX document from text with headings, lists and bold markup")]
    async fn create_docx_document(
        &self,
        Parameters(input): Parameters<CreateDocxInput>,
    ) -> Result<CallToolResult, McpError> {
        log::info!("create_docx_document: {}", input.file_path);
        let defaults = DocxOptions::default();
        let options = DocxOptions {
            title: input.title,
            font_name: input.font_name.unwrap_or(defaults.font_name),
            font_size: input.font_size.unwrap_or(defaults.font_size),
            line_spacing: input.line_spacing.unwrap_or(defaults.line_spacing),
            margins: input.margins.unwrap_or(defaults.margins),
            add_page_numbers: input.add_page_numbers.unwrap_or(defaults.add_page_numbers),
        };
        let target = PathBuf::from(input.file_path);
        let content = input.content;

        let _guard = self.file_locks.lock(&target).await;
        let construction = self.construction.clone();
        let outcome = run_blocking(move || construction.create_document(&content, &target, &options)).await?;
        outcome_result(outcome)
    }

    #[tool(description = "Create a structured DOCX report with a title, executive summary and sections")]
    async fn create_structured_report(
        &self,
        Parameters(input): Parameters<ReportInput>,
    ) -> Result<CallToolResult, McpError> {
        log::info!("create_structured_report: {}", input.file_path);
        let target = PathBuf::from(input.file_path);
        let report = input.report_data;

        let _guard = self.file_locks.lock(&target).await;
        let construction = self.construction.clone();
        let outcome = run_blocking(move || construction.create_docx_report(&report, &target)).await?;
        outcome_result(outcome)
    }

    #[tool(description = "Create an XLSX workbook with one sheet per entry of the data mapping")]
    async fn create_xlsx_workbook(
        &self,
        Parameters(input): Parameters<WorkbookInput>,
    ) -> Result<CallToolResult, McpError> {
        log::info!("create_xlsx_workbook: {}", input.file_path);
        let target = PathBuf::from(input.file_path);
        let data = input.data;
        let apply_formatting = input.apply_formatting.unwrap_or(true);

        let _guard = self.file_locks.lock(&target).await;
        let construction = self.construction.clone();
        let outcome =
            run_blocking(move || construction.create_workbook(&data, &target, apply_formatting)).await?;
        outcome_result(outcome)
    }

    #[tool(description = "Create an XLSX workbook from tabular frames, one sheet per frame")]
    async fn create_xlsx_from_dataframe(
        &self,
        Parameters(input): Parameters<DataframeInput>,
    ) -> Result<CallToolResult, McpError> {
        log::info!("create_xlsx_from_dataframe: {}", input.file_path);
        let target = PathBuf::from(input.file_path);
        let frames = input.dataframes;
        let include_index = input.include_index.unwrap_or(true);
        let apply_formatting = input.apply_formatting.unwrap_or(true);

        let _guard = self.file_locks.lock(&target).await;
        let construction = self.construction.clone();
        let outcome = run_blocking(move || {
            construction.create_from_frames(&frames, &target, include_index, apply_formatting)
        })
        .await?;
        outcome_result(outcome)
    }

    #[tool(description = "Append rows to a sheet of an existing XLSX workbook")]
    async fn append_to_xlsx(
        &self,
        Parameters(input): Parameters<AppendInput>,
    ) -> Result<CallToolResult, McpError> {
        log::info!("append_to_xlsx: {} [{}]", input.file_path, input.sheet_name);
        let target = PathBuf::from(input.file_path);
        let sheet_name = input.sheet_name;
        let data = input.data;
        let create_sheet = input.create_sheet.unwrap_or(true);

        let _guard = self.file_locks.lock(&target).await;
        let construction = self.construction.clone();
        let outcome =
            run_blocking(move || construction.append(&target, &sheet_name, &data, create_sheet)).await?;
        outcome_result(outcome)
    }

    #[tool(description = "Create a formatted XLSX report with a Summary sheet and one sheet per section")]
    async fn create_xlsx_report(
        &self,
        Parameters(input): Parameters<ReportInput>,
    ) -> Result<CallToolResult, McpError> {
        log::info!("create_xlsx_report: {}", input.file_path);
        let target = PathBuf::from(input.file_path);
        let report = input.report_data;

        let _guard = self.file_locks.lock(&target).await;
        let construction = self.construction.clone();
        let outcome = run_blocking(move || construction.create_xlsx_report(&report, &target)).await?;
        outcome_result(outcome)
    }
}

#[tool_handler]
impl ServerHandler for KnowledgeBaseServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "This server extracts text from PDF, DOCX, PPTX and XLSX files and creates DOCX and XLSX files. \
                 Call get_capabilities to see which formats are available."
                    .to_string(),
            ),
        }
    }
}

/// Run blocking document work off the async executor
async fn run_blocking<T, F>(work: F) -> Result<T, McpError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| McpError::internal_error(format!("Document worker failed: {}", e), None))
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("Failed to serialize result: {}", e), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Declared failures are tool results with `is_error` set, never protocol errors
fn error_result(error: &ToolError) -> Result<CallToolResult, McpError> {
    log::warn!("Tool failed with {}", error);
    let json = serde_json::to_string_pretty(&serde_json::json!({ "error": error }))
        .map_err(|e| McpError::internal_error(format!("Failed to serialize error: {}", e), None))?;
    Ok(CallToolResult::error(vec![Content::text(json)]))
}

fn outcome_result<T: Serialize>(outcome: ToolResult<T>) -> Result<CallToolResult, McpError> {
    match outcome {
        Ok(value) => json_result(&value),
        Err(error) => error_result(&error),
    }
}

/// Probe capabilities, then serve MCP over stdio until the client disconnects
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let report = tokio::task::spawn_blocking(prober::probe).await?;
    let available: Vec<&str> = report.available().iter().map(|c| c.as_str()).collect();
    log::info!("Capabilities available: {}", available.join(", "));

    let server = KnowledgeBaseServer::new(&config, report);
    let service = server.serve(rmcp::transport::io::stdio()).await?;

    let quit_reason = service.waiting().await?;
    log::info!("Server stopped: {:?}", quit_reason);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Capability;
    use serde_json::json;
    use tempfile::tempdir;

    fn full_report() -> ProbeReport {
        let mut report = ProbeReport::default();
        for capability in Capability::ALL {
            report.record(capability, Ok(()));
        }
        report
    }

    fn server() -> KnowledgeBaseServer {
        KnowledgeBaseServer::new(&ServerConfig::default(), full_report())
    }

    fn body(result: &CallToolResult) -> Value {
        let text = &result.content.as_ref().unwrap()[0].as_text().unwrap().text;
        serde_json::from_str(text).unwrap()
    }

    #[tokio::test]
    async fn test_extract_unsupported_is_tool_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "text").unwrap();

        let result = server()
            .extract_text_from_file(Parameters(FilePathInput {
                file_path: path.display().to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert_eq!(body(&result)["error"]["kind"], "unsupported-format");
    }

    #[tokio::test]
    async fn test_get_capabilities() {
        let result = server().get_capabilities().await.unwrap();
        let json = body(&result);
        assert_eq!(json["probe"]["capabilities"]["pdf-reader"], true);
        assert_eq!(json["formats"].as_array().unwrap().len(), 4);
        assert_eq!(json["formats"][0]["extension"], "pdf");
    }

    #[tokio::test]
    async fn test_degraded_server_reports_unavailable() {
        let mut report = full_report();
        report.record(Capability::OoxmlWriter, Err(anyhow::anyhow!("not installed")));
        let server = KnowledgeBaseServer::new(&ServerConfig::default(), report);

        let dir = tempdir().unwrap();
        let result = server
            .create_docx_document(Parameters(CreateDocxInput {
                content: "Hello".to_string(),
                file_path: dir.path().join("out.docx").display().to_string(),
                title: None,
                font_name: None,
                font_size: None,
                line_spacing: None,
                margins: None,
                add_page_numbers: None,
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert_eq!(body(&result)["error"]["kind"], "capability-unavailable");
    }

    #[tokio::test]
    async fn test_append_to_missing_workbook() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("missing.xlsx");
        let result = server()
            .append_to_xlsx(Parameters(AppendInput {
                file_path: target.display().to_string(),
                sheet_name: "Data".to_string(),
                data: json!([[1, 2]]),
                create_sheet: None,
            }))
            .await
            .unwrap();
        assert_eq!(body(&result)["error"]["kind"], "not-found");
        assert!(!target.exists());
    }

    #[cfg(feature = "xlsx")]
    #[tokio::test]
    async fn test_concurrent_appends_keep_every_row() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("log.xlsx");
        let server = server();

        let created = server
            .create_xlsx_workbook(Parameters(WorkbookInput {
                data: json!({"Log": [["entry"]]}),
                file_path: target.display().to_string(),
                apply_formatting: Some(false),
            }))
            .await
            .unwrap();
        assert_eq!(created.is_error, Some(false));

        let mut handles = Vec::new();
        for i in 0..5 {
            let server = server.clone();
            let file_path = target.display().to_string();
            handles.push(tokio::spawn(async move {
                server
                    .append_to_xlsx(Parameters(AppendInput {
                        file_path,
                        sheet_name: "Log".to_string(),
                        data: json!([[format!("row {}", i)]]),
                        create_sheet: Some(false),
                    }))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().is_error, Some(false));
        }

        let info = server
            .extract_text_from_file(Parameters(FilePathInput {
                file_path: target.display().to_string(),
            }))
            .await
            .unwrap();
        let text = body(&info)["text_content"].as_str().unwrap().to_string();
        assert!(text.contains("Dimensions: 5 rows x 1 columns"));
    }
}
